use crate::core::ledger::Ledger;
use crate::core::matcher::SimilarityGroup;
use crate::core::retry::with_retries;
use crate::error::Error;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

const MAX_NAME_LEN: usize = 200;
const DIGEST_LEN: usize = 16;

/// Flatten a full path into one recognizable file name: anything other than
/// word characters, `.` and `-` becomes `_`, runs of `_` collapse, and
/// leading/trailing `_` are trimmed. Over-long names keep only a short digest
/// of the full path plus the basename.
pub fn flatten_name(path: &Path) -> String {
    let full = path.to_string_lossy();
    let mut flat = String::with_capacity(full.len());
    for ch in full.chars() {
        let ch = if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '-' {
            ch
        } else {
            '_'
        };
        if ch == '_' && flat.ends_with('_') {
            continue;
        }
        flat.push(ch);
    }
    let flat = flat.trim_matches('_');

    if !flat.is_empty() && flat.len() <= MAX_NAME_LEN {
        return flat.to_string();
    }

    let digest = blake3::hash(full.as_bytes()).to_hex();
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unknown_file".to_string());
    format!(
        "{}_{}",
        &digest.as_str()[..DIGEST_LEN],
        byte_tail(&base, MAX_NAME_LEN - DIGEST_LEN - 1)
    )
}

/// The longest suffix of `s` that fits in `max_bytes`, cut on a char
/// boundary. Keeping the tail keeps the extension.
fn byte_tail(s: &str, max_bytes: usize) -> &str {
    let mut start = s.len();
    for (i, _) in s.char_indices().rev() {
        if s.len() - i > max_bytes {
            break;
        }
        start = i;
    }
    &s[start..]
}

/// `name` with `_<n>` inserted before the extension.
fn numbered(name: &str, n: usize) -> String {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            format!("{}_{}.{}", stem.to_string_lossy(), n, ext.to_string_lossy())
        }
        _ => format!("{}_{}", name, n),
    }
}

/// Staging destination for `original` inside `folder` that is neither on
/// disk nor already handed out in this run.
fn unique_destination(folder: &Path, original: &Path, taken: &HashSet<PathBuf>) -> PathBuf {
    let name = flatten_name(original);
    let mut destination = folder.join(&name);
    let mut counter = 1;
    while destination.exists() || taken.contains(&destination) {
        destination = folder.join(numbered(&name, counter));
        counter += 1;
    }
    destination
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    pub original: PathBuf,
    pub destination: PathBuf,
}

#[derive(Debug, Default)]
pub struct StagingReport {
    pub staged: Vec<PlannedCopy>,
    /// Originals already in the ledger, left as they were.
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<Error>,
}

/// Numbered folders already present in the staging root.
fn highest_numbered_folder(output_root: &Path) -> usize {
    fs::read_dir(output_root)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .filter_map(|e| e.file_name().to_str().and_then(|n| n.parse::<usize>().ok()))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0)
}

/// Work out where every untracked group member goes.
///
/// Members already in the ledger are skipped. A group that has a tracked
/// member reuses that member's folder; other groups get fresh numbered
/// folders, `1..` on an empty staging root and continuing after the highest
/// existing number otherwise.
pub fn plan(
    groups: &[SimilarityGroup],
    output_root: &Path,
    ledger: &Ledger,
) -> (Vec<PlannedCopy>, Vec<PathBuf>) {
    let mut next_folder = highest_numbered_folder(output_root);
    // Slots of tracked copies stay reserved even after the reviewer removed
    // the file, or the removal would be undone by a newcomer.
    let mut taken: HashSet<PathBuf> = ledger
        .iter()
        .map(|(_, staged)| staged.to_path_buf())
        .collect();
    let mut copies = Vec::new();
    let mut skipped = Vec::new();

    for group in groups {
        let (tracked, fresh): (Vec<&PathBuf>, Vec<&PathBuf>) =
            group.members.iter().partition(|p| ledger.contains(p));
        skipped.extend(tracked.iter().map(|p| (*p).clone()));
        if fresh.is_empty() {
            continue;
        }

        let folder = tracked
            .iter()
            .filter_map(|p| ledger.get(p).and_then(Path::parent))
            .next()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| {
                next_folder += 1;
                output_root.join(next_folder.to_string())
            });

        for original in fresh {
            let destination = unique_destination(&folder, original, &taken);
            taken.insert(destination.clone());
            copies.push(PlannedCopy {
                original: original.clone(),
                destination,
            });
        }
    }

    (copies, skipped)
}

/// Copy the planned files (never moving an original) and record each
/// successful copy in the ledger. A failed copy is reported and leaves no
/// ledger entry.
pub fn stage_groups(
    groups: &[SimilarityGroup],
    output_root: &Path,
    ledger: &mut Ledger,
    retries: u32,
) -> StagingReport {
    let (copies, skipped) = plan(groups, output_root, ledger);
    let mut report = StagingReport {
        skipped,
        ..StagingReport::default()
    };

    for copy in copies {
        let result = with_retries(retries, || {
            if let Some(folder) = copy.destination.parent() {
                fs::create_dir_all(folder)?;
            }
            fs::copy(&copy.original, &copy.destination)
        });
        match result {
            Ok(_) => {
                tracing::info!(
                    "  {} -> {}",
                    copy.original.display(),
                    copy.destination.display()
                );
                ledger.merge([(copy.original.clone(), copy.destination.clone())]);
                report.staged.push(copy);
            }
            Err(source) => {
                let err = Error::StagingIo {
                    path: copy.original.clone(),
                    source,
                };
                tracing::error!("{}", err);
                report.failed.push(err);
            }
        }
    }

    for path in &report.skipped {
        if ledger.get(path).is_some_and(|staged| !staged.exists()) {
            tracing::warn!(
                "{} is awaiting check-deleted; its staged copy was removed",
                path.display()
            );
        }
    }

    report
}
