use crate::core::ledger::{write_atomic, Ledger};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Every file currently under the staging root.
pub fn snapshot_staging(output_root: &Path) -> Result<HashSet<PathBuf>> {
    if !output_root.is_dir() {
        return Err(Error::StagingRootMissing {
            path: output_root.to_path_buf(),
        });
    }
    let mut files = HashSet::new();
    for entry in WalkDir::new(output_root) {
        let entry = entry.map_err(|err| {
            err.into_io_error()
                .map(Error::Io)
                .unwrap_or_else(|| Error::config("staging tree contains a symlink loop"))
        })?;
        if entry.file_type().is_file() {
            files.insert(entry.into_path());
        }
    }
    Ok(files)
}

/// Originals whose staged copy is gone from `present`, in ledger order.
/// Entries staged outside `output_root` are never reported. Reads only;
/// neither the ledger nor any original is touched.
pub fn find_deleted(
    ledger: &Ledger,
    output_root: &Path,
    present: &HashSet<PathBuf>,
) -> Vec<PathBuf> {
    ledger
        .iter()
        .filter(|(original, staged)| {
            if !staged.starts_with(output_root) {
                tracing::warn!(
                    "{} is staged outside {} ({}); leaving it alone",
                    original.display(),
                    output_root.display(),
                    staged.display()
                );
                return false;
            }
            !present.contains(*staged)
        })
        .map(|(original, staged)| {
            tracing::info!(
                "Staged copy {} removed -> marking {} for deletion",
                staged.display(),
                original.display()
            );
            original.to_path_buf()
        })
        .collect()
}

/// Replace the pending-deletion file with `paths`, one per line.
pub fn write_pending(path: &Path, paths: &[PathBuf]) -> Result<()> {
    let mut contents = String::new();
    for original in paths {
        contents.push_str(&original.to_string_lossy());
        contents.push('\n');
    }
    write_atomic(path, &contents)?;
    Ok(())
}

/// Paths listed in a pending-deletion file. Blank lines are ignored and
/// surrounding whitespace trimmed; order is preserved.
pub fn read_pending(path: &Path) -> Result<Vec<PathBuf>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn staged_ledger(root: &Path, names: &[&str]) -> Ledger {
        let mut ledger = Ledger::new();
        for name in names {
            let staged = root.join("1").join(format!("{}.jpg", name));
            fs::create_dir_all(staged.parent().unwrap()).unwrap();
            fs::write(&staged, b"copy").unwrap();
            ledger.merge([(PathBuf::from(format!("/src/{}.jpg", name)), staged)]);
        }
        ledger
    }

    #[test]
    fn test_nothing_removed_yields_empty_list() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = staged_ledger(temp_dir.path(), &["a", "b", "c"]);

        let present = snapshot_staging(temp_dir.path()).unwrap();
        assert!(find_deleted(&ledger, temp_dir.path(), &present).is_empty());
    }

    #[test]
    fn test_exactly_the_removed_copies_are_reported() {
        let temp_dir = TempDir::new().unwrap();
        let ledger = staged_ledger(temp_dir.path(), &["a", "b", "c", "d"]);
        fs::remove_file(ledger.get(Path::new("/src/b.jpg")).unwrap()).unwrap();
        fs::remove_file(ledger.get(Path::new("/src/d.jpg")).unwrap()).unwrap();
        let before = ledger.clone();

        let present = snapshot_staging(temp_dir.path()).unwrap();
        let deleted = find_deleted(&ledger, temp_dir.path(), &present);

        assert_eq!(
            deleted,
            vec![PathBuf::from("/src/b.jpg"), PathBuf::from("/src/d.jpg")]
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn test_entries_outside_staging_root_are_kept() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("review");
        fs::create_dir_all(&root).unwrap();
        let mut ledger = Ledger::new();
        ledger.merge([(
            PathBuf::from("/src/a.jpg"),
            temp_dir.path().join("old_review").join("1").join("a.jpg"),
        )]);

        let present = snapshot_staging(&root).unwrap();
        assert!(find_deleted(&ledger, &root, &present).is_empty());
    }

    #[test]
    fn test_missing_staging_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            snapshot_staging(&temp_dir.path().join("nope")),
            Err(Error::StagingRootMissing { .. })
        ));
    }

    #[test]
    fn test_pending_file_round_trip_honors_hand_edits() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("to_delete.txt");
        let paths = vec![
            PathBuf::from("/src/a b.jpg"),
            PathBuf::from("/src/ü.png"),
        ];
        write_pending(&path, &paths).unwrap();
        assert_eq!(read_pending(&path).unwrap(), paths);

        fs::write(&path, "/src/a b.jpg\n\n   \n/src/other.jpg\r\n").unwrap();
        assert_eq!(
            read_pending(&path).unwrap(),
            vec![PathBuf::from("/src/a b.jpg"), PathBuf::from("/src/other.jpg")]
        );
    }

    #[test]
    fn test_empty_list_writes_empty_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("to_delete.txt");
        write_pending(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert!(read_pending(&path).unwrap().is_empty());
    }
}
