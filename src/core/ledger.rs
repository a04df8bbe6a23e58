//! Durable original-path → staged-path mapping shared by the three phases.
//!
//! The ledger is a pretty-printed JSON object with keys in sorted order so it
//! diffs cleanly. Every save goes to a temporary sibling first and is renamed
//! into place; a reader never sees a half-written file.

use crate::core::retry::with_retries;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: BTreeMap<PathBuf, PathBuf>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the ledger at `path`. A missing file is an empty ledger; an
    /// unreadable or malformed one is fatal.
    pub fn load(path: &Path) -> Result<Ledger> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No ledger at {}, starting empty", path.display());
                return Ok(Ledger::new());
            }
            Err(err) => return Err(err.into()),
        };
        if contents.trim().is_empty() {
            return Ok(Ledger::new());
        }

        let entries = serde_json::from_str(&contents).map_err(|source| Error::LedgerCorrupt {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Ledger { entries })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            Error::LedgerCorrupt {
                path: path.to_path_buf(),
                source,
            }
        })?;
        write_atomic(path, &(json + "\n"))?;
        tracing::info!("Ledger {} saved ({} entries)", path.display(), self.len());
        Ok(())
    }

    /// Add entries, returning how many replaced an existing staged path.
    pub fn merge<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = (PathBuf, PathBuf)>,
    {
        let mut replaced = 0;
        for (original, staged) in entries {
            if let Some(previous) = self.entries.insert(original.clone(), staged.clone()) {
                if previous != staged {
                    tracing::warn!(
                        "Ledger entry for {} moved from {} to {}",
                        original.display(),
                        previous.display(),
                        staged.display()
                    );
                    replaced += 1;
                }
            }
        }
        replaced
    }

    pub fn remove(&mut self, original: &Path) -> Option<PathBuf> {
        self.entries.remove(original)
    }

    pub fn get(&self, original: &Path) -> Option<&Path> {
        self.entries.get(original).map(PathBuf::as_path)
    }

    pub fn contains(&self, original: &Path) -> bool {
        self.entries.contains_key(original)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.entries
            .iter()
            .map(|(original, staged)| (original.as_path(), staged.as_path()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write `contents` to a temporary sibling of `path`, then rename it over
/// `path`.
pub fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(format!(".tmp.{}", std::process::id()));
    let tmp = path.with_file_name(tmp_name);

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

/// Exclusive hold on a ledger file for a load-modify-save cycle. The lock
/// file is removed when the guard drops.
#[derive(Debug)]
pub struct LedgerLock {
    path: PathBuf,
}

impl LedgerLock {
    pub fn acquire(ledger_path: &Path, retries: u32) -> Result<LedgerLock> {
        let mut name = ledger_path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        let lock_path = ledger_path.with_file_name(name);
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // A held lock shows up as AlreadyExists; retry it as if transient.
        let opened = with_retries(retries, || {
            OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_path)
                .map_err(|err| match err.kind() {
                    io::ErrorKind::AlreadyExists => {
                        io::Error::new(io::ErrorKind::WouldBlock, err)
                    }
                    _ => err,
                })
        });

        match opened {
            Ok(mut file) => {
                let _ = writeln!(file, "pid={}", std::process::id());
                Ok(LedgerLock { path: lock_path })
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(Error::LedgerLocked {
                path: ledger_path.to_path_buf(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
