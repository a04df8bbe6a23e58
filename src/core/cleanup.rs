use crate::core::ledger::Ledger;
use crate::core::retry::with_retries;
use crate::error::Error;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum Outcome {
    Deleted,
    /// Nothing on disk to delete; the ledger entry is retired anyway.
    Missing,
    Failed(Error),
}

#[derive(Debug)]
pub struct ItemResult {
    pub path: PathBuf,
    pub outcome: Outcome,
}

#[derive(Debug, Default)]
pub struct CleanupReport {
    pub items: Vec<ItemResult>,
}

impl CleanupReport {
    pub fn deleted(&self) -> impl Iterator<Item = &Path> {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, Outcome::Deleted))
            .map(|item| item.path.as_path())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemResult> {
        self.items
            .iter()
            .filter(|item| !matches!(item.outcome, Outcome::Deleted))
    }

    pub fn deleted_count(&self) -> usize {
        self.deleted().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    /// Paths worth another attempt: I/O failures on files that still exist.
    pub fn retryable(&self) -> Vec<PathBuf> {
        self.items
            .iter()
            .filter(|item| matches!(item.outcome, Outcome::Failed(Error::DeletionIo { .. })))
            .map(|item| item.path.clone())
            .collect()
    }
}

/// Delete exactly the listed originals.
///
/// A path must be tracked by the ledger to be deleted. Each path is handled
/// on its own: a failure is recorded and the batch carries on. Entries are
/// retired from the ledger for deleted and already-missing files.
pub fn delete_listed(pending: &[PathBuf], ledger: &mut Ledger, retries: u32) -> CleanupReport {
    let mut report = CleanupReport::default();

    for path in pending {
        let outcome = if !ledger.contains(path) {
            Outcome::Failed(Error::NotTracked { path: path.clone() })
        } else {
            match with_retries(retries, || fs::remove_file(path)) {
                Ok(()) => {
                    ledger.remove(path);
                    Outcome::Deleted
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    ledger.remove(path);
                    Outcome::Missing
                }
                Err(source) => Outcome::Failed(Error::DeletionIo {
                    path: path.clone(),
                    source,
                }),
            }
        };

        match &outcome {
            Outcome::Deleted => tracing::info!("Deleted file: {}", path.display()),
            Outcome::Missing => tracing::warn!("File does not exist anymore: {}", path.display()),
            Outcome::Failed(err) => tracing::error!("{}", err),
        }
        report.items.push(ItemResult {
            path: path.clone(),
            outcome,
        });
    }

    report
}
