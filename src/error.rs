use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid image {path}: {source}")]
    InvalidImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Ledger {path} is corrupt and must be repaired by hand: {source}")]
    LedgerCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Ledger {path} is locked by another run (remove {path}.lock if stale)")]
    LedgerLocked { path: PathBuf },

    #[error("Failed to stage {path}: {source}")]
    StagingIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    DeletionIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to delete {path}: not tracked in the ledger")]
    NotTracked { path: PathBuf },

    #[error("Staging root {path} does not exist")]
    StagingRootMissing { path: PathBuf },

    #[error("Pending-deletion file {path} not found; run check-deleted first")]
    PendingMissing { path: PathBuf },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Error::config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
