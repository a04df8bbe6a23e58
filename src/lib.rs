//! Find similar images, stage them for review, and replay the reviewer's
//! deletions against the source tree.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod workflow;

pub use crate::config::{FingerprintKind, Settings};
pub use crate::error::{Error, Result};
