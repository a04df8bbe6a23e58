pub mod cleanup;
pub mod fingerprint;
pub mod ledger;
pub mod matcher;
pub mod reconcile;
pub mod retry;
pub mod scanner;
pub mod staging;
