//! The three phases, each a single entry point over loaded [`Settings`].

use crate::config::Settings;
use crate::core::cleanup::{self, CleanupReport};
use crate::core::fingerprint::{self, Extractor};
use crate::core::ledger::{Ledger, LedgerLock};
use crate::core::matcher::{self, SimilarityGroup};
use crate::core::reconcile;
use crate::core::scanner;
use crate::core::staging::{self, PlannedCopy, StagingReport};
use crate::error::{Error, Result};
use chrono::Local;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug)]
pub struct FindSummary {
    pub scanned: usize,
    pub fingerprinted: usize,
    pub groups: Vec<SimilarityGroup>,
    pub staging: StagingReport,
    /// Copies that would have been made; only filled on a dry run.
    pub planned: Vec<PlannedCopy>,
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    tracing::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}

pub fn run_find(settings: &Settings, dry_run: bool) -> Result<FindSummary> {
    let extractor = fingerprint::build_extractor(settings);
    run_find_with(settings, extractor.as_ref(), dry_run)
}

/// Scan, fingerprint, group and stage. The ledger stays locked from load to
/// save so a concurrent run cannot interleave.
pub fn run_find_with(
    settings: &Settings,
    extractor: &dyn Extractor,
    dry_run: bool,
) -> Result<FindSummary> {
    let input_dir = Settings::absolute(&settings.input_dir)?;
    let output_dir = Settings::absolute(&settings.output_dir)?;
    tracing::info!("Input folder: {}", input_dir.display());
    tracing::info!("Output folder: {}", output_dir.display());
    tracing::info!(
        "Fingerprint: {}, strategy: {:?}",
        extractor.kind().as_str(),
        settings.strategy()
    );

    let _lock = if dry_run {
        None
    } else {
        Some(LedgerLock::acquire(&settings.ledger_file, settings.io_retries)?)
    };
    let mut ledger = Ledger::load(&settings.ledger_file)?;

    let images = scanner::scan_directory(&input_dir, Some(&output_dir))?;
    tracing::info!("Images found: {}", images.len());

    let records = benchmark("fingerprinting", || {
        fingerprint::fingerprint_all(&images, extractor)
    });
    tracing::info!(
        "Successfully processed: {} of {}",
        records.len(),
        images.len()
    );

    let groups = benchmark("grouping", || {
        matcher::group_records(&records, settings.strategy())
    });
    tracing::info!("Groups found: {}", groups.len());
    for group in &groups {
        tracing::info!("  Group {}: {} images", group.id, group.members.len());
    }

    let mut summary = FindSummary {
        scanned: images.len(),
        fingerprinted: records.len(),
        groups,
        staging: StagingReport::default(),
        planned: Vec::new(),
    };

    if dry_run {
        let (planned, skipped) = staging::plan(&summary.groups, &output_dir, &ledger);
        summary.planned = planned;
        summary.staging.skipped = skipped;
        return Ok(summary);
    }

    summary.staging = staging::stage_groups(
        &summary.groups,
        &output_dir,
        &mut ledger,
        settings.io_retries,
    );
    tracing::info!(
        "Staged {} file(s), {} already tracked, {} failed",
        summary.staging.staged.len(),
        summary.staging.skipped.len(),
        summary.staging.failed.len()
    );
    if !summary.staging.staged.is_empty() {
        ledger.save(&settings.ledger_file)?;
    }

    Ok(summary)
}

/// Compare the ledger with the staging tree and write the pending-deletion
/// file. Nothing is deleted here.
pub fn run_check_deleted(settings: &Settings) -> Result<Vec<PathBuf>> {
    let output_dir = Settings::absolute(&settings.output_dir)?;
    let _lock = LedgerLock::acquire(&settings.ledger_file, settings.io_retries)?;
    let ledger = Ledger::load(&settings.ledger_file)?;
    tracing::info!(
        "Loaded ledger {} ({} records)",
        settings.ledger_file.display(),
        ledger.len()
    );

    let present = reconcile::snapshot_staging(&output_dir)?;
    tracing::info!("Found files in {}: {}", output_dir.display(), present.len());

    let pending = reconcile::find_deleted(&ledger, &output_dir, &present);
    reconcile::write_pending(&settings.pending_file, &pending)?;

    tracing::info!(
        "Tracked: {}, marked for deletion: {} (written to {})",
        ledger.len(),
        pending.len(),
        settings.pending_file.display()
    );
    Ok(pending)
}

/// The pending file is renamed to `<name>.<timestamp>.done` once consumed.
fn archive_pending(path: &std::path::Path) -> Result<PathBuf> {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.done", Local::now().format("%Y%m%dT%H%M%S")));
    let archived = path.with_file_name(name);
    fs::rename(path, &archived)?;
    Ok(archived)
}

/// Delete the originals listed in the pending-deletion file, retire their
/// ledger entries and archive the file. Paths that failed with an I/O error
/// are written to a fresh pending file for the next attempt.
pub fn run_cleanup(settings: &Settings) -> Result<CleanupReport> {
    if !settings.pending_file.is_file() {
        return Err(Error::PendingMissing {
            path: settings.pending_file.clone(),
        });
    }

    let _lock = LedgerLock::acquire(&settings.ledger_file, settings.io_retries)?;
    let mut ledger = Ledger::load(&settings.ledger_file)?;
    let pending = reconcile::read_pending(&settings.pending_file)?;
    tracing::info!(
        "{} path(s) listed in {}",
        pending.len(),
        settings.pending_file.display()
    );

    let before = ledger.len();
    let report = cleanup::delete_listed(&pending, &mut ledger, settings.io_retries);
    if ledger.len() != before {
        ledger.save(&settings.ledger_file)?;
    }

    let archived = archive_pending(&settings.pending_file)?;
    tracing::info!("Archived {} as {}", settings.pending_file.display(), archived.display());

    let retry = report.retryable();
    if !retry.is_empty() {
        reconcile::write_pending(&settings.pending_file, &retry)?;
        tracing::warn!(
            "{} failed deletion(s) written back to {}",
            retry.len(),
            settings.pending_file.display()
        );
    }

    tracing::info!(
        "Successfully deleted: {}, errors: {}",
        report.deleted_count(),
        report.failed_count()
    );
    Ok(report)
}
