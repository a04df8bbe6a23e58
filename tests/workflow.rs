use image::{ImageBuffer, Rgb};
use simcull::core::cleanup::Outcome;
use simcull::core::ledger::{Ledger, LedgerLock};
use simcull::workflow::{run_check_deleted, run_cleanup, run_find};
use simcull::{Error, FingerprintKind, Settings};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn gradient(path: &Path) {
    let img = ImageBuffer::from_fn(128, 128, |x, y| {
        let v = ((x + 2 * y) * 255 / (3 * 128)) as u8;
        Rgb([v, v, v])
    });
    img.save(path).unwrap();
}

fn checkerboard(path: &Path) {
    let img = ImageBuffer::from_fn(128, 128, |x, y| {
        if (x / 16 + y / 16) % 2 == 0 {
            Rgb([255u8, 255, 255])
        } else {
            Rgb([0u8, 0, 0])
        }
    });
    img.save(path).unwrap();
}

struct Fixture {
    _temp_dir: TempDir,
    settings: Settings,
    x: PathBuf,
    y: PathBuf,
    z: PathBuf,
}

/// `/a/x.jpg`, `/a/y.jpg` (a byte copy of x) and an unrelated `/a/z.jpg`.
fn fixture(kind: FingerprintKind) -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    let input = root.join("a");
    fs::create_dir_all(&input).unwrap();

    let x = input.join("x.jpg");
    let y = input.join("y.jpg");
    let z = input.join("z.jpg");
    gradient(&x);
    fs::copy(&x, &y).unwrap();
    checkerboard(&z);

    let settings = Settings {
        input_dir: input,
        output_dir: root.join("review"),
        ledger_file: root.join("info.txt"),
        pending_file: root.join("to_delete.txt"),
        log_file: root.join("app.log"),
        fingerprint: kind,
        distance_threshold: 2,
        dbscan_epsilon: 0.3,
        dbscan_min_points: 2,
        normalize_size: 64,
        hash_size: 8,
        embedding_size: 16,
        io_retries: 0,
    };

    Fixture {
        _temp_dir: temp_dir,
        settings,
        x,
        y,
        z,
    }
}

fn staged_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(staged_files(&path));
            } else {
                out.push(path);
            }
        }
    }
    out.sort();
    out
}

fn full_cycle(kind: FingerprintKind) {
    let f = fixture(kind);
    let settings = &f.settings;

    let summary = run_find(settings, false).unwrap();
    assert_eq!(summary.groups.len(), 1);
    assert_eq!(summary.groups[0].id, 1);
    assert_eq!(summary.groups[0].members, vec![f.x.clone(), f.y.clone()]);

    let ledger = Ledger::load(&settings.ledger_file).unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(!ledger.contains(&f.z));
    let staged_y = ledger.get(&f.y).unwrap().to_path_buf();
    assert_eq!(staged_y.parent().unwrap(), settings.output_dir.join("1"));

    fs::remove_file(&staged_y).unwrap();
    let pending = run_check_deleted(settings).unwrap();
    assert_eq!(pending, vec![f.y.clone()]);
    assert_eq!(
        fs::read_to_string(&settings.pending_file).unwrap(),
        format!("{}\n", f.y.display())
    );

    let report = run_cleanup(settings).unwrap();
    assert_eq!(report.deleted_count(), 1);
    assert_eq!(report.failed_count(), 0);
    assert!(!f.y.exists());
    assert!(f.x.exists());
    assert!(f.z.exists());

    let ledger = Ledger::load(&settings.ledger_file).unwrap();
    assert_eq!(ledger.len(), 1);
    assert!(ledger.contains(&f.x));
    assert!(!settings.pending_file.exists());

    // Nothing left to reconcile on the next pass.
    assert!(run_check_deleted(settings).unwrap().is_empty());
}

#[test]
fn test_perceptual_hash_full_cycle() {
    full_cycle(FingerprintKind::PerceptualHash);
}

#[test]
fn test_embedding_full_cycle() {
    full_cycle(FingerprintKind::Embedding);
}

#[test]
fn test_find_twice_is_idempotent() {
    let f = fixture(FingerprintKind::PerceptualHash);
    let settings = &f.settings;

    run_find(settings, false).unwrap();
    let ledger_text = fs::read_to_string(&settings.ledger_file).unwrap();
    let files = staged_files(&settings.output_dir);
    assert_eq!(files.len(), 2);

    let second = run_find(settings, false).unwrap();
    assert!(second.staging.staged.is_empty());
    assert_eq!(second.staging.skipped.len(), 2);
    assert_eq!(fs::read_to_string(&settings.ledger_file).unwrap(), ledger_text);
    assert_eq!(staged_files(&settings.output_dir), files);
}

#[test]
fn test_dry_run_changes_nothing() {
    let f = fixture(FingerprintKind::PerceptualHash);
    let settings = &f.settings;

    let summary = run_find(settings, true).unwrap();
    assert_eq!(summary.planned.len(), 2);
    assert!(!settings.ledger_file.exists());
    assert!(!settings.output_dir.exists());
}

#[test]
fn test_cleanup_continues_past_missing_file() {
    let f = fixture(FingerprintKind::PerceptualHash);
    let settings = &f.settings;
    run_find(settings, false).unwrap();

    // Both staged copies removed by the reviewer, then y vanishes on its own.
    let ledger = Ledger::load(&settings.ledger_file).unwrap();
    for (_, staged) in ledger.iter() {
        fs::remove_file(staged).unwrap();
    }
    let pending = run_check_deleted(settings).unwrap();
    assert_eq!(pending, vec![f.x.clone(), f.y.clone()]);
    fs::remove_file(&f.y).unwrap();

    let report = run_cleanup(settings).unwrap();
    assert_eq!(report.deleted().collect::<Vec<_>>(), vec![f.x.as_path()]);
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].path, f.y);
    assert!(matches!(failed[0].outcome, Outcome::Missing));
    assert!(f.z.exists());
}

#[test]
fn test_cleanup_honors_hand_edited_list() {
    let f = fixture(FingerprintKind::PerceptualHash);
    let settings = &f.settings;
    run_find(settings, false).unwrap();

    let ledger = Ledger::load(&settings.ledger_file).unwrap();
    for (_, staged) in ledger.iter() {
        fs::remove_file(staged).unwrap();
    }
    run_check_deleted(settings).unwrap();

    // The reviewer changes their mind about x and slips in an untracked path.
    fs::write(
        &settings.pending_file,
        format!("{}\n{}\n", f.y.display(), f.z.display()),
    )
    .unwrap();

    let report = run_cleanup(settings).unwrap();
    assert_eq!(report.deleted_count(), 1);
    assert!(f.x.exists());
    assert!(!f.y.exists());
    assert!(f.z.exists());
    assert!(matches!(
        report.items[1].outcome,
        Outcome::Failed(Error::NotTracked { .. })
    ));
}

#[test]
fn test_cleanup_without_pending_file() {
    let f = fixture(FingerprintKind::PerceptualHash);
    assert!(matches!(
        run_cleanup(&f.settings),
        Err(Error::PendingMissing { .. })
    ));
}

#[test]
fn test_corrupt_ledger_aborts_find() {
    let f = fixture(FingerprintKind::PerceptualHash);
    fs::write(&f.settings.ledger_file, "not json").unwrap();

    assert!(matches!(
        run_find(&f.settings, false),
        Err(Error::LedgerCorrupt { .. })
    ));
    assert!(!f.settings.output_dir.exists());
}

#[test]
fn test_check_deleted_waits_for_the_ledger_lock() {
    let f = fixture(FingerprintKind::PerceptualHash);
    let settings = &f.settings;
    run_find(settings, false).unwrap();

    let lock = LedgerLock::acquire(&settings.ledger_file, 0).unwrap();
    assert!(matches!(
        run_check_deleted(settings),
        Err(Error::LedgerLocked { .. })
    ));
    assert!(!settings.pending_file.exists());

    drop(lock);
    assert!(run_check_deleted(settings).unwrap().is_empty());
}

#[test]
fn test_staging_root_spelled_with_parent_components_is_not_rescanned() {
    let mut f = fixture(FingerprintKind::PerceptualHash);
    f.settings.output_dir = f.settings.input_dir.join("..").join("a").join("review");
    let settings = &f.settings;

    let first = run_find(settings, false).unwrap();
    assert_eq!(first.scanned, 3);
    assert_eq!(first.staging.staged.len(), 2);

    let second = run_find(settings, false).unwrap();
    assert_eq!(second.scanned, 3);
    assert!(second.staging.staged.is_empty());
    assert_eq!(staged_files(&f.settings.input_dir.join("review")).len(), 2);
}
