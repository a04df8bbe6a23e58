mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use dialoguer::Confirm;
use simcull::core::cleanup::Outcome;
use simcull::core::reconcile;
use simcull::{Settings, logging, workflow};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli.options.overrides()).context("Failed to load configuration")?;
    let _guard = logging::init_logger(&settings.log_file);
    for warning in settings.warnings() {
        tracing::warn!("{}", warning);
    }

    match cli.command {
        Commands::Find { dry_run } => {
            println!("▶ Finding similar images in: {}", settings.input_dir.display());
            let summary = workflow::run_find(&settings, dry_run)?;

            if summary.groups.is_empty() {
                println!("No similar images found.");
                return Ok(());
            }
            println!(
                "Found {} group(s) among {} image(s):",
                summary.groups.len(),
                summary.fingerprinted
            );
            for group in &summary.groups {
                println!(" Group {}:", group.id);
                for file in &group.members {
                    println!("   ▶ {}", file.display());
                }
            }

            if dry_run {
                for copy in &summary.planned {
                    println!(
                        "   📦 [dry-run] COPY {} → {}",
                        copy.original.display(),
                        copy.destination.display()
                    );
                }
                println!("\n⚠️  Dry-run only; no files were changed.");
            } else {
                println!(
                    "\n✅ Staged {} file(s) in {} ({} already tracked, {} failed)",
                    summary.staging.staged.len(),
                    settings.output_dir.display(),
                    summary.staging.skipped.len(),
                    summary.staging.failed.len()
                );
                for err in &summary.staging.failed {
                    eprintln!("   ⚠️  {}", err);
                }
            }
        }

        Commands::CheckDeleted => {
            let pending = workflow::run_check_deleted(&settings)?;
            if pending.is_empty() {
                println!("No staged copies were removed; nothing to delete.");
            } else {
                println!("Marked {} original(s) for deletion:", pending.len());
                for path in &pending {
                    println!("   🗑️  {}", path.display());
                }
            }
            println!(
                "\n✅ Wrote {}; review it, then run `simcull cleanup`",
                settings.pending_file.display()
            );
        }

        Commands::Cleanup { yes } => {
            let listed = reconcile::read_pending(&settings.pending_file).with_context(|| {
                format!(
                    "Could not read pending-deletion file {:?}",
                    settings.pending_file
                )
            })?;
            if listed.is_empty() {
                println!("Nothing listed in {}.", settings.pending_file.display());
                return Ok(());
            }

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt(format!(
                        "Permanently delete {} original file(s)?",
                        listed.len()
                    ))
                    .default(false)
                    .interact()?;
                if !confirmed {
                    println!("Aborted; nothing was deleted.");
                    return Ok(());
                }
            }

            let report = workflow::run_cleanup(&settings)?;
            for item in &report.items {
                match &item.outcome {
                    Outcome::Deleted => println!("   🗑️  Deleted {}", item.path.display()),
                    Outcome::Missing => {
                        eprintln!("   ⚠️  Already gone {}", item.path.display())
                    }
                    Outcome::Failed(err) => eprintln!("   ❌ {}", err),
                }
            }
            println!(
                "\n✅ Deleted: {}, failed: {}",
                report.deleted_count(),
                report.failed_count()
            );
        }
    }

    Ok(())
}
