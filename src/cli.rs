use clap::{Args, Parser, Subcommand};
use simcull::FingerprintKind;
use simcull::config::Overrides;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "simcull",
    version,
    about = "Find similar images, stage them for review, delete what the reviewer removed"
)]
pub struct Cli {
    #[command(flatten)]
    pub options: Options,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Group similar images and copy each group into the staging folder
    Find {
        /// Only show what would be staged
        #[arg(long)]
        dry_run: bool,
    },

    /// List originals whose staged copy was deleted into the pending file
    CheckDeleted,

    /// Delete the originals listed in the pending file
    Cleanup {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
pub struct Options {
    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory to scan for images
    #[arg(long, global = true, value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Staging directory for similarity groups
    #[arg(long, global = true, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Ledger of original → staged paths
    #[arg(long, global = true, value_name = "FILE")]
    pub ledger_file: Option<PathBuf>,

    /// List of originals pending deletion
    #[arg(long, global = true, value_name = "FILE")]
    pub pending_file: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    pub fingerprint: Option<FingerprintKind>,

    /// Maximum hash bit difference for two images to match
    #[arg(long, global = true)]
    pub distance_threshold: Option<u32>,

    /// DBSCAN neighbourhood radius for embeddings
    #[arg(long, global = true)]
    pub dbscan_epsilon: Option<f64>,

    /// DBSCAN minimum neighbourhood size, the point itself included
    #[arg(long, global = true)]
    pub dbscan_min_points: Option<usize>,

    /// Side of the grayscale square images are normalized to
    #[arg(long, global = true)]
    pub normalize_size: Option<u32>,
}

impl Options {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config_file: self.config.clone(),
            input_dir: self.input_dir.clone(),
            output_dir: self.output_dir.clone(),
            ledger_file: self.ledger_file.clone(),
            pending_file: self.pending_file.clone(),
            fingerprint: self.fingerprint,
            distance_threshold: self.distance_threshold,
            dbscan_epsilon: self.dbscan_epsilon,
            dbscan_min_points: self.dbscan_min_points,
            normalize_size: self.normalize_size,
        }
    }
}
