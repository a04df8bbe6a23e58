use crate::core::matcher::Strategy;
use crate::error::{Error, Result};
use clap::ValueEnum;
use ::config::{Config, Environment, File as ConfigFile, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintKind {
    PerceptualHash,
    Embedding,
}

impl FingerprintKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FingerprintKind::PerceptualHash => "perceptual-hash",
            FingerprintKind::Embedding => "embedding",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Root scanned for images.
    pub input_dir: PathBuf,
    /// Staging root that receives one numbered folder per group.
    pub output_dir: PathBuf,
    pub ledger_file: PathBuf,
    pub pending_file: PathBuf,
    pub log_file: PathBuf,
    pub fingerprint: FingerprintKind,
    /// Maximum bit difference for two hashes to count as similar.
    pub distance_threshold: u32,
    pub dbscan_epsilon: f64,
    pub dbscan_min_points: usize,
    pub normalize_size: u32,
    pub hash_size: u32,
    pub embedding_size: u32,
    pub io_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("input_dir"),
            output_dir: PathBuf::from("output_dir"),
            ledger_file: PathBuf::from("info.txt"),
            pending_file: PathBuf::from("to_delete.txt"),
            log_file: PathBuf::from("app.log"),
            fingerprint: FingerprintKind::PerceptualHash,
            distance_threshold: 80,
            dbscan_epsilon: 0.35,
            dbscan_min_points: 2,
            normalize_size: 256,
            hash_size: 16,
            embedding_size: 16,
            io_retries: 3,
        }
    }
}

/// Values given on the command line; `None` leaves the lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub ledger_file: Option<PathBuf>,
    pub pending_file: Option<PathBuf>,
    pub fingerprint: Option<FingerprintKind>,
    pub distance_threshold: Option<u32>,
    pub dbscan_epsilon: Option<f64>,
    pub dbscan_min_points: Option<usize>,
    pub normalize_size: Option<u32>,
}

fn path_value(path: &Option<PathBuf>) -> Option<String> {
    path.as_ref().map(|p| p.to_string_lossy().into_owned())
}

fn default_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("simcull.toml");
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("simcull").join("config.toml"))
        .filter(|p| p.is_file())
}

impl Settings {
    /// Layer defaults, the TOML file, `SIMCULL_*` variables and command-line
    /// overrides, then validate.
    pub fn load(overrides: &Overrides) -> Result<Settings> {
        let defaults = Config::try_from(&Settings::default())?;
        let mut builder = Config::builder().add_source(defaults);

        match &overrides.config_file {
            Some(path) => {
                if !path.is_file() {
                    return Err(Error::config(format!(
                        "config file {} not found",
                        path.display()
                    )));
                }
                builder = builder.add_source(ConfigFile::from(path.as_path()).format(FileFormat::Toml));
            }
            None => {
                if let Some(path) = default_config_file() {
                    builder = builder.add_source(ConfigFile::from(path.as_path()).format(FileFormat::Toml));
                }
            }
        }

        let settings = builder
            .add_source(Environment::with_prefix("SIMCULL").try_parsing(true))
            .set_override_option("input_dir", path_value(&overrides.input_dir))?
            .set_override_option("output_dir", path_value(&overrides.output_dir))?
            .set_override_option("ledger_file", path_value(&overrides.ledger_file))?
            .set_override_option("pending_file", path_value(&overrides.pending_file))?
            .set_override_option(
                "fingerprint",
                overrides.fingerprint.map(|k| k.as_str().to_string()),
            )?
            .set_override_option(
                "distance_threshold",
                overrides.distance_threshold.map(i64::from),
            )?
            .set_override_option("dbscan_epsilon", overrides.dbscan_epsilon)?
            .set_override_option(
                "dbscan_min_points",
                overrides.dbscan_min_points.map(|n| n as i64),
            )?
            .set_override_option("normalize_size", overrides.normalize_size.map(i64::from))?
            .build()?
            .try_deserialize::<Settings>()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_dir.as_os_str().is_empty() {
            return Err(Error::config("input_dir must not be empty"));
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(Error::config("output_dir must not be empty"));
        }
        if self.ledger_file.as_os_str().is_empty() || self.pending_file.as_os_str().is_empty() {
            return Err(Error::config("ledger_file and pending_file must not be empty"));
        }
        if self.normalize_size == 0 {
            return Err(Error::config("normalize_size must be positive"));
        }
        if self.hash_size == 0 || self.embedding_size == 0 {
            return Err(Error::config("hash_size and embedding_size must be positive"));
        }
        if !(self.dbscan_epsilon.is_finite() && self.dbscan_epsilon >= 0.0) {
            return Err(Error::config("dbscan_epsilon must be a non-negative number"));
        }
        if self.dbscan_min_points == 0 {
            return Err(Error::config("dbscan_min_points must be at least 1"));
        }
        Ok(())
    }

    /// Settings that load fine but are probably a mistake. Reported by the
    /// caller once logging is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let bits = (self.hash_size as usize).pow(2);
        if self.fingerprint == FingerprintKind::PerceptualHash
            && self.distance_threshold as usize > bits
        {
            warnings.push(format!(
                "distance_threshold {} exceeds the {}-bit hash; every pair will match",
                self.distance_threshold, bits
            ));
        }
        warnings
    }

    pub fn strategy(&self) -> Strategy {
        match self.fingerprint {
            FingerprintKind::PerceptualHash => Strategy::UnionFind {
                threshold: f64::from(self.distance_threshold),
            },
            FingerprintKind::Embedding => Strategy::Dbscan {
                epsilon: self.dbscan_epsilon,
                min_points: self.dbscan_min_points,
            },
        }
    }

    /// `path` made absolute against the current directory with `.` and `..`
    /// resolved lexically. Does not touch the filesystem, so the result is the
    /// same before and after the directory exists.
    pub fn absolute(path: &Path) -> Result<PathBuf> {
        let mut normalized = PathBuf::new();
        for component in std::path::absolute(path)?.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }
        Ok(normalized)
    }
}
