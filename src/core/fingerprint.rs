use crate::config::{FingerprintKind, Settings};
use crate::error::{Error, Result};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader};
use image_hasher::{HashAlg, Hasher, HasherConfig};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Fixed-length bit vector produced by a perceptual hasher.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BitHash(Box<[u8]>);

impl BitHash {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn bits(&self) -> usize {
        self.0.len() * 8
    }

    /// Hamming distance. Hashes of different widths never compare.
    pub fn distance(&self, other: &BitHash) -> Option<u32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        Some(
            self.0
                .iter()
                .zip(other.0.iter())
                .map(|(a, b)| (a ^ b).count_ones())
                .sum(),
        )
    }

    /// Hamming distance if it is at most `limit`, stopping as soon as the
    /// running count passes it.
    pub fn distance_within(&self, other: &BitHash, limit: u32) -> Option<u32> {
        if self.0.len() != other.0.len() {
            return None;
        }
        let mut total = 0;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            total += (a ^ b).count_ones();
            if total > limit {
                return None;
            }
        }
        Some(total)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn euclidean(&self, other: &Embedding) -> Option<f64> {
        if self.0.len() != other.0.len() {
            return None;
        }
        let sum: f64 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = f64::from(*a) - f64::from(*b);
                d * d
            })
            .sum();
        Some(sum.sqrt())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fingerprint {
    Hash(BitHash),
    Embedding(Embedding),
}

impl Fingerprint {
    /// Distance between two fingerprints: bit differences for hashes,
    /// Euclidean distance for embeddings. Incomparable pairs are infinitely
    /// far apart.
    pub fn distance_to(&self, other: &Fingerprint) -> f64 {
        let distance = match (self, other) {
            (Fingerprint::Hash(a), Fingerprint::Hash(b)) => a.distance(b).map(f64::from),
            (Fingerprint::Embedding(a), Fingerprint::Embedding(b)) => a.euclidean(b),
            _ => None,
        };
        distance.unwrap_or(f64::INFINITY)
    }

    pub fn kind(&self) -> FingerprintKind {
        match self {
            Fingerprint::Hash(_) => FingerprintKind::PerceptualHash,
            Fingerprint::Embedding(_) => FingerprintKind::Embedding,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub original_path: PathBuf,
    pub fingerprint: Fingerprint,
}

/// Turns a decoded image into a fingerprint. Implementations must be
/// deterministic: the same pixels always give the same fingerprint.
pub trait Extractor: Sync {
    fn kind(&self) -> FingerprintKind;
    fn extract(&self, image: &DynamicImage) -> Fingerprint;
}

fn normalize(image: &DynamicImage, size: u32) -> DynamicImage {
    image.grayscale().resize_exact(size, size, FilterType::Lanczos3)
}

/// DCT-preprocessed mean hash over a grayscale, fixed-size copy of the image.
pub struct PerceptualHasher {
    hasher: Hasher,
    normalize_size: u32,
}

impl PerceptualHasher {
    pub fn new(hash_size: u32, normalize_size: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_size(hash_size, hash_size)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();
        Self {
            hasher,
            normalize_size,
        }
    }
}

impl Extractor for PerceptualHasher {
    fn kind(&self) -> FingerprintKind {
        FingerprintKind::PerceptualHash
    }

    fn extract(&self, image: &DynamicImage) -> Fingerprint {
        let normalized = normalize(image, self.normalize_size);
        let hash = self.hasher.hash_image(&normalized);
        Fingerprint::Hash(BitHash::from_bytes(hash.as_bytes()))
    }
}

/// Intensity-structure embedding: a `side × side` grayscale thumbnail,
/// mean-centred and scaled to unit length. Insensitive to resizing and to
/// global brightness/contrast changes.
pub struct StructureEmbedder {
    side: u32,
    normalize_size: u32,
}

impl StructureEmbedder {
    pub fn new(side: u32, normalize_size: u32) -> Self {
        Self {
            side,
            normalize_size,
        }
    }
}

impl Extractor for StructureEmbedder {
    fn kind(&self) -> FingerprintKind {
        FingerprintKind::Embedding
    }

    fn extract(&self, image: &DynamicImage) -> Fingerprint {
        let thumb = normalize(image, self.normalize_size)
            .resize_exact(self.side, self.side, FilterType::Triangle)
            .to_luma8();

        let mut values: Vec<f32> = thumb.pixels().map(|p| f32::from(p.0[0])).collect();
        let mean = values.iter().sum::<f32>() / values.len().max(1) as f32;
        values.iter_mut().for_each(|v| *v -= mean);

        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        Fingerprint::Embedding(Embedding::new(values))
    }
}

pub fn build_extractor(settings: &Settings) -> Box<dyn Extractor> {
    match settings.fingerprint {
        FingerprintKind::PerceptualHash => Box::new(PerceptualHasher::new(
            settings.hash_size,
            settings.normalize_size,
        )),
        FingerprintKind::Embedding => Box::new(StructureEmbedder::new(
            settings.embedding_size,
            settings.normalize_size,
        )),
    }
}

/// Decode one file and fingerprint it.
pub fn fingerprint_file(path: &Path, extractor: &dyn Extractor) -> Result<ImageRecord> {
    let invalid = |source: ImageError| Error::InvalidImage {
        path: path.to_path_buf(),
        source,
    };
    let image = ImageReader::open(path)
        .map_err(|e| invalid(ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| invalid(ImageError::IoError(e)))?
        .decode()
        .map_err(invalid)?;

    Ok(ImageRecord {
        original_path: path.to_path_buf(),
        fingerprint: extractor.extract(&image),
    })
}

/// Fingerprint every path in parallel. Records come back in the order of
/// `paths`; files that fail to decode are logged and left out.
pub fn fingerprint_all(paths: &[PathBuf], extractor: &dyn Extractor) -> Vec<ImageRecord> {
    let progress = ProgressBar::new(paths.len() as u64);
    if let Ok(style) =
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg} [{elapsed_precise}]")
    {
        progress.set_style(style);
    }
    progress.set_message("fingerprinting");

    let results: Vec<Result<ImageRecord>> = paths
        .par_iter()
        .map(|path| {
            let result = fingerprint_file(path, extractor);
            progress.inc(1);
            result
        })
        .collect();
    progress.finish_and_clear();

    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!("{}", err);
                None
            }
        })
        .collect()
}
