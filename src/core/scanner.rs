use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "gif", "tiff", "tif", "webp"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Recursively walk `dir`, returning image paths in lexical order.
///
/// Anything under `skip` (normally the staging root) is left out so staged
/// copies are never fingerprinted as originals.
pub fn scan_directory(dir: &Path, skip: Option<&Path>) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::config(format!(
            "input directory {} does not exist or is not a directory",
            dir.display()
        )));
    }

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Scanning for images…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let mut images = Vec::new();
    let walker = WalkDir::new(dir)
        .into_iter()
        .filter_entry(|entry| skip.is_none_or(|s| entry.path() != s));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                tracing::warn!("Skipping unreadable entry: {}", err);
                continue;
            }
        };
        let path = entry.path();
        if entry.file_type().is_file() && is_image_file(path) {
            images.push(path.to_path_buf());
        }
        spinner.tick();
    }
    spinner.finish_with_message("Scan complete");

    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_extension_filter_is_case_insensitive() {
        assert!(is_image_file(Path::new("/a/b.JPG")));
        assert!(is_image_file(Path::new("/a/b.webp")));
        assert!(!is_image_file(Path::new("/a/b.txt")));
        assert!(!is_image_file(Path::new("/a/noext")));
    }

    #[test]
    fn test_scan_sorted_and_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(temp_dir.path().join("b.png"), b"x").unwrap();
        fs::write(temp_dir.path().join("a.jpg"), b"x").unwrap();
        fs::write(nested.join("c.gif"), b"x").unwrap();
        fs::write(temp_dir.path().join("notes.txt"), b"x").unwrap();

        let found = scan_directory(temp_dir.path(), None).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.strip_prefix(temp_dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            names,
            vec![
                PathBuf::from("a.jpg"),
                PathBuf::from("b.png"),
                PathBuf::from("nested/c.gif"),
            ]
        );
    }

    #[test]
    fn test_scan_skips_staging_root() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("staging");
        fs::create_dir_all(staging.join("1")).unwrap();
        fs::write(staging.join("1").join("copy.jpg"), b"x").unwrap();
        fs::write(temp_dir.path().join("orig.jpg"), b"x").unwrap();

        let found = scan_directory(temp_dir.path(), Some(&staging)).unwrap();
        assert_eq!(found, vec![temp_dir.path().join("orig.jpg")]);
    }

    #[test]
    fn test_scan_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let result = scan_directory(&temp_dir.path().join("missing"), None);
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}
