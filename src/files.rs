//! Dataset folder operations: discovery, trimming, renaming and de-duplication

use crate::error::{DatasetError, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions treated as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// Check if file is an image based on extension
#[must_use]
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}

/// All regular files directly inside `dir`, sorted by file name
///
/// # Errors
/// - Directory cannot be read
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| DatasetError::file_io_error("read directory", dir, &e))? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Number of regular files directly inside `dir`
///
/// # Errors
/// - Directory cannot be read
pub fn count_files(dir: &Path) -> Result<usize> {
    Ok(list_files(dir)?.len())
}

/// Image files directly inside `dir`, sorted by file name
///
/// # Errors
/// - Directory cannot be read
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|p| is_image_file(p))
        .collect())
}

/// Keep the first `target` files in name order and delete the rest
///
/// Returns the deleted paths.
///
/// # Errors
/// - Directory cannot be read
/// - A surplus file cannot be deleted
pub fn trim_excess(dir: &Path, target: usize) -> Result<Vec<PathBuf>> {
    let files = list_files(dir)?;
    let surplus: Vec<PathBuf> = files.into_iter().skip(target).collect();
    for path in &surplus {
        match fs::remove_file(path) {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => return Err(DatasetError::file_io_error("delete surplus file", path, &e)),
        }
    }
    Ok(surplus)
}

/// Canonical dataset file name: `<label>_<index:04>.jpg`
#[must_use]
pub fn canonical_name(label: &str, index: usize) -> String {
    format!("{label}_{index:04}.jpg")
}

/// Counts from a rename pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameStats {
    pub renamed: usize,
    /// Source already had its canonical name
    pub unchanged: usize,
    /// Destination name was taken by another file
    pub collisions: usize,
}

/// Rename every file in `dir` to `<label>_<start+i:04>.jpg` in file name order
///
/// A rename is skipped when the file already carries its destination name or
/// when the destination exists; existing files are never overwritten.
///
/// # Errors
/// - Directory cannot be read
/// - A rename fails
pub fn rename_sequential(dir: &Path, label: &str, start_index: usize) -> Result<RenameStats> {
    let mut stats = RenameStats::default();

    for (i, path) in list_files(dir)?.iter().enumerate() {
        let new_name = canonical_name(label, start_index + i);
        if path.file_name().and_then(|n| n.to_str()) == Some(new_name.as_str()) {
            stats.unchanged += 1;
            continue;
        }
        let new_path = dir.join(&new_name);
        if new_path.exists() {
            log::debug!(
                "Not renaming {}: {} already exists",
                path.display(),
                new_name
            );
            stats.collisions += 1;
            continue;
        }
        fs::rename(path, &new_path)
            .map_err(|e| DatasetError::file_io_error("rename", path, &e))?;
        stats.renamed += 1;
    }

    Ok(stats)
}

/// Parse the index out of `<label>_<digits>.jpg`
#[must_use]
pub fn parse_index(file_name: &str, label: &str) -> Option<usize> {
    let rest = file_name.strip_prefix(label)?.strip_prefix('_')?;
    let digits = rest
        .strip_suffix(".jpg")
        .or_else(|| rest.strip_suffix(".JPG"))?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Highest canonical index among the files in `dir`, if any
///
/// # Errors
/// - Directory cannot be read
pub fn highest_index(dir: &Path, label: &str) -> Result<Option<usize>> {
    Ok(list_files(dir)?
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
        .filter_map(|name| parse_index(name, label))
        .max())
}

/// Delete files whose content duplicates an earlier file (name order)
///
/// Returns the deleted paths.
///
/// # Errors
/// - Directory cannot be read
/// - A file cannot be read or deleted
pub fn remove_duplicates(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut seen = HashSet::new();
    let mut removed = Vec::new();

    for path in list_files(dir)? {
        let contents =
            fs::read(&path).map_err(|e| DatasetError::file_io_error("read file for hashing", &path, &e))?;
        let digest = format!("{:x}", Sha256::digest(&contents));
        if !seen.insert(digest) {
            fs::remove_file(&path)
                .map_err(|e| DatasetError::file_io_error("delete duplicate", &path, &e))?;
            removed.push(path);
        }
    }

    Ok(removed)
}
