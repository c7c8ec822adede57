//! Batch preprocessing of raw class folders into fixed-size square crops

use crate::config::PreprocessConfig;
use crate::error::{DatasetError, Result};
use crate::files::{canonical_name, highest_index, is_image_file};
use crate::normalize::normalize_to_square;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn};
use walkdir::WalkDir;

/// Outcome of processing one raw folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Raw folder name
    pub source: String,
    /// Target class after alias mapping
    pub label: String,
    /// Image files found under the source folder
    pub total: usize,
    pub ok: usize,
    pub failed: usize,
    pub output_dir: PathBuf,
    /// Index of the last file written, if any
    pub last_index: Option<usize>,
}

/// Re-processes raw class folders into `<out_dir>/<label>/<label>_NNNN.jpg`
#[derive(Debug, Clone)]
pub struct BatchPreprocessor {
    config: PreprocessConfig,
}

impl BatchPreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Raw folders to process: configured sources, else every subfolder of `raw_dir`
    ///
    /// # Errors
    /// - `raw_dir` is missing or unreadable
    pub fn sources(&self) -> Result<Vec<String>> {
        let raw_dir = &self.config.raw_dir;
        if !raw_dir.is_dir() {
            return Err(DatasetError::MissingInput(raw_dir.clone()));
        }
        if !self.config.sources.is_empty() {
            return Ok(self.config.sources.clone());
        }

        let mut sources = Vec::new();
        for entry in std::fs::read_dir(raw_dir)
            .map_err(|e| DatasetError::file_io_error("read raw directory", raw_dir, &e))?
        {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                sources.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        sources.sort();
        Ok(sources)
    }

    /// [`Self::sources`], failing if any of them is not a folder
    ///
    /// # Errors
    /// - `raw_dir` or a configured source folder is missing
    pub fn checked_sources(&self) -> Result<Vec<String>> {
        let sources = self.sources()?;
        for source in &sources {
            let src_dir = self.config.raw_dir.join(source);
            if !src_dir.is_dir() {
                return Err(DatasetError::MissingInput(src_dir));
            }
        }
        Ok(sources)
    }

    /// Process every source folder
    ///
    /// Missing input folders abort before any file is written.
    ///
    /// # Errors
    /// - `raw_dir` or a configured source folder is missing
    /// - Output folder cannot be created or read
    pub fn run_all(&self) -> Result<Vec<BatchReport>> {
        self.checked_sources()?
            .iter()
            .map(|source| self.run_class(source))
            .collect()
    }

    /// Process one raw folder
    ///
    /// # Errors
    /// - `raw_dir` or `raw_dir/source` is missing
    /// - Output folder cannot be created or read
    pub fn run_class(&self, source: &str) -> Result<BatchReport> {
        let _span = info_span!("preprocess", source = %source).entered();

        let raw_dir = &self.config.raw_dir;
        if !raw_dir.is_dir() {
            return Err(DatasetError::MissingInput(raw_dir.clone()));
        }
        let src_dir = raw_dir.join(source);
        if !src_dir.is_dir() {
            return Err(DatasetError::MissingInput(src_dir));
        }

        let label = self.config.target_label(source).to_string();
        let output_dir = self.config.out_dir.join(&label);
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| DatasetError::file_io_error("create output directory", &output_dir, &e))?;

        let inputs = find_image_files(&src_dir, self.config.pattern.as_deref())?;
        let mut idx = highest_index(&output_dir, &label)?.map_or(1, |i| i + 1);
        let options = self.config.square_options();

        info!(
            "[{}] -> [{}] {} files, starting at {}",
            source,
            label,
            inputs.len(),
            idx
        );

        let mut report = BatchReport {
            source: source.to_string(),
            label: label.clone(),
            total: inputs.len(),
            ok: 0,
            failed: 0,
            output_dir: output_dir.clone(),
            last_index: None,
        };

        for input in &inputs {
            let dst = output_dir.join(canonical_name(&label, idx));
            match normalize_to_square(input, &dst, &options) {
                Ok(()) => {
                    debug!("{} -> {}", input.display(), dst.display());
                    report.ok += 1;
                    report.last_index = Some(idx);
                    idx += 1;
                },
                Err(e) => {
                    warn!("[SKIP] {}: {}", input.display(), e);
                    report.failed += 1;
                },
            }
        }

        info!(
            "[{}] total={} ok={} failed={}",
            label, report.total, report.ok, report.failed
        );
        Ok(report)
    }
}

/// Image files under `dir` (recursive), filtered by an optional file name glob, sorted by path
///
/// # Errors
/// - Directory walk fails
/// - `pattern` is not a valid glob
pub fn find_image_files(dir: &Path, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let matcher = pattern
        .map(|p| {
            glob::Pattern::new(p)
                .map_err(|e| DatasetError::invalid_config(format!("Invalid pattern '{p}': {e}")))
        })
        .transpose()?;

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if is_image_file(path) && matches_pattern(path, matcher.as_ref()) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

fn matches_pattern(path: &Path, pattern: Option<&glob::Pattern>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pat.matches(name)),
        None => true,
    }
}
