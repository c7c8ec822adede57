//! Configuration types for dataset collection and preprocessing
//!
//! Defaults reproduce the built-in Naruto character dataset. Both configs can
//! be loaded from JSON; missing fields fall back to the defaults.

use crate::classifier::KeywordClassifier;
use crate::crawl::SizeFilter;
use crate::error::{DatasetError, Result};
use crate::filter::{FetchParams, FilterMode};
use crate::normalize::{SquareOptions, JPEG_QUALITY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Search queries for one dataset class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassQueries {
    /// Class name, also the output folder and file name prefix
    pub label: String,
    /// Queries tried in order until the class reaches its target
    pub queries: Vec<String>,
}

impl ClassQueries {
    pub fn new<S, I, Q>(label: S, queries: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        Self {
            label: label.into(),
            queries: queries.into_iter().map(Into::into).collect(),
        }
    }
}

/// Built-in classes: episode-style queries per character
#[must_use]
pub fn default_classes() -> Vec<ClassQueries> {
    vec![
        ClassQueries::new(
            "kakashi",
            [
                "Kakashi Hatake Naruto episode screenshot",
                "Kakashi Hatake Naruto Shippuden episode screenshot",
                "Kakashi Hatake anime frame screenshot",
                "Kakashi Hatake Naruto screenshot face close up",
                "Kakashi Hatake without mask anime episode screenshot",
            ],
        ),
        ClassQueries::new(
            "naruto",
            [
                "Naruto Uzumaki Naruto episode screenshot",
                "Naruto Uzumaki Naruto Shippuden episode screenshot",
                "Naruto Uzumaki anime frame screenshot",
                "Naruto Uzumaki screenshot face close up",
                "Naruto Uzumaki sage mode episode screenshot",
            ],
        ),
        ClassQueries::new(
            "sasuke",
            [
                "Sasuke Uchiha Naruto episode screenshot",
                "Sasuke Uchiha Naruto Shippuden episode screenshot",
                "Sasuke Uchiha anime frame screenshot",
                "Sasuke Uchiha screenshot face close up",
                "Sasuke Uchiha sharingan episode screenshot",
            ],
        ),
        ClassQueries::new(
            "might_guy",
            [
                "Might Guy Naruto episode screenshot",
                "Might Guy Naruto Shippuden episode screenshot",
                "Might Guy anime frame screenshot",
                "Might Guy screenshot face close up",
                "Maito Gai eighth gate episode screenshot",
            ],
        ),
    ]
}

/// Configuration for scraping and assembling the dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Root folder; each class gets a subfolder
    pub output_dir: PathBuf,
    /// Target number of files per class
    pub per_class: usize,
    /// First index used when renaming
    pub start_index: usize,
    /// Downloads with a shorter short side are deleted
    pub min_side: u32,
    /// Per-query item cap = remaining need x this factor
    pub overfetch_factor: f64,
    /// Search engine size filter
    pub size: SizeFilter,
    /// Whether hits must carry an anime hint
    pub filter_mode: FilterMode,
    /// Keyword lists used by the download filter
    pub keywords: KeywordClassifier,
    /// Concurrent downloads per query
    pub workers: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Attempts per image
    pub max_retry: u32,
    /// Delete byte-identical downloads
    pub dedupe: bool,
    pub classes: Vec<ClassQueries>,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/raw3"),
            per_class: 200,
            start_index: 400,
            min_side: 220,
            overfetch_factor: 3.0,
            size: SizeFilter::Large,
            filter_mode: FilterMode::Permissive,
            keywords: KeywordClassifier::default(),
            workers: 4,
            timeout_secs: 5,
            max_retry: 3,
            dedupe: false,
            classes: default_classes(),
        }
    }
}

impl DatasetConfig {
    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// - File cannot be read
    /// - Content is not valid JSON for this schema
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DatasetError::file_io_error("read config file", path, &e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Download parameters derived from this configuration
    #[must_use]
    pub fn fetch_params(&self) -> FetchParams {
        FetchParams {
            timeout: Duration::from_secs(self.timeout_secs),
            max_retry: self.max_retry,
            overwrite: false,
        }
    }

    /// Per-query item cap for a class still missing `need` files
    #[must_use]
    pub fn per_query_cap(&self, need: usize) -> usize {
        (need as f64 * self.overfetch_factor) as usize
    }

    /// Keep only the classes named in `labels` (all when empty)
    ///
    /// # Errors
    /// - A requested label is not configured
    pub fn select_classes(&mut self, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = labels
            .iter()
            .find(|l| !self.classes.iter().any(|c| &c.label == *l))
        {
            return Err(DatasetError::invalid_config(format!(
                "Unknown class '{unknown}'"
            )));
        }
        self.classes.retain(|c| labels.contains(&c.label));
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// - Any value out of range, empty or duplicated labels, classes without queries
    pub fn validate(&self) -> Result<()> {
        if self.per_class == 0 {
            return Err(DatasetError::invalid_config("per_class must be at least 1"));
        }
        if !self.overfetch_factor.is_finite() || self.overfetch_factor < 1.0 {
            return Err(DatasetError::invalid_config(format!(
                "overfetch_factor must be >= 1.0, got {}",
                self.overfetch_factor
            )));
        }
        if self.workers == 0 {
            return Err(DatasetError::invalid_config("workers must be at least 1"));
        }
        if self.max_retry == 0 {
            return Err(DatasetError::invalid_config("max_retry must be at least 1"));
        }
        if self.classes.is_empty() {
            return Err(DatasetError::invalid_config("No classes configured"));
        }

        let mut labels = std::collections::HashSet::new();
        for class in &self.classes {
            validate_label(&class.label)?;
            if !labels.insert(class.label.as_str()) {
                return Err(DatasetError::invalid_config(format!(
                    "Duplicate class '{}'",
                    class.label
                )));
            }
            if class.queries.iter().all(|q| q.trim().is_empty()) {
                return Err(DatasetError::invalid_config(format!(
                    "Class '{}' has no queries",
                    class.label
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for re-processing a raw folder into square crops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Folder holding one subfolder per raw class
    pub raw_dir: PathBuf,
    /// Folder receiving one subfolder per target class
    pub out_dir: PathBuf,
    /// Output side length
    pub img_size: u32,
    /// Inputs with a shorter short side are skipped
    pub min_side: u32,
    pub jpeg_quality: u8,
    /// Raw folder name -> target class name
    pub aliases: BTreeMap<String, String>,
    /// Raw folders to process; all subfolders of `raw_dir` when empty
    pub sources: Vec<String>,
    /// Optional glob on file names (e.g. "*.png")
    pub pattern: Option<String>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/raw"),
            out_dir: PathBuf::from("data/results"),
            img_size: 224,
            min_side: 180,
            jpeg_quality: JPEG_QUALITY,
            aliases: default_aliases(),
            sources: Vec::new(),
            pattern: None,
        }
    }
}

/// Built-in folder aliases for mislabeled raw classes
#[must_use]
pub fn default_aliases() -> BTreeMap<String, String> {
    BTreeMap::from([("to_guy".to_string(), "might_guy".to_string())])
}

impl PreprocessConfig {
    /// Load configuration from a JSON file
    ///
    /// # Errors
    /// - File cannot be read
    /// - Content is not valid JSON for this schema
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| DatasetError::file_io_error("read config file", path, &e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Target class for a raw folder name
    #[must_use]
    pub fn target_label<'a>(&'a self, source: &'a str) -> &'a str {
        self.aliases.get(source).map_or(source, String::as_str)
    }

    #[must_use]
    pub fn square_options(&self) -> SquareOptions {
        SquareOptions {
            size: self.img_size,
            min_side: self.min_side,
            jpeg_quality: self.jpeg_quality,
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    /// - Zero image size, quality outside 1-100, unsafe alias targets, bad glob
    pub fn validate(&self) -> Result<()> {
        if self.img_size == 0 {
            return Err(DatasetError::invalid_config("img_size must be at least 1"));
        }
        validate_quality(self.jpeg_quality)?;
        for (source, target) in &self.aliases {
            validate_label(source)?;
            validate_label(target)?;
        }
        for source in &self.sources {
            validate_label(source)?;
        }
        if let Some(pattern) = &self.pattern {
            glob::Pattern::new(pattern).map_err(|e| {
                DatasetError::invalid_config(format!("Invalid pattern '{pattern}': {e}"))
            })?;
        }
        Ok(())
    }
}

/// JPEG quality must be within 1-100
///
/// # Errors
/// - Quality out of range
pub fn validate_quality(quality: u8) -> Result<()> {
    if (1..=100).contains(&quality) {
        Ok(())
    } else {
        Err(DatasetError::invalid_config(format!(
            "JPEG quality must be between 1 and 100, got {quality}"
        )))
    }
}

/// Labels become folder names and file prefixes; reject anything path-like
///
/// # Errors
/// - Empty label, path separators, `.`/`..`
pub fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() || label == "." || label == ".." || label.contains(['/', '\\']) {
        return Err(DatasetError::invalid_config(format!(
            "Invalid class name '{label}'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_dataset_config() {
        let config = DatasetConfig::default();
        assert_eq!(config.per_class, 200);
        assert_eq!(config.start_index, 400);
        assert_eq!(config.min_side, 220);
        assert_eq!(config.size, SizeFilter::Large);
        assert_eq!(config.filter_mode, FilterMode::Permissive);
        assert_eq!(config.classes.len(), 4);
        assert!(config.classes.iter().all(|c| c.queries.len() == 5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_per_query_cap() {
        let config = DatasetConfig::default();
        assert_eq!(config.per_query_cap(200), 600);
        assert_eq!(config.per_query_cap(7), 21);
        assert_eq!(config.per_query_cap(0), 0);
    }

    #[test]
    fn test_fetch_params() {
        let params = DatasetConfig::default().fetch_params();
        assert_eq!(params.timeout, Duration::from_secs(5));
        assert_eq!(params.max_retry, 3);
        assert!(!params.overwrite);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dataset.json");
        std::fs::write(
            &path,
            r#"{
                "per_class": 50,
                "filter_mode": "require_hint",
                "classes": [{"label": "itachi", "queries": ["Itachi Uchiha episode screenshot"]}]
            }"#,
        )
        .unwrap();

        let config = DatasetConfig::from_json_file(&path).unwrap();
        assert_eq!(config.per_class, 50);
        assert_eq!(config.start_index, 400);
        assert_eq!(config.filter_mode, FilterMode::RequireHint);
        assert_eq!(config.classes, vec![ClassQueries::new("itachi", ["Itachi Uchiha episode screenshot"])]);
        assert_eq!(config.keywords, KeywordClassifier::default());
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ per_class: }").unwrap();
        assert!(matches!(
            DatasetConfig::from_json_file(&path),
            Err(DatasetError::Json(_))
        ));
        assert!(DatasetConfig::from_json_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = DatasetConfig {
            overfetch_factor: 0.5,
            ..DatasetConfig::default()
        };
        assert!(config.validate().is_err());

        config.overfetch_factor = 3.0;
        config.classes.push(ClassQueries::new("kakashi", ["dup"]));
        assert!(config.validate().is_err());

        config.classes = vec![ClassQueries::new("../escape", ["q"])];
        assert!(config.validate().is_err());

        config.classes = vec![ClassQueries::new("empty", Vec::<String>::new())];
        assert!(config.validate().is_err());

        config.classes = default_classes();
        config.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_select_classes() {
        let mut config = DatasetConfig::default();
        config
            .select_classes(&["sasuke".to_string(), "kakashi".to_string()])
            .unwrap();
        let labels: Vec<_> = config.classes.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["kakashi", "sasuke"]);

        assert!(config.select_classes(&["orochimaru".to_string()]).is_err());
    }

    #[test]
    fn test_preprocess_defaults_and_alias() {
        let config = PreprocessConfig::default();
        assert_eq!(config.img_size, 224);
        assert_eq!(config.min_side, 180);
        assert_eq!(config.jpeg_quality, 92);
        assert_eq!(config.target_label("to_guy"), "might_guy");
        assert_eq!(config.target_label("naruto"), "naruto");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_preprocess_validate() {
        let mut config = PreprocessConfig {
            jpeg_quality: 0,
            ..PreprocessConfig::default()
        };
        assert!(config.validate().is_err());

        config.jpeg_quality = 92;
        config.pattern = Some("[".to_string());
        assert!(config.validate().is_err());

        config.pattern = Some("*.png".to_string());
        assert!(config.validate().is_ok());

        config.aliases.insert("raw".into(), "a/b".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_quality() {
        assert!(validate_quality(1).is_ok());
        assert!(validate_quality(100).is_ok());
        assert!(validate_quality(0).is_err());
        assert!(validate_quality(101).is_err());
    }
}
