//! Configuration conversion utilities for CLI arguments

use crate::cli::main_impl::{DownloadArgs, PreprocessArgs};
use crate::config::{validate_label, DatasetConfig, PreprocessConfig};
use crate::filter::FilterMode;
use anyhow::{Context, Result};

/// Merge CLI arguments over file or default configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a validated [`DatasetConfig`] from `download` arguments
    pub(crate) fn dataset_config(args: &DownloadArgs) -> Result<DatasetConfig> {
        let mut config = match &args.config {
            Some(path) => DatasetConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => DatasetConfig::default(),
        };

        if let Some(out_dir) = &args.out_dir {
            config.output_dir.clone_from(out_dir);
        }
        if let Some(per_class) = args.per_class {
            config.per_class = per_class;
        }
        if let Some(start_index) = args.start_index {
            config.start_index = start_index;
        }
        if let Some(min_side) = args.min_side {
            config.min_side = min_side;
        }
        if let Some(factor) = args.overfetch {
            config.overfetch_factor = factor;
        }
        if let Some(size) = args.size {
            config.size = size;
        }
        if args.strict_filter {
            config.filter_mode = FilterMode::RequireHint;
        }
        if let Some(workers) = args.workers {
            config.workers = workers;
        }
        if args.dedupe {
            config.dedupe = true;
        }

        config.select_classes(&args.classes)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a validated [`PreprocessConfig`] from `preprocess` arguments
    pub(crate) fn preprocess_config(args: &PreprocessArgs) -> Result<PreprocessConfig> {
        let mut config = match &args.config {
            Some(path) => PreprocessConfig::from_json_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => PreprocessConfig::default(),
        };

        if let Some(raw_dir) = &args.raw_dir {
            config.raw_dir.clone_from(raw_dir);
        }
        if let Some(out_dir) = &args.out_dir {
            config.out_dir.clone_from(out_dir);
        }
        if !args.sources.is_empty() {
            config.sources.clone_from(&args.sources);
        }
        for alias in &args.aliases {
            let (raw, target) = parse_alias(alias)?;
            config.aliases.insert(raw, target);
        }
        if let Some(size) = args.size {
            config.img_size = size;
        }
        if let Some(min_side) = args.min_side {
            config.min_side = min_side;
        }
        if let Some(quality) = args.jpeg_quality {
            config.jpeg_quality = quality;
        }
        if args.pattern.is_some() {
            config.pattern.clone_from(&args.pattern);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse `RAW=TARGET`
pub(crate) fn parse_alias(alias: &str) -> Result<(String, String)> {
    let (raw, target) = alias
        .split_once('=')
        .with_context(|| format!("Alias '{alias}' must look like RAW=TARGET"))?;
    let (raw, target) = (raw.trim(), target.trim());
    validate_label(raw)?;
    validate_label(target)?;
    Ok((raw.to_string(), target.to_string()))
}
