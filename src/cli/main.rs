//! Anime dataset CLI
//!
//! `download` scrapes and assembles per-class folders, `preprocess` turns raw
//! folders into square training crops, `classes` lists the configured classes.

use super::config::CliConfigBuilder;
use crate::{
    assembler::{ClassReport, DatasetAssembler},
    crawl::{BingImageCrawler, SizeFilter},
    preprocess::{BatchPreprocessor, BatchReport},
    tracing_config::{TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::PathBuf;
use std::time::Instant;
use tracing::debug;

/// Anime character dataset builder
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "anime-dataset")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format on stderr
    #[arg(long, value_enum, default_value = "console", global = true)]
    pub log_format: TracingFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search, download and assemble per-class image folders
    Download(DownloadArgs),
    /// Resize and center-crop raw class folders into square JPEGs
    Preprocess(PreprocessArgs),
    /// List configured classes and their queries
    Classes {
        /// JSON dataset configuration
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct DownloadArgs {
    /// JSON dataset configuration; flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output root; one subfolder per class
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Target images per class
    #[arg(long)]
    pub per_class: Option<usize>,

    /// First index used for final file names
    #[arg(long)]
    pub start_index: Option<usize>,

    /// Minimum short side in pixels
    #[arg(long)]
    pub min_side: Option<u32>,

    /// Per-query cap as a multiple of the remaining need
    #[arg(long)]
    pub overfetch: Option<f64>,

    /// Search engine size filter
    #[arg(long, value_enum)]
    pub size: Option<SizeFilter>,

    /// Only download hits whose metadata mentions the anime
    #[arg(long)]
    pub strict_filter: bool,

    /// Concurrent downloads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Delete byte-identical downloads
    #[arg(long)]
    pub dedupe: bool,

    /// Only process these classes (repeatable)
    #[arg(long = "class", value_name = "LABEL")]
    pub classes: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct PreprocessArgs {
    /// JSON preprocess configuration; flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Folder with one subfolder per raw class
    #[arg(long, value_name = "DIR")]
    pub raw_dir: Option<PathBuf>,

    /// Output root; one subfolder per target class
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Raw folders to process (repeatable, default: all)
    #[arg(long = "source", value_name = "NAME")]
    pub sources: Vec<String>,

    /// Map a raw folder onto another class, e.g. to_guy=might_guy (repeatable)
    #[arg(long = "alias", value_name = "RAW=TARGET")]
    pub aliases: Vec<String>,

    /// Output side length
    #[arg(long)]
    pub size: Option<u32>,

    /// Minimum short side in pixels
    #[arg(long)]
    pub min_side: Option<u32>,

    /// JPEG quality (1-100)
    #[arg(long)]
    pub jpeg_quality: Option<u8>,

    /// File name pattern (e.g., "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_format).context("Failed to initialize tracing")?;

    match &cli.command {
        Command::Download(args) => run_download(args).await,
        Command::Preprocess(args) => run_preprocess(args),
        Command::Classes { config } => list_classes(config.as_ref()),
    }
}

fn init_tracing(verbose_count: u8, format: TracingFormat) -> Result<()> {
    let mut config = TracingConfig::new()
        .with_verbosity(verbose_count)
        .with_format(format);
    if let Ok(filter) = std::env::var("RUST_LOG") {
        config = config.with_env_filter(filter);
    }
    config
        .init()
        .context("Failed to initialize tracing subscriber")?;

    debug!(verbosity = verbose_count, format = ?format, "Tracing initialized");
    Ok(())
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

async fn run_download(args: &DownloadArgs) -> Result<()> {
    let config = CliConfigBuilder::dataset_config(args).context("Invalid download configuration")?;

    info!(
        "Assembling {} classes into {} ({} per class)",
        config.classes.len(),
        config.output_dir.display(),
        config.per_class
    );

    let crawler = BingImageCrawler::new(config.workers, config.fetch_params())
        .context("Failed to create image crawler")?;
    let assembler = DatasetAssembler::new(crawler, config);
    let classes = assembler.config().classes.clone();

    let start = Instant::now();
    let pb = progress_bar(classes.len());
    let mut results: Vec<(String, crate::Result<ClassReport>)> = Vec::with_capacity(classes.len());

    for class in &classes {
        pb.set_message(class.label.clone());
        let result = assembler.assemble_class(class).await;
        if let Err(e) = &result {
            error!("[{}] failed: {}", class.label, e);
        }
        results.push((class.label.clone(), result));
        pb.inc(1);
    }
    pb.finish_and_clear();

    print_download_summary(&results, start.elapsed().as_secs_f64());
    Ok(())
}

fn print_download_summary(results: &[(String, crate::Result<ClassReport>)], seconds: f64) {
    println!("Dataset summary ({seconds:.1}s):");
    for (label, result) in results {
        match result {
            Ok(report) if report.skipped => {
                println!("  {label:<12} {:>5} files (already complete)", report.total);
            },
            Ok(report) => println!(
                "  {label:<12} {:>5} files (+{} downloaded, {} rejected, {} trimmed)",
                report.total, report.downloaded, report.removed, report.trimmed
            ),
            Err(e) => println!("  {label:<12} failed: {e}"),
        }
    }
}

fn run_preprocess(args: &PreprocessArgs) -> Result<()> {
    let config =
        CliConfigBuilder::preprocess_config(args).context("Invalid preprocess configuration")?;
    let preprocessor = BatchPreprocessor::new(config);

    let sources = preprocessor
        .checked_sources()
        .context("Missing input folders")?;
    if sources.is_empty() {
        println!(
            "No class folders found in {}",
            preprocessor.config().raw_dir.display()
        );
        return Ok(());
    }

    let pb = progress_bar(sources.len());
    let mut results: Vec<(String, crate::Result<BatchReport>)> = Vec::with_capacity(sources.len());
    for source in &sources {
        pb.set_message(source.clone());
        let result = preprocessor.run_class(source);
        if let Err(e) = &result {
            error!("[{}] failed: {}", source, e);
        }
        results.push((source.clone(), result));
        pb.inc(1);
    }
    pb.finish_and_clear();

    println!("Preprocess summary:");
    for (source, result) in &results {
        match result {
            Ok(report) => println!(
                "  {:<12} -> {:<12} total={} ok={} failed={}",
                report.source, report.label, report.total, report.ok, report.failed
            ),
            Err(e) => println!("  {source:<12} failed: {e}"),
        }
    }
    println!(
        "Done. Results in {}",
        preprocessor.config().out_dir.display()
    );
    Ok(())
}

fn list_classes(config: Option<&PathBuf>) -> Result<()> {
    let args = DownloadArgs {
        config: config.cloned(),
        ..DownloadArgs::default()
    };
    let config = CliConfigBuilder::dataset_config(&args).context("Invalid dataset configuration")?;

    for class in &config.classes {
        println!("{}", class.label);
        for query in &class.queries {
            println!("  - {query}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_download_flags() {
        let cli = Cli::try_parse_from([
            "anime-dataset",
            "-vv",
            "download",
            "--per-class",
            "50",
            "--size",
            "wallpaper",
            "--strict-filter",
            "--class",
            "kakashi",
            "--class",
            "sasuke",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, TracingFormat::Console);
        let Command::Download(args) = cli.command else {
            panic!("expected download");
        };
        assert_eq!(args.per_class, Some(50));
        assert_eq!(args.size, Some(SizeFilter::Wallpaper));
        assert!(args.strict_filter);
        assert!(!args.dedupe);
        assert_eq!(args.classes, ["kakashi", "sasuke"]);
    }

    #[test]
    fn test_parse_preprocess_flags() {
        let cli = Cli::try_parse_from([
            "anime-dataset",
            "preprocess",
            "--raw-dir",
            "data/raw",
            "--alias",
            "to_guy=might_guy",
            "--source",
            "to_guy",
            "--pattern",
            "*.png",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 1);
        let Command::Preprocess(args) = cli.command else {
            panic!("expected preprocess");
        };
        assert_eq!(args.raw_dir, Some(PathBuf::from("data/raw")));
        assert_eq!(args.aliases, ["to_guy=might_guy"]);
        assert_eq!(args.sources, ["to_guy"]);
        assert_eq!(args.pattern.as_deref(), Some("*.png"));
    }

    #[test]
    fn test_parse_log_format() {
        let cli = Cli::try_parse_from(["anime-dataset", "classes", "--log-format", "compact"]).unwrap();
        assert_eq!(cli.log_format, TracingFormat::Compact);

        let cli = Cli::try_parse_from(["anime-dataset", "--log-format", "json", "classes"]).unwrap();
        assert_eq!(cli.log_format, TracingFormat::Json);

        assert!(Cli::try_parse_from(["anime-dataset", "--log-format", "xml", "classes"]).is_err());
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["anime-dataset"]).is_err());
        assert!(Cli::try_parse_from(["anime-dataset", "download", "--size", "huge"]).is_err());
    }
}
