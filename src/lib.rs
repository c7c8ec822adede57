#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::new_without_default)]

//! # Anime Dataset Builder
//!
//! Builds image-classification datasets of anime characters in two stages:
//!
//! 1. **Assemble**: for each class, run image-search queries, download hits
//!    whose metadata passes a keyword filter, drop files that are undecodable
//!    or too small, re-encode the rest as RGB JPEG, cap the folder at a
//!    target count and rename to `<label>_<NNNN>.jpg`.
//! 2. **Preprocess**: walk raw class folders, resize every image so its
//!    short side hits a target, center-crop to a square and write numbered
//!    JPEGs into per-class output folders.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use anime_dataset::{BingImageCrawler, DatasetAssembler, DatasetConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DatasetConfig::default();
//! let crawler = BingImageCrawler::new(config.workers, config.fetch_params())?;
//! let assembler = DatasetAssembler::new(crawler, config);
//! for (label, result) in assembler.assemble_all().await {
//!     println!("{label}: {:?}", result.map(|r| r.total));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ```rust,no_run
//! use anime_dataset::{BatchPreprocessor, PreprocessConfig};
//!
//! # fn example() -> anime_dataset::Result<()> {
//! let preprocessor = BatchPreprocessor::new(PreprocessConfig::default());
//! for report in preprocessor.run_all()? {
//!     println!("{} -> {}: {}/{}", report.source, report.label, report.ok, report.total);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): command-line interface, progress bars and tracing subscriber setup
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`: JSON log output for the CLI

pub mod assembler;
pub mod classifier;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod crawl;
pub mod error;
pub mod files;
pub mod filter;
pub mod normalize;
pub mod preprocess;
#[cfg(feature = "cli")]
pub mod tracing_config;

pub use assembler::{postprocess_folder, ClassReport, DatasetAssembler, PostprocessStats};
pub use classifier::{is_anime_hint, is_trash, KeywordClassifier, ALLOW_HINTS, BLOCK_WORDS};
pub use config::{ClassQueries, DatasetConfig, PreprocessConfig};
pub use crawl::{
    BingImageCrawler, CrawlRequest, CrawlStats, HttpDownloader, ImageCrawler, SizeFilter,
};
pub use error::{DatasetError, Result};
pub use files::{rename_sequential, trim_excess, RenameStats};
pub use filter::{
    CandidateItem, FetchOutcome, FetchParams, FilterMode, FilterPolicy, FilteredDownloader,
    ImageDownloader, SkipReason,
};
pub use normalize::{ensure_rgb_and_min_size, normalize_to_square, LightOutcome, SquareOptions};
pub use preprocess::{BatchPreprocessor, BatchReport};
#[cfg(feature = "cli")]
pub use tracing_config::{TracingConfig, TracingFormat};
