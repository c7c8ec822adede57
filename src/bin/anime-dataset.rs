//! Anime dataset CLI tool
//!
//! Builds per-class anime character image datasets: search and download,
//! filter and normalize, then preprocess into square training crops.

#[cfg(feature = "cli")]
use anime_dataset::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
