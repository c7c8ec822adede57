//! Error types for dataset collection and preprocessing

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for dataset operations
pub type Result<T> = std::result::Result<T, DatasetError>;

/// Error types for crawling, normalization and dataset assembly
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// HTTP request or response errors
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required input folder is missing at startup
    #[error("Required input not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// Image short side is below the configured minimum
    #[error("Image too small: {width}x{height} (minimum side {min_side})")]
    Undersized {
        width: u32,
        height: u32,
        min_side: u32,
    },

    /// Configuration file parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DatasetError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a network error with the underlying cause
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Whether this error came from the size gate rather than a broken file
    #[must_use]
    pub fn is_undersized(&self) -> bool {
        matches!(self, Self::Undersized { .. })
    }
}
