//! Download filtering for search hits
//!
//! [`FilteredDownloader`] wraps any [`ImageDownloader`] and consults the
//! keyword classifier before the wrapped downloader is allowed to touch the
//! network or the file system.

use crate::classifier::KeywordClassifier;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// A single image search hit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateItem {
    /// Direct image URL
    pub url: Option<String>,
    /// Page the image was found on
    pub source_url: Option<String>,
    /// Title or caption shown by the search engine
    pub title: Option<String>,
}

impl CandidateItem {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_source_url<S: Into<String>>(mut self, source_url: S) -> Self {
        self.source_url = Some(source_url.into());
        self
    }

    #[must_use]
    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    /// All metadata joined with single spaces, missing fields as empty strings
    #[must_use]
    pub fn text_blob(&self) -> String {
        [&self.url, &self.source_url, &self.title]
            .iter()
            .map(|field| field.as_deref().unwrap_or(""))
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// Per-request download parameters, passed through the filter unchanged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchParams {
    /// Timeout for a single HTTP attempt
    pub timeout: Duration,
    /// Number of attempts before giving up
    pub max_retry: u32,
    /// Replace an existing file with the same name
    pub overwrite: bool,
}

impl Default for FetchParams {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retry: 3,
            overwrite: false,
        }
    }
}

/// Why a hit was not downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Metadata matched the block-list
    Blocked,
    /// Strict mode and metadata had no anime hint
    NoHint,
    /// Target file exists and overwrite is off
    Exists,
    /// Response body is not a recognized image
    NotAnImage,
    /// Crawl already reached its item cap
    LimitReached,
}

/// Result of a single download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Image written to this path
    Saved(PathBuf),
    /// Nothing written
    Skipped(SkipReason),
}

impl FetchOutcome {
    #[must_use]
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved(_))
    }
}

/// Capability to fetch a search hit and store it
#[async_trait]
pub trait ImageDownloader: Send + Sync {
    /// Download `item`, honouring the timeout, retry and overwrite settings
    ///
    /// # Errors
    /// - Network failures after all retries
    /// - File system errors while writing the image
    async fn download(&self, item: &CandidateItem, params: &FetchParams) -> Result<FetchOutcome>;
}

#[async_trait]
impl<T: ImageDownloader + ?Sized> ImageDownloader for Arc<T> {
    async fn download(&self, item: &CandidateItem, params: &FetchParams) -> Result<FetchOutcome> {
        (**self).download(item, params).await
    }
}

/// How strictly metadata is checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Reject only block-listed hits
    #[default]
    Permissive,
    /// Additionally require an anime hint in non-empty metadata
    RequireHint,
}

/// Classifier plus mode, shared between concurrent downloads
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    classifier: Arc<KeywordClassifier>,
    mode: FilterMode,
}

impl FilterPolicy {
    #[must_use]
    pub fn new(classifier: KeywordClassifier, mode: FilterMode) -> Self {
        Self {
            classifier: Arc::new(classifier),
            mode,
        }
    }

    #[must_use]
    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    /// Decide whether `item` must be skipped; `None` lets it through
    ///
    /// Items without any metadata are always let through.
    #[must_use]
    pub fn check(&self, item: &CandidateItem) -> Option<SkipReason> {
        let blob = item.text_blob();
        if blob.is_empty() {
            return None;
        }
        if self.classifier.is_trash(&blob) {
            return Some(SkipReason::Blocked);
        }
        if self.mode == FilterMode::RequireHint && !self.classifier.is_anime_hint(&blob) {
            return Some(SkipReason::NoHint);
        }
        None
    }
}

/// Downloader decorator that drops unwanted hits before fetching
pub struct FilteredDownloader<D> {
    inner: D,
    policy: FilterPolicy,
}

impl<D: ImageDownloader> FilteredDownloader<D> {
    pub fn new(inner: D, policy: FilterPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }
}

#[async_trait]
impl<D: ImageDownloader> ImageDownloader for FilteredDownloader<D> {
    async fn download(&self, item: &CandidateItem, params: &FetchParams) -> Result<FetchOutcome> {
        if let Some(reason) = self.policy.check(item) {
            tracing::debug!(
                url = item.url.as_deref().unwrap_or(""),
                ?reason,
                "Skipping search hit"
            );
            return Ok(FetchOutcome::Skipped(reason));
        }
        self.inner.download(item, params).await
    }
}
