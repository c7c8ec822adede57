//! Image search crawling
//!
//! [`ImageCrawler`] is the seam the dataset assembler depends on. The
//! built-in implementation, [`BingImageCrawler`], pages through Bing image
//! search results and downloads hits concurrently through a
//! [`FilteredDownloader`] wrapping an [`HttpDownloader`].

use crate::error::{DatasetError, Result};
use crate::filter::{
    CandidateItem, FetchOutcome, FetchParams, FilterPolicy, FilteredDownloader, ImageDownloader,
    SkipReason,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use futures_util::TryStreamExt;
use image::ImageFormat;
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

const BING_ASYNC_URL: &str = "https://www.bing.com/images/async";

/// Results requested per search page
const PAGE_SIZE: usize = 35;

/// Upper bound on pages fetched for a single query
const MAX_PAGES: usize = 20;

/// Responses larger than this are discarded
const MAX_IMAGE_BYTES: usize = 25 * 1024 * 1024;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Image size class requested from the search engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum SizeFilter {
    Small,
    Medium,
    #[default]
    Large,
    Wallpaper,
}

impl SizeFilter {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Wallpaper => "wallpaper",
        }
    }
}

impl std::fmt::Display for SizeFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One crawl of one query into one folder
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub query: String,
    /// Stop after this many saved images
    pub max_num: usize,
    pub size: SizeFilter,
    pub output_dir: PathBuf,
    /// Applied to every hit before download
    pub filter: FilterPolicy,
}

/// Counters from a single crawl
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages: usize,
    pub candidates: usize,
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CrawlStats {
    fn record(&mut self, outcome: &Result<FetchOutcome>) {
        match outcome {
            Ok(FetchOutcome::Saved(_)) => self.saved += 1,
            Ok(FetchOutcome::Skipped(_)) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// External image search: fetch up to `max_num` images for a query into a folder
#[async_trait]
pub trait ImageCrawler: Send + Sync {
    /// Run one query
    ///
    /// # Errors
    /// - Crawler setup failures (unreadable output folder, HTTP client errors)
    async fn crawl(&self, request: &CrawlRequest) -> Result<CrawlStats>;
}

/// Bing image search crawler
#[derive(Debug, Clone)]
pub struct BingImageCrawler {
    client: Client,
    workers: usize,
    params: FetchParams,
    base_url: String,
}

impl BingImageCrawler {
    /// Create a crawler downloading with `workers` concurrent requests
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(workers: usize, params: FetchParams) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| DatasetError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            workers: workers.max(1),
            params,
            base_url: BING_ASYNC_URL.to_string(),
        })
    }

    /// Point the crawler at a different search endpoint
    #[must_use]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Result page URL for `query` starting at result `offset`
    ///
    /// # Errors
    /// - Base URL is not a valid URL
    pub fn page_url(&self, query: &str, offset: usize, size: SizeFilter) -> Result<Url> {
        let mut url = Url::parse_with_params(
            &self.base_url,
            &[
                ("q", query.to_string()),
                ("first", offset.to_string()),
                ("count", PAGE_SIZE.to_string()),
            ],
        )
        .map_err(|e| DatasetError::invalid_config(format!("Invalid search URL: {e}")))?;

        // Bing expects the filter's leading '+' unescaped
        let query_string = format!(
            "{}&qft=+filterui:imagesize-{}",
            url.query().unwrap_or_default(),
            size.as_str()
        );
        url.set_query(Some(&query_string));
        Ok(url)
    }

    async fn fetch_page(&self, url: Url) -> Result<String> {
        let response = self
            .client
            .get(url.clone())
            .timeout(self.params.timeout * 2)
            .send()
            .await
            .map_err(|e| DatasetError::network_error(format!("Failed to fetch {url}"), e))?;

        if !response.status().is_success() {
            return Err(DatasetError::Network(format!(
                "HTTP error {} for {}",
                response.status(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| DatasetError::network_error("Failed to read search page", e))
    }
}

#[async_trait]
impl ImageCrawler for BingImageCrawler {
    async fn crawl(&self, request: &CrawlRequest) -> Result<CrawlStats> {
        let downloader = FilteredDownloader::new(
            HttpDownloader::new(self.client.clone(), &request.output_dir)?,
            request.filter.clone(),
        );
        let saved = AtomicUsize::new(0);
        let mut seen = HashSet::new();
        let mut stats = CrawlStats::default();

        for page in 0..MAX_PAGES {
            if saved.load(Ordering::SeqCst) >= request.max_num {
                break;
            }

            let url = self.page_url(&request.query, page * PAGE_SIZE, request.size)?;
            let html = match self.fetch_page(url).await {
                Ok(html) => html,
                Err(e) => {
                    log::warn!("Stopping query '{}': {}", request.query, e);
                    break;
                },
            };
            stats.pages += 1;

            let items: Vec<CandidateItem> = parse_bing_results(&html)
                .into_iter()
                .filter(|item| item.url.as_ref().is_some_and(|u| seen.insert(u.clone())))
                .collect();
            if items.is_empty() {
                log::debug!("No new results on page {} for '{}'", page, request.query);
                break;
            }
            stats.candidates += items.len();

            let downloads: Vec<_> = items
                .into_iter()
                .map(|item| download_one(&downloader, item, &self.params, &saved, request.max_num))
                .collect();
            let outcomes: Vec<Result<FetchOutcome>> = stream::iter(downloads)
                .buffer_unordered(self.workers)
                .collect()
                .await;

            for outcome in &outcomes {
                stats.record(outcome);
            }
        }

        log::info!(
            "Query '{}': {} saved, {} skipped, {} failed from {} candidates",
            request.query,
            stats.saved,
            stats.skipped,
            stats.failed,
            stats.candidates
        );
        Ok(stats)
    }
}

/// Download a single hit unless the crawl already reached its cap
///
/// A slot is reserved in `saved` before the request and released when
/// nothing gets written, so concurrent downloads never exceed `max_num`.
async fn download_one<D: ImageDownloader>(
    downloader: &D,
    item: CandidateItem,
    params: &FetchParams,
    saved: &AtomicUsize,
    max_num: usize,
) -> Result<FetchOutcome> {
    if saved
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max_num).then_some(n + 1))
        .is_err()
    {
        return Ok(FetchOutcome::Skipped(SkipReason::LimitReached));
    }
    let outcome = downloader.download(&item, params).await;
    match &outcome {
        Ok(FetchOutcome::Saved(path)) => log::debug!("Saved {}", path.display()),
        Ok(FetchOutcome::Skipped(_)) => {
            saved.fetch_sub(1, Ordering::SeqCst);
        },
        Err(e) => {
            saved.fetch_sub(1, Ordering::SeqCst);
            log::debug!(
                "Download failed for {}: {}",
                item.url.as_deref().unwrap_or(""),
                e
            );
        },
    }
    outcome
}

/// Metadata attached to a Bing result tile
#[derive(Debug, Deserialize)]
struct BingTileMeta {
    murl: Option<String>,
    purl: Option<String>,
    t: Option<String>,
}

fn tile_meta_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\bm="(\{[^"]*\})""#).expect("valid tile regex"))
}

/// Extract search hits from a Bing result page
#[must_use]
pub fn parse_bing_results(html: &str) -> Vec<CandidateItem> {
    tile_meta_regex()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1))
        .filter_map(|m| {
            let json = unescape_html(m.as_str());
            match serde_json::from_str::<BingTileMeta>(&json) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    log::trace!("Skipping unparsable tile metadata: {}", e);
                    None
                },
            }
        })
        .filter(|meta| meta.murl.is_some())
        .map(|meta| CandidateItem {
            url: meta.murl,
            source_url: meta.purl,
            title: meta.t,
        })
        .collect()
}

/// Decode the HTML entities Bing uses inside attribute values
#[must_use]
pub fn unescape_html(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Downloads hits over HTTP into a folder as `NNNNNN.<ext>`
///
/// Numbering continues after the highest purely numeric file stem already
/// present in the folder.
#[derive(Debug)]
pub struct HttpDownloader {
    client: Client,
    root_dir: PathBuf,
    next_index: AtomicUsize,
}

impl HttpDownloader {
    /// Create a downloader writing into `root_dir` (created if missing)
    ///
    /// # Errors
    /// - Folder cannot be created or read
    pub fn new<P: AsRef<Path>>(client: Client, root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&root_dir)
            .map_err(|e| DatasetError::file_io_error("create download directory", &root_dir, &e))?;
        let next = next_file_index(&root_dir)?;
        Ok(Self {
            client,
            root_dir,
            next_index: AtomicUsize::new(next),
        })
    }

    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// GET `url` with retries; non-success statuses are not retried
    async fn fetch_bytes(&self, url: &str, params: &FetchParams) -> Result<Vec<u8>> {
        let attempts = params.max_retry.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.fetch_once(url, params).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::Fatal(e)) => return Err(e),
                Err(FetchError::Retryable(e)) => {
                    log::debug!("Attempt {}/{} for {} failed: {}", attempt, attempts, url, e);
                    last_error = Some(e);
                },
            }
        }

        Err(last_error.unwrap_or_else(|| DatasetError::Network(format!("No attempts made for {url}"))))
    }

    async fn fetch_once(&self, url: &str, params: &FetchParams) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(params.timeout)
            .send()
            .await
            .map_err(|e| FetchError::Retryable(DatasetError::network_error(format!("Failed to download {url}"), e)))?;

        if !response.status().is_success() {
            return Err(FetchError::Fatal(DatasetError::Network(format!(
                "HTTP error {} for {}",
                response.status(),
                url
            ))));
        }

        let mut body = Vec::new();
        let mut stream = std::pin::pin!(response.bytes_stream());
        while let Some(chunk) = stream
            .try_next()
            .await
            .map_err(|e| FetchError::Retryable(DatasetError::network_error("Failed to read download stream", e)))?
        {
            body.extend_from_slice(&chunk);
            if body.len() > MAX_IMAGE_BYTES {
                return Err(FetchError::Fatal(DatasetError::Network(format!(
                    "Response for {url} exceeds {MAX_IMAGE_BYTES} bytes"
                ))));
            }
        }
        Ok(body)
    }
}

enum FetchError {
    Retryable(DatasetError),
    Fatal(DatasetError),
}

#[async_trait]
impl ImageDownloader for HttpDownloader {
    async fn download(&self, item: &CandidateItem, params: &FetchParams) -> Result<FetchOutcome> {
        let Some(url) = item.url.as_deref() else {
            return Ok(FetchOutcome::Skipped(SkipReason::NotAnImage));
        };

        let bytes = self.fetch_bytes(url, params).await?;
        let Some(extension) = image::guess_format(&bytes).ok().and_then(supported_extension) else {
            log::debug!("Discarding {}: not a supported image", url);
            return Ok(FetchOutcome::Skipped(SkipReason::NotAnImage));
        };

        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let path = self.root_dir.join(format!("{index:06}.{extension}"));
        if path.exists() && !params.overwrite {
            return Ok(FetchOutcome::Skipped(SkipReason::Exists));
        }

        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| DatasetError::file_io_error("write downloaded image", &path, &e))?;
        Ok(FetchOutcome::Saved(path))
    }
}

/// File extension for formats the dataset accepts
#[must_use]
pub fn supported_extension(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Png => Some("png"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Bmp => Some("bmp"),
        _ => None,
    }
}

/// One past the highest purely numeric file stem in `dir` (1 when none)
///
/// # Errors
/// - Directory cannot be read
pub fn next_file_index(dir: &Path) -> Result<usize> {
    let highest = crate::files::list_files(dir)?
        .iter()
        .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
        .filter(|stem| !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|stem| stem.parse::<usize>().ok())
        .max()
        .unwrap_or(0);
    Ok(highest + 1)
}
