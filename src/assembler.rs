//! Dataset assembly
//!
//! For each class: crawl queries until the class folder holds enough files,
//! gate every download through light normalization, trim the surplus and
//! rename the survivors to `<label>_<NNNN>.jpg`.

use crate::config::{ClassQueries, DatasetConfig};
use crate::crawl::{CrawlRequest, ImageCrawler};
use crate::error::{DatasetError, Result};
use crate::files::{self, RenameStats};
use crate::filter::FilterPolicy;
use crate::normalize::{ensure_rgb_and_min_size, LightOutcome};
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span, warn, Instrument};

/// Counts from one light normalization pass over a folder
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PostprocessStats {
    pub kept: usize,
    pub converted: usize,
    pub too_small: usize,
    pub undecodable: usize,
    pub duplicates: usize,
}

impl PostprocessStats {
    fn record(&mut self, outcome: LightOutcome) {
        match outcome {
            LightOutcome::Kept => self.kept += 1,
            LightOutcome::Converted => self.converted += 1,
            LightOutcome::RejectedTooSmall => self.too_small += 1,
            LightOutcome::RejectedUndecodable | LightOutcome::WriteFailed => self.undecodable += 1,
        }
    }

    /// Files deleted by this pass
    #[must_use]
    pub fn removed(&self) -> usize {
        self.too_small + self.undecodable + self.duplicates
    }
}

/// Outcome of assembling one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassReport {
    pub label: String,
    pub folder: PathBuf,
    /// Files present before this run
    pub existing: usize,
    /// Class already met its target; nothing was touched
    pub skipped: bool,
    /// Queries actually crawled
    pub queries_run: usize,
    pub downloaded: usize,
    pub removed: usize,
    pub trimmed: usize,
    pub rename: RenameStats,
    /// Files present at the end
    pub total: usize,
}

/// Light normalization over every image file directly inside `dir`
///
/// With `dedupe`, byte-identical files are removed afterwards.
///
/// # Errors
/// - Directory cannot be read
pub fn postprocess_folder(dir: &Path, min_side: u32, dedupe: bool) -> Result<PostprocessStats> {
    let mut stats = PostprocessStats::default();
    for path in files::list_image_files(dir)? {
        stats.record(ensure_rgb_and_min_size(&path, min_side));
    }
    if dedupe {
        stats.duplicates = files::remove_duplicates(dir)?.len();
    }
    Ok(stats)
}

/// Builds per-class dataset folders using an [`ImageCrawler`]
pub struct DatasetAssembler<C> {
    crawler: C,
    config: DatasetConfig,
    filter: FilterPolicy,
}

impl<C: ImageCrawler> DatasetAssembler<C> {
    pub fn new(crawler: C, config: DatasetConfig) -> Self {
        let filter = FilterPolicy::new(config.keywords.clone(), config.filter_mode);
        Self {
            crawler,
            config,
            filter,
        }
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn crawler(&self) -> &C {
        &self.crawler
    }

    /// Folder owned by `label`
    #[must_use]
    pub fn class_dir(&self, label: &str) -> PathBuf {
        self.config.output_dir.join(label)
    }

    /// Assemble every configured class in order
    ///
    /// A failing class is logged and reported as an error entry; the
    /// remaining classes still run.
    pub async fn assemble_all(&self) -> Vec<(String, Result<ClassReport>)> {
        let mut results = Vec::with_capacity(self.config.classes.len());
        for class in &self.config.classes {
            let result = self.assemble_class(class).await;
            if let Err(e) = &result {
                warn!(label = %class.label, error = %e, "Class failed");
            }
            results.push((class.label.clone(), result));
        }
        results
    }

    /// Assemble a single class folder
    ///
    /// # Errors
    /// - Class folder cannot be created, read, trimmed or renamed
    pub async fn assemble_class(&self, class: &ClassQueries) -> Result<ClassReport> {
        let span = info_span!("class", label = %class.label);
        self.assemble_class_inner(class).instrument(span).await
    }

    async fn assemble_class_inner(&self, class: &ClassQueries) -> Result<ClassReport> {
        let target = self.config.per_class;
        let folder = self.class_dir(&class.label);
        std::fs::create_dir_all(&folder)
            .map_err(|e| DatasetError::file_io_error("create class directory", &folder, &e))?;

        let existing = files::count_files(&folder)?;
        let mut report = ClassReport {
            label: class.label.clone(),
            folder: folder.clone(),
            existing,
            total: existing,
            ..ClassReport::default()
        };

        if existing >= target {
            info!("[{}] already has {} files, skipping.", class.label, existing);
            report.skipped = true;
            return Ok(report);
        }

        let need = target - existing;
        let max_num = self.config.per_query_cap(need);
        info!(
            "[{}] downloading ~{} images into {}",
            class.label,
            need,
            folder.display()
        );

        for query in &class.queries {
            if files::count_files(&folder)? >= target {
                debug!("Target reached, skipping remaining queries");
                break;
            }

            info!("  query: {}", query);
            let request = CrawlRequest {
                query: query.clone(),
                max_num,
                size: self.config.size,
                output_dir: folder.clone(),
                filter: self.filter.clone(),
            };
            report.queries_run += 1;
            match self.crawler.crawl(&request).await {
                Ok(stats) => report.downloaded += stats.saved,
                Err(e) => warn!(query = %query, error = %e, "Crawl failed"),
            }

            let post = postprocess_folder(&folder, self.config.min_side, self.config.dedupe)?;
            debug!(
                kept = post.kept,
                converted = post.converted,
                too_small = post.too_small,
                undecodable = post.undecodable,
                duplicates = post.duplicates,
                "Post-processed folder"
            );
            report.removed += post.removed();
        }

        report.trimmed = files::trim_excess(&folder, target)?.len();
        report.rename = files::rename_sequential(&folder, &class.label, self.config.start_index)?;
        report.total = files::count_files(&folder)?;

        info!("[{}] total now: {}", class.label, report.total);
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl::CrawlStats;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Writes `per_query` valid PNGs (and one tiny image) for every query
    struct FakeCrawler {
        per_query: usize,
        requests: Mutex<Vec<CrawlRequest>>,
    }

    impl FakeCrawler {
        fn new(per_query: usize) -> Self {
            Self {
                per_query,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ImageCrawler for FakeCrawler {
        async fn crawl(&self, request: &CrawlRequest) -> Result<CrawlStats> {
            let round = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                requests.len()
            };
            for i in 0..self.per_query {
                let img = RgbImage::from_pixel(240, 260, Rgb([round as u8, i as u8, 7]));
                img.save(request.output_dir.join(format!("{round:03}{i:03}.png")))
                    .unwrap();
            }
            RgbImage::new(16, 16)
                .save(request.output_dir.join(format!("{round:03}999.png")))
                .unwrap();
            Ok(CrawlStats {
                saved: self.per_query + 1,
                ..CrawlStats::default()
            })
        }
    }

    fn config(root: &Path, per_class: usize) -> DatasetConfig {
        DatasetConfig {
            output_dir: root.to_path_buf(),
            per_class,
            start_index: 1,
            classes: vec![ClassQueries::new("kakashi", ["q1", "q2", "q3"])],
            ..DatasetConfig::default()
        }
    }

    #[tokio::test]
    async fn test_stops_after_target_reached() {
        let root = tempdir().unwrap();
        let assembler = DatasetAssembler::new(FakeCrawler::new(3), config(root.path(), 5));

        let report = assembler.assemble_class(&assembler.config().classes[0]).await.unwrap();

        // q1 -> 3 kept, q2 -> 6 kept, q3 never runs
        assert_eq!(assembler.crawler().requests.lock().unwrap().len(), 2);
        assert_eq!(report.queries_run, 2);
        assert_eq!(report.removed, 2);
        assert_eq!(report.trimmed, 1);
        assert_eq!(report.total, 5);

        let names: Vec<_> = files::list_files(&assembler.class_dir("kakashi"))
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            ["kakashi_0001.jpg", "kakashi_0002.jpg", "kakashi_0003.jpg", "kakashi_0004.jpg", "kakashi_0005.jpg"]
        );
        for name in &names {
            let img = crate::normalize::load_image(assembler.class_dir("kakashi").join(name)).unwrap();
            assert!(img.width().min(img.height()) >= 220);
        }
    }

    #[tokio::test]
    async fn test_request_carries_cap_and_filter_settings() {
        let root = tempdir().unwrap();
        let assembler = DatasetAssembler::new(FakeCrawler::new(10), config(root.path(), 4));
        assembler.assemble_class(&assembler.config().classes[0]).await.unwrap();

        let requests = assembler.crawler().requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].query, "q1");
        assert_eq!(requests[0].max_num, 12);
        assert_eq!(requests[0].output_dir, root.path().join("kakashi"));
    }

    #[tokio::test]
    async fn test_full_folder_is_left_alone() {
        let root = tempdir().unwrap();
        let folder = root.path().join("kakashi");
        std::fs::create_dir_all(&folder).unwrap();
        for name in ["b.png", "a.png", "c.txt"] {
            std::fs::write(folder.join(name), name).unwrap();
        }

        let assembler = DatasetAssembler::new(FakeCrawler::new(3), config(root.path(), 3));
        let report = assembler.assemble_class(&assembler.config().classes[0]).await.unwrap();

        assert!(report.skipped);
        assert!(assembler.crawler().requests.lock().unwrap().is_empty());
        // untouched: not renamed, not normalized
        assert_eq!(std::fs::read_to_string(folder.join("a.png")).unwrap(), "a.png");
        assert_eq!(files::count_files(&folder).unwrap(), 3);
    }

    #[test]
    fn test_postprocess_folder_ignores_non_images() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        std::fs::write(dir.path().join("broken.jpg"), "nope").unwrap();
        RgbImage::new(300, 300).save(dir.path().join("ok.png")).unwrap();

        let stats = postprocess_folder(dir.path(), 220, false).unwrap();
        assert_eq!(stats.converted, 1);
        assert_eq!(stats.undecodable, 1);
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join("broken.jpg").exists());
    }

    #[test]
    fn test_postprocess_folder_dedupes() {
        let dir = tempdir().unwrap();
        let img = RgbImage::from_pixel(300, 300, Rgb([1, 2, 3]));
        img.save(dir.path().join("a.png")).unwrap();
        img.save(dir.path().join("b.png")).unwrap();

        let stats = postprocess_folder(dir.path(), 220, true).unwrap();
        assert_eq!(stats.duplicates, 1);
        assert_eq!(files::count_files(dir.path()).unwrap(), 1);
    }
}
