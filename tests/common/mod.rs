//! Shared fixtures for integration tests

#![allow(dead_code)]

use anime_dataset::crawl::{CrawlRequest, CrawlStats, ImageCrawler};
use anime_dataset::{DatasetError, Result};
use async_trait::async_trait;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;
use std::sync::Mutex;

/// Write a solid RGB image; format follows the extension
pub fn write_rgb(path: &Path, width: u32, height: u32, seed: u8) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([seed, (x % 251) as u8, (y % 241) as u8])
    })
    .save(path)
    .unwrap();
}

/// Write an RGBA PNG
pub fn write_rgba_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, 128]))
        .save(path)
        .unwrap();
}

/// Sorted file names directly inside `dir`
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().unwrap().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// What a scripted crawl writes into the request folder
#[derive(Debug, Clone, Copy)]
pub enum Fixture {
    /// Large RGB PNG
    Good,
    /// RGBA PNG of sufficient size
    Transparent,
    /// Image below every minimum side
    Tiny,
    /// Bytes that decode as nothing
    Garbage,
}

/// Crawler replaying one script entry per call; extra calls write nothing
pub struct ScriptedCrawler {
    script: Vec<std::result::Result<Vec<Fixture>, String>>,
    pub queries: Mutex<Vec<String>>,
}

impl ScriptedCrawler {
    pub fn new(script: Vec<std::result::Result<Vec<Fixture>, String>>) -> Self {
        Self {
            script,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageCrawler for ScriptedCrawler {
    async fn crawl(&self, request: &CrawlRequest) -> Result<CrawlStats> {
        let call = {
            let mut queries = self.queries.lock().unwrap();
            queries.push(request.query.clone());
            queries.len()
        };

        let fixtures = match self.script.get(call - 1) {
            Some(Ok(fixtures)) => fixtures.clone(),
            Some(Err(message)) => return Err(DatasetError::Network(message.clone())),
            None => Vec::new(),
        };

        std::fs::create_dir_all(&request.output_dir)?;
        for (i, fixture) in fixtures.iter().enumerate() {
            let path = request.output_dir.join(format!("{call:03}{i:03}.png"));
            match fixture {
                Fixture::Good => write_rgb(&path, 320, 240, (call * 16 + i) as u8),
                Fixture::Transparent => write_rgba_png(&path, 300, 300),
                Fixture::Tiny => write_rgb(&path, 64, 64, 1),
                Fixture::Garbage => std::fs::write(&path, b"<html>blocked</html>")?,
            }
        }

        Ok(CrawlStats {
            pages: 1,
            candidates: fixtures.len(),
            saved: fixtures.len(),
            ..CrawlStats::default()
        })
    }
}
