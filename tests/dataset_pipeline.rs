//! End-to-end dataset assembly with a scripted crawler
//!
//! Exercises the full per-class flow: crawl, light normalization, trimming
//! and renaming, without touching the network.

mod common;

use anime_dataset::{ClassQueries, DatasetAssembler, DatasetConfig};
use common::{file_names, Fixture, ScriptedCrawler};
use image::ImageFormat;
use std::path::Path;
use tempfile::TempDir;

fn config(root: &Path, per_class: usize, classes: Vec<ClassQueries>) -> DatasetConfig {
    DatasetConfig {
        output_dir: root.to_path_buf(),
        per_class,
        classes,
        ..DatasetConfig::default()
    }
}

fn kakashi() -> ClassQueries {
    ClassQueries::new(
        "kakashi",
        ["Kakashi episode screenshot", "Kakashi anime frame screenshot"],
    )
}

#[tokio::test]
async fn test_assembly_is_idempotent() {
    let root = TempDir::new().expect("Failed to create temp directory");
    let script = vec![
        Ok(vec![Fixture::Good, Fixture::Good, Fixture::Tiny]),
        Ok(vec![Fixture::Good, Fixture::Garbage, Fixture::Transparent]),
    ];
    let assembler = DatasetAssembler::new(
        ScriptedCrawler::new(script),
        config(root.path(), 3, vec![kakashi()]),
    );

    let report = assembler.assemble_class(&kakashi()).await.unwrap();
    assert!(!report.skipped);
    assert_eq!(report.queries_run, 2);
    assert_eq!(report.removed, 2);
    assert_eq!(report.trimmed, 1);
    assert_eq!(report.total, 3);

    let folder = root.path().join("kakashi");
    let names = file_names(&folder);
    assert_eq!(
        names,
        ["kakashi_0400.jpg", "kakashi_0401.jpg", "kakashi_0402.jpg"]
    );
    let before: Vec<Vec<u8>> = names
        .iter()
        .map(|n| std::fs::read(folder.join(n)).unwrap())
        .collect();

    // second run: target already met, nothing is crawled or touched
    let rerun = DatasetAssembler::new(
        ScriptedCrawler::new(vec![Ok(vec![Fixture::Good])]),
        config(root.path(), 3, vec![kakashi()]),
    );
    let report = rerun.assemble_class(&kakashi()).await.unwrap();

    assert!(report.skipped);
    assert_eq!(rerun.crawler().calls(), 0);
    assert_eq!(file_names(&folder), names);
    let after: Vec<Vec<u8>> = names
        .iter()
        .map(|n| std::fs::read(folder.join(n)).unwrap())
        .collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_every_kept_file_is_a_large_rgb_jpeg() {
    let root = TempDir::new().expect("Failed to create temp directory");
    let script = vec![Ok(vec![
        Fixture::Transparent,
        Fixture::Tiny,
        Fixture::Good,
        Fixture::Garbage,
        Fixture::Good,
    ])];
    let assembler = DatasetAssembler::new(
        ScriptedCrawler::new(script),
        config(root.path(), 10, vec![kakashi()]),
    );

    let report = assembler.assemble_class(&kakashi()).await.unwrap();
    assert_eq!(report.total, 3);

    let folder = root.path().join("kakashi");
    for name in file_names(&folder) {
        let bytes = std::fs::read(folder.join(&name)).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg, "{name}");
        let img = image::load_from_memory(&bytes).unwrap();
        assert!(matches!(img, image::DynamicImage::ImageRgb8(_)), "{name}");
        assert!(img.width().min(img.height()) >= 220, "{name}");
    }
}

#[tokio::test]
async fn test_crawl_failure_moves_on_to_next_query() {
    let root = TempDir::new().expect("Failed to create temp directory");
    let script = vec![
        Err("search engine unavailable".to_string()),
        Ok(vec![Fixture::Good, Fixture::Good]),
    ];
    let assembler = DatasetAssembler::new(
        ScriptedCrawler::new(script),
        config(root.path(), 2, vec![kakashi()]),
    );

    let report = assembler.assemble_class(&kakashi()).await.unwrap();
    assert_eq!(assembler.crawler().calls(), 2);
    assert_eq!(report.downloaded, 2);
    assert_eq!(
        file_names(&root.path().join("kakashi")),
        ["kakashi_0400.jpg", "kakashi_0401.jpg"]
    );
}

#[tokio::test]
async fn test_exhausted_queries_leave_partial_class() {
    let root = TempDir::new().expect("Failed to create temp directory");
    let script = vec![Ok(vec![Fixture::Good]), Ok(vec![Fixture::Tiny])];
    let assembler = DatasetAssembler::new(
        ScriptedCrawler::new(script),
        config(root.path(), 5, vec![kakashi()]),
    );

    let report = assembler.assemble_class(&kakashi()).await.unwrap();
    assert_eq!(report.queries_run, 2);
    assert_eq!(report.total, 1);
    assert_eq!(file_names(&root.path().join("kakashi")), ["kakashi_0400.jpg"]);
}

#[tokio::test]
async fn test_failing_class_does_not_stop_the_others() {
    let root = TempDir::new().expect("Failed to create temp directory");
    // a plain file where the class folder should go
    std::fs::write(root.path().join("naruto"), b"not a folder").unwrap();

    let classes = vec![
        ClassQueries::new("naruto", ["Naruto episode screenshot"]),
        ClassQueries::new("sasuke", ["Sasuke episode screenshot"]),
    ];
    let assembler = DatasetAssembler::new(
        ScriptedCrawler::new(vec![Ok(vec![Fixture::Good])]),
        config(root.path(), 1, classes),
    );

    let results = assembler.assemble_all().await;
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0, "naruto");
    assert!(results[0].1.is_err());
    assert_eq!(results[1].0, "sasuke");
    assert_eq!(results[1].1.as_ref().unwrap().total, 1);
    assert_eq!(
        file_names(&root.path().join("sasuke")),
        ["sasuke_0400.jpg"]
    );
}
