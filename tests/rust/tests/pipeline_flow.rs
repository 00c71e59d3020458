//! End-to-end pipeline test
//!
//! Runs the command-line flow against a local mirror of the checkpoint
//! repository, with a shell script standing in for the toolkit exporter:
//! - Index writing and reuse
//! - Packaging with config patching and model cards
//! - Skipping complete archives on re-runs
//! - Publishing the archive directory

#![cfg(unix)]

use anyhow::Result;
use checkpoint::load_index;
use hub::{LocalPublisher, Publisher};
use pack_core::{ArchiveFormat, CacheStrategy, Concurrency, KeyFormat, PipelineConfig};
use packager::archive;
use pipeline::{app, RunOptions};
use serde_json::Value;
use std::path::Path;
use tempfile::TempDir;

const EXPORT_SCRIPT: &str = r#"cp "$1" "$2/model.onnx" && echo '{"from_exporter": true}' > "$2/config.json""#;

/// Route pipeline logs through the test harness
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipeline=debug,packager=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

fn seed_mirror(root: &Path) {
    let files = [
        ("en/en_US/amy/medium/epoch=6679.ckpt", "amy weights"),
        (
            "en/en_US/amy/medium/config.json",
            r#"{"audio": {"sample_rate": 22050}, "language": {"code": "en_US"}}"#,
        ),
        ("en/en_US/amy/medium/MODEL_CARD", "# Model card for amy"),
        ("de/de_DE/eva_k/x_low/epoch=2000.ckpt", "eva weights"),
        ("de/de_DE/eva_k/x_low/config.json", r#"{"audio": {"sample_rate": 16000}}"#),
        ("README.md", "checkpoints"),
    ];
    for (path, body) in files {
        let full = root.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, body).unwrap();
    }
}

fn config_for(dir: &TempDir) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.source.local_mirror = Some(dir.path().join("mirror"));
    config.index.path = dir.path().join("checkpoints.json");
    config.toolkit.dir = dir.path().join("piper");
    config.export.program = "sh".to_string();
    config.export.args = vec!["-c".to_string(), EXPORT_SCRIPT.to_string(), "export".to_string()];
    config.packaging.output_dir = dir.path().join("outputs");
    config.packaging.archive_dir = dir.path().join("packed");
    config.batch.shared_cache_dir = dir.path().join("cache");
    config
}

fn skip_setup() -> RunOptions {
    RunOptions {
        skip_setup: true,
        ..Default::default()
    }
}

fn archived_config(format: ArchiveFormat, archive_path: &Path) -> Value {
    let raw = archive::read_entry(format, archive_path, "config.json").unwrap();
    serde_json::from_slice(&raw).unwrap()
}

#[tokio::test]
async fn test_full_run_sequential_zip() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    seed_mirror(&dir.path().join("mirror"));
    let config = config_for(&dir);

    let report = app::run(&config, &skip_setup()).await?;
    assert_eq!(report.packaged, vec!["de_DE-eva_k-x_low", "en_US-amy-medium"]);

    let index = load_index(&config.index.path).await?;
    assert_eq!(index.len(), 2);
    assert!(index["de_DE-eva_k-x_low"].model_card.is_none());

    let amy = dir.path().join("packed/en_US-amy+RT-medium.zip");
    let names = archive::list_entries(ArchiveFormat::Zip, &amy)?;
    assert_eq!(names, vec!["MODEL_CARD", "config.json", "model.onnx"]);

    let patched = archived_config(ArchiveFormat::Zip, &amy);
    assert_eq!(patched["key"], "en_US-amy+RT-medium");
    assert_eq!(patched["streaming"], true);
    assert_eq!(patched["language"]["code"], "en_US");
    assert!(patched.get("from_exporter").is_none());

    let model = archive::read_entry(ArchiveFormat::Zip, &amy, "model.onnx")?;
    assert_eq!(model, b"amy weights");

    // A second run skips everything
    let report = app::run(&config, &skip_setup()).await?;
    assert_eq!(report.skipped.len(), 2);
    assert!(report.packaged.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_existing_index_is_used_as_is() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    seed_mirror(&dir.path().join("mirror"));
    let mut config = config_for(&dir);
    config.packaging.archive_format = ArchiveFormat::TarGz;
    config.packaging.key_format = KeyFormat::RtSegment;

    // Hand-written index naming a single voice with a short key
    std::fs::write(
        &config.index.path,
        r#"{"en-amy-medium": {"checkpoint": "en/en_US/amy/medium/epoch=6679.ckpt", "config": "en/en_US/amy/medium/config.json"}}"#,
    )?;
    let before = std::fs::read(&config.index.path)?;

    let report = app::run(&config, &skip_setup()).await?;
    assert_eq!(report.packaged, vec!["en-amy-medium"]);
    assert_eq!(std::fs::read(&config.index.path)?, before);

    let archive_path = dir.path().join("packed/en-amy-rt-medium.tar.gz");
    let names = archive::list_entries(ArchiveFormat::TarGz, &archive_path)?;
    assert_eq!(names, vec!["config.json", "model.onnx"]);
    let patched = archived_config(ArchiveFormat::TarGz, &archive_path);
    assert_eq!(patched["key"], "en-amy-rt-medium");
    assert_eq!(patched["streaming"], true);

    Ok(())
}

#[tokio::test]
async fn test_pooled_shared_cache_then_publish() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    seed_mirror(&dir.path().join("mirror"));
    let mut config = config_for(&dir);
    config.batch.concurrency = Concurrency::Pooled;
    config.batch.workers = 2;
    config.batch.cache = CacheStrategy::Shared;

    let report = app::run(&config, &skip_setup()).await?;
    assert_eq!(report.packaged.len(), 2);
    assert!(!config.batch.shared_cache_dir.exists(), "shared cache purged after batch");

    let publisher = LocalPublisher::new(dir.path().join("published"));
    let published = publisher
        .publish(&config.packaging.archive_dir, ArchiveFormat::Zip.extension())
        .await?;
    assert_eq!(
        published.files,
        vec!["de_DE-eva_k+RT-x_low.zip", "en_US-amy+RT-medium.zip"]
    );
    Ok(())
}

#[tokio::test]
async fn test_failing_exporter_fails_the_run() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    seed_mirror(&dir.path().join("mirror"));
    let mut config = config_for(&dir);
    config.export.args = vec!["-c".to_string(), "exit 7".to_string(), "export".to_string()];

    let result = app::run(&config, &skip_setup()).await;
    match result {
        Err(pack_core::Error::BatchFailed { failed, .. }) => assert_eq!(failed, 1),
        other => panic!("expected BatchFailed, got {:?}", other),
    }

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("packed"))?
        .filter_map(|e| e.ok())
        .collect();
    assert!(leftovers.is_empty(), "no archive for a failed voice");
    Ok(())
}
