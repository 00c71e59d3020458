//! Concurrent batch test
//!
//! Drives the batch over several voices in a pool that shares one download
//! cache, and checks each archive holds only its own voice.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::build_index;
use hub::{CacheHandle, LocalRepo, RemoteRepo};
use pack_core::{ArchiveFormat, CacheStrategy, Concurrency, PipelineConfig};
use packager::{archive, Exporter};
use parking_lot::Mutex;
use pipeline::app;
use regex::Regex;
use tempfile::TempDir;

const VOICES: [&str; 5] = ["alan", "amy", "joe", "kathleen", "ryan"];

/// Wraps a repository and records every fetched path
struct RecordingRepo {
    inner: LocalRepo,
    fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl RemoteRepo for RecordingRepo {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn list_files(&self) -> pack_core::Result<Vec<String>> {
        self.inner.list_files().await
    }

    async fn fetch(&self, path: &str, cache: &CacheHandle) -> pack_core::Result<PathBuf> {
        self.fetched.lock().push(path.to_string());
        self.inner.fetch(path, cache).await
    }
}

/// Copies the checkpoint into the bundle and tracks how many exports overlap
#[derive(Default)]
struct SlowExporter {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl Exporter for SlowExporter {
    async fn export(&self, checkpoint: &Path, output_dir: &Path) -> pack_core::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(40)).await;
        tokio::fs::copy(checkpoint, output_dir.join("model.onnx")).await?;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

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
    for voice in VOICES {
        let dir = root.join("en/en_GB").join(voice).join("medium");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("epoch=1000.ckpt"), format!("{} weights", voice)).unwrap();
        std::fs::write(dir.join("config.json"), format!(r#"{{"speaker": "{}"}}"#, voice)).unwrap();
    }
}

#[tokio::test]
async fn test_pooled_batch_with_shared_cache() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mirror = dir.path().join("mirror");
    seed_mirror(&mirror);

    let mut config = PipelineConfig::default();
    config.source.local_mirror = Some(mirror.clone());
    config.packaging.output_dir = dir.path().join("outputs");
    config.packaging.archive_dir = dir.path().join("packed");
    config.batch.concurrency = Concurrency::Pooled;
    config.batch.workers = 2;
    config.batch.cache = CacheStrategy::Shared;
    config.batch.shared_cache_dir = dir.path().join("cache");

    let repo = Arc::new(RecordingRepo {
        inner: LocalRepo::new(&mirror),
        fetched: Mutex::new(Vec::new()),
    });
    let listing = repo.list_files().await?;
    let index = build_index(listing.as_slice(), &Regex::new(r"\.ckpt$")?);
    assert_eq!(index.len(), VOICES.len());

    let exporter = Arc::new(SlowExporter::default());
    let driver = app::build_driver(&config, repo.clone(), exporter.clone());

    let report = driver.run_all(&index).await?;
    assert_eq!(report.packaged.len(), VOICES.len());
    assert!(report.is_success());

    let peak = exporter.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "pool exceeded its workers: {}", peak);

    for voice in VOICES {
        let archive_path = config
            .packaging
            .archive_dir
            .join(format!("en_GB-{}+RT-medium.zip", voice));
        let model = archive::read_entry(ArchiveFormat::Zip, &archive_path, "model.onnx")?;
        assert_eq!(model, format!("{} weights", voice).into_bytes());

        let raw = archive::read_entry(ArchiveFormat::Zip, &archive_path, "config.json")?;
        let patched: serde_json::Value = serde_json::from_slice(&raw)?;
        assert_eq!(patched["speaker"], voice);
        assert_eq!(patched["key"], format!("en_GB-{}+RT-medium", voice));
    }

    // Complete archives are skipped without touching the repository
    repo.fetched.lock().clear();
    let report = driver.run_all(&index).await?;
    assert_eq!(report.skipped.len(), VOICES.len());
    assert!(repo.fetched.lock().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_keep_going_reports_every_failure() -> Result<()> {
    init_tracing();
    let dir = TempDir::new()?;
    let mirror = dir.path().join("mirror");
    seed_mirror(&mirror);
    // Break two voices by removing their configs
    std::fs::remove_file(mirror.join("en/en_GB/amy/medium/config.json"))?;
    std::fs::remove_file(mirror.join("en/en_GB/ryan/medium/config.json"))?;

    let mut config = PipelineConfig::default();
    config.packaging.output_dir = dir.path().join("outputs");
    config.packaging.archive_dir = dir.path().join("packed");
    config.batch.keep_going = true;
    config.batch.cache = CacheStrategy::ScopedTemp;

    let repo = Arc::new(LocalRepo::new(&mirror));
    let listing = repo.list_files().await?;
    // Configs are indexed as siblings whether or not they exist
    let index = build_index(listing.as_slice(), &Regex::new(r"\.ckpt$")?);
    assert_eq!(index.len(), VOICES.len());

    let driver = app::build_driver(&config, repo, Arc::new(SlowExporter::default()));
    let report = driver.run_all(&index).await?;

    assert_eq!(report.packaged.len(), 3);
    let failed: Vec<&str> = report.failed.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(failed, vec!["en_GB-amy-medium", "en_GB-ryan-medium"]);
    assert!(!report.is_success());
    Ok(())
}
