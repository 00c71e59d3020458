//! Batch driver
//!
//! Runs the packager over every voice of an index. Each voice gets its own
//! cache handle; a shared cache is only purged once the whole batch is over.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hub::CacheHandle;
use pack_core::{
    BatchConfig, CacheStrategy, CheckpointIndex, CheckpointRecord, Concurrency, Error, Result,
};
use packager::{PackageOutcome, VoicePackager};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Summary of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Voices that got a new archive
    pub packaged: Vec<String>,

    /// Voices whose archive was already complete
    pub skipped: Vec<String>,

    /// Voices that failed, with the error message
    pub failed: Vec<(String, String)>,

    /// Voices not attempted because an earlier voice failed
    pub not_started: Vec<String>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.packaged.len() + self.skipped.len() + self.failed.len() + self.not_started.len()
    }

    fn sort(&mut self) {
        self.packaged.sort();
        self.skipped.sort();
        self.failed.sort();
        self.not_started.sort();
    }

    fn record(&mut self, voice_key: String, outcome: VoiceOutcome) {
        match outcome {
            VoiceOutcome::Done(PackageOutcome::Packaged { .. }) => {
                info!(voice_key = %voice_key, "Completed voice");
                self.packaged.push(voice_key);
            }
            VoiceOutcome::Done(PackageOutcome::Skipped { .. }) => {
                info!(voice_key = %voice_key, "Completed voice (already packaged)");
                self.skipped.push(voice_key);
            }
            VoiceOutcome::Failed(e) => {
                error!(
                    voice_key = %voice_key,
                    error = %e,
                    retryable = e.is_retryable(),
                    fatal = e.is_fatal(),
                    "Voice failed"
                );
                self.failed.push((voice_key, e.to_string()));
            }
            VoiceOutcome::NotStarted => self.not_started.push(voice_key),
        }
    }
}

enum VoiceOutcome {
    Done(PackageOutcome),
    Failed(Error),
    NotStarted,
}

/// Hands out a cache handle per voice
#[derive(Debug, Clone)]
struct CacheFactory {
    strategy: CacheStrategy,
    shared_dir: PathBuf,
    scoped_root: Option<PathBuf>,
}

impl CacheFactory {
    fn handle(&self) -> Result<CacheHandle> {
        match self.strategy {
            CacheStrategy::Shared => Ok(CacheHandle::shared(&self.shared_dir)),
            CacheStrategy::ScopedTemp => match &self.scoped_root {
                Some(root) => CacheHandle::scoped_in(root),
                None => CacheHandle::scoped(),
            },
        }
    }
}

/// Drives the packager over a whole checkpoint index
pub struct BatchDriver {
    packager: VoicePackager,
    config: BatchConfig,
}

impl BatchDriver {
    pub fn new(packager: VoicePackager, config: BatchConfig) -> Self {
        Self { packager, config }
    }

    fn cache_factory(&self) -> CacheFactory {
        CacheFactory {
            strategy: self.config.cache,
            shared_dir: self.config.shared_cache_dir.clone(),
            scoped_root: self.config.scoped_cache_root.clone(),
        }
    }

    /// Package every voice in `index`
    ///
    /// Without `keep_going`, no voice is started after the first failure
    /// and the batch returns `BatchFailed`.
    pub async fn run_all(&self, index: &CheckpointIndex) -> Result<BatchReport> {
        info!(
            voices = index.len(),
            concurrency = ?self.config.concurrency,
            cache = ?self.config.cache,
            "Starting batch"
        );

        let report = match self.config.concurrency {
            Concurrency::Sequential => self.run_sequential(index).await,
            Concurrency::Pooled => self.run_pooled(index).await?,
        };

        if self.config.cache == CacheStrategy::Shared && self.config.purge_shared_cache {
            CacheHandle::shared(&self.config.shared_cache_dir)
                .purge()
                .await;
        }

        info!(
            packaged = report.packaged.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            not_started = report.not_started.len(),
            "Batch finished"
        );

        if !self.config.keep_going {
            if let Some((voice_key, message)) = report.failed.first() {
                return Err(Error::BatchFailed {
                    failed: report.failed.len(),
                    first: format!("{}: {}", voice_key, message),
                });
            }
        }
        Ok(report)
    }

    async fn run_sequential(&self, index: &CheckpointIndex) -> BatchReport {
        let caches = self.cache_factory();
        let mut report = BatchReport::default();
        let mut aborted = false;

        for (voice_key, record) in index {
            if aborted {
                report.record(voice_key.clone(), VoiceOutcome::NotStarted);
                continue;
            }

            let outcome = package_one(&self.packager, &caches, voice_key, record).await;
            if matches!(outcome, VoiceOutcome::Failed(_)) && !self.config.keep_going {
                aborted = true;
            }
            report.record(voice_key.clone(), outcome);
        }

        report
    }

    async fn run_pooled(&self, index: &CheckpointIndex) -> Result<BatchReport> {
        let workers = self.config.workers.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let abort = Arc::new(AtomicBool::new(false));
        let keep_going = self.config.keep_going;
        let caches = self.cache_factory();
        let mut tasks = JoinSet::new();

        info!(workers, "Scheduling voices on worker pool");
        for (voice_key, record) in index {
            let voice_key = voice_key.clone();
            let record = record.clone();
            let semaphore = Arc::clone(&semaphore);
            let abort = Arc::clone(&abort);
            let packager = self.packager.clone();
            let caches = caches.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (voice_key, VoiceOutcome::NotStarted),
                };
                if abort.load(Ordering::SeqCst) {
                    return (voice_key, VoiceOutcome::NotStarted);
                }

                let outcome = package_one(&packager, &caches, &voice_key, &record).await;
                if matches!(outcome, VoiceOutcome::Failed(_)) && !keep_going {
                    abort.store(true, Ordering::SeqCst);
                }
                (voice_key, outcome)
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((voice_key, outcome)) => report.record(voice_key, outcome),
                Err(e) => {
                    warn!(error = %e, "Voice task did not complete");
                    return Err(Error::Internal {
                        message: format!("Voice task failed: {}", e),
                    });
                }
            }
        }

        // Tasks finish in any order
        report.sort();
        Ok(report)
    }
}

async fn package_one(
    packager: &VoicePackager,
    caches: &CacheFactory,
    voice_key: &str,
    record: &CheckpointRecord,
) -> VoiceOutcome {
    // A scoped cache lives exactly as long as this call
    let cache = match caches.handle() {
        Ok(cache) => cache,
        Err(e) => return VoiceOutcome::Failed(e),
    };
    match packager.package(voice_key, record, &cache).await {
        Ok(outcome) => VoiceOutcome::Done(outcome),
        Err(e) => VoiceOutcome::Failed(e),
    }
}
