//! voicepack binary entry point
//!
//! Converts training checkpoints into streaming voice archives.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pack_core::{ArchiveFormat, CacheStrategy, Concurrency, KeyFormat, PipelineConfig};
use pipeline::{app, ensure_toolkit, RunOptions};

#[derive(Debug, Parser)]
#[command(name = "voicepack", version, about = "Repackage voice checkpoints as streaming archives")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Read checkpoints from a local mirror of the repository
    #[arg(long, global = true)]
    mirror: Option<PathBuf>,

    /// Checkpoint index file
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    /// Hub token for reading checkpoints and publishing archives
    #[arg(long, global = true, env = "HF_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write the checkpoint index
    Index {
        /// Rebuild even if the index exists
        #[arg(long)]
        refresh: bool,
    },

    /// Clone and build the training toolkit
    Setup {
        /// Remove an existing checkout first
        #[arg(long)]
        force: bool,
    },

    /// Set up, index and package every voice
    Run(RunArgs),

    /// Upload packed archives
    Publish {
        /// Destination repository
        #[arg(long)]
        repo: Option<String>,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    #[arg(long)]
    concurrency: Option<Concurrency>,

    /// Pool size for pooled concurrency
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    archive_format: Option<ArchiveFormat>,

    #[arg(long)]
    cache: Option<CacheStrategy>,

    /// Directory holding per-voice scoped caches
    #[arg(long)]
    cache_root: Option<PathBuf>,

    #[arg(long)]
    key_format: Option<KeyFormat>,

    /// Keep packaging after a voice fails
    #[arg(long)]
    keep_going: bool,

    /// Don't clone or build the toolkit
    #[arg(long)]
    skip_setup: bool,

    /// Rebuild the checkpoint index
    #[arg(long)]
    refresh_index: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(concurrency) = self.concurrency {
            config.batch.concurrency = concurrency;
        }
        if let Some(workers) = self.workers {
            config.batch.workers = workers;
        }
        if let Some(format) = self.archive_format {
            config.packaging.archive_format = format;
        }
        if let Some(cache) = self.cache {
            config.batch.cache = cache;
        }
        if let Some(root) = &self.cache_root {
            config.batch.scoped_cache_root = Some(root.clone());
        }
        if let Some(key_format) = self.key_format {
            config.packaging.key_format = key_format;
        }
        if self.keep_going {
            config.batch.keep_going = true;
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(mirror) = &cli.mirror {
        config.source.local_mirror = Some(mirror.clone());
    }
    if let Some(index) = &cli.index {
        config.index.path = index.clone();
    }
    if let Some(token) = &cli.token {
        config.source.token = Some(token.clone());
        config.publish.token = Some(token.clone());
    }
    Ok(config)
}

async fn execute(cli: Cli) -> anyhow::Result<bool> {
    let mut config = load_config(&cli)?;

    match cli.command {
        Command::Index { refresh } => {
            let repo = app::open_repo(&config.source)?;
            app::index(&config, repo.as_ref(), refresh).await?;
        }
        Command::Setup { force } => {
            let outcome = ensure_toolkit(&config.toolkit, force).await?;
            tracing::info!(?outcome, "Toolkit ready");
        }
        Command::Run(args) => {
            args.apply(&mut config);
            let options = RunOptions {
                skip_setup: args.skip_setup,
                force_setup: false,
                refresh_index: args.refresh_index,
            };
            let report = app::run(&config, &options).await?;
            for (voice_key, message) in &report.failed {
                tracing::error!(voice_key = %voice_key, "{}", message);
            }
            return Ok(report.is_success());
        }
        Command::Publish { repo } => {
            if let Some(repo) = repo {
                config.publish.repo_id = repo;
            }
            let report = app::publish(&config).await?;
            tracing::info!(
                files = report.files.len(),
                destination = %report.destination,
                "Published archives"
            );
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "voicepack=info,pipeline=info,packager=info,checkpoint=info,hub=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match execute(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
