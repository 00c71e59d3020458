//! Exporter capability
//!
//! The export itself belongs to the external training toolkit. The
//! packager only sees this trait, so tests can substitute a fake.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pack_core::{Error, ExportConfig, Result};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Lines of exporter stderr kept in error messages
const STDERR_TAIL_LINES: usize = 20;

/// Turns a checkpoint into an inference-ready streaming bundle
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Export `checkpoint` into `output_dir`
    ///
    /// The exporter is expected to populate `output_dir` with the model
    /// files and its own `config.json`.
    async fn export(&self, checkpoint: &Path, output_dir: &Path) -> Result<()>;
}

/// Exporter running an external command
///
/// Invoked as `program args... <checkpoint> <output_dir>`.
#[derive(Debug, Clone)]
pub struct CommandExporter {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl CommandExporter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout: None,
        }
    }

    /// Build from the export settings, running inside `working_dir`
    pub fn from_config(config: &ExportConfig, working_dir: Option<PathBuf>) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            working_dir,
            timeout: config.timeout,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Paths handed to a child running in another directory must be absolute
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl Exporter for CommandExporter {
    #[instrument(skip(self), fields(program = %self.program))]
    async fn export(&self, checkpoint: &Path, output_dir: &Path) -> Result<()> {
        let checkpoint = absolute(checkpoint)?;
        let output_dir = absolute(output_dir)?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&checkpoint)
            .arg(&output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(checkpoint = %checkpoint.display(), output = %output_dir.display(), "Spawning exporter");
        let child = command.spawn().map_err(|e| Error::ExportFailed {
            target: checkpoint.display().to_string(),
            message: format!("failed to run {}: {}", self.program, e),
        })?;
        // Progress goes straight to our stdout; only stderr is kept
        let running = child.wait_with_output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, running)
                .await
                .map_err(|_| Error::Timeout {
                    operation: format!("export {}", checkpoint.display()),
                    timeout_ms: limit.as_millis() as u64,
                })?,
            None => running.await,
        }
        .map_err(|e| Error::ExportFailed {
            target: checkpoint.display().to_string(),
            message: format!("failed waiting for {}: {}", self.program, e),
        })?;

        if !output.status.success() {
            return Err(Error::ExportFailed {
                target: checkpoint.display().to_string(),
                message: format!("{} ({})", output.status, stderr_tail(&output.stderr)),
            });
        }

        debug!(checkpoint = %checkpoint.display(), "Exporter finished");
        Ok(())
    }
}
