//! Training toolkit checkout
//!
//! The exporter lives in a fork of the training toolkit. This clones it,
//! switches to the streaming branch and builds its native extension.

use std::ffi::OsStr;
use std::path::Path;

use pack_core::{Error, Result, ToolkitConfig};
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Outcome of [`ensure_toolkit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolkitOutcome {
    /// The checkout directory already existed
    AlreadyPresent,

    /// A fresh checkout was made
    Installed,
}

async fn run<I, S>(program: &str, args: I, cwd: Option<&Path>) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    debug!(program, cwd = ?cwd, "Running toolkit command");
    let output = command.output().await.map_err(|e| Error::Toolkit {
        message: format!("failed to run {}: {}", program, e),
    })?;
    if !output.status.success() {
        return Err(Error::Toolkit {
            message: format!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

/// Make sure the toolkit is checked out and built
///
/// An existing checkout is left alone unless `force` is set, in which case
/// it is removed and cloned again.
#[instrument(skip(config), fields(dir = %config.dir.display()))]
pub async fn ensure_toolkit(config: &ToolkitConfig, force: bool) -> Result<ToolkitOutcome> {
    if config.dir.is_dir() {
        if !force {
            debug!("Toolkit already checked out");
            return Ok(ToolkitOutcome::AlreadyPresent);
        }
        info!("Removing existing toolkit checkout");
        tokio::fs::remove_dir_all(&config.dir).await?;
    }

    info!(url = %config.repo_url, "Cloning toolkit");
    run(
        "git",
        [OsStr::new("clone"), OsStr::new(&config.repo_url), config.dir.as_os_str()],
        None,
    )
    .await?;

    info!(branch = %config.branch, "Checking out toolkit branch");
    run("git", ["checkout", config.branch.as_str()], Some(config.dir.as_path())).await?;

    if let Some(script) = &config.build_script {
        let python_dir = config.python_path();
        info!(script = %script, "Building toolkit extensions");
        run("sh", [script.as_str()], Some(python_dir.as_path())).await?;
    }

    Ok(ToolkitOutcome::Installed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_existing_checkout_is_kept() {
        let dir = tempdir().unwrap();
        let checkout = dir.path().join("piper");
        std::fs::create_dir_all(checkout.join("src/python")).unwrap();
        std::fs::write(checkout.join("marker"), b"keep").unwrap();

        let config = ToolkitConfig {
            repo_url: "/nonexistent/piper.git".to_string(),
            dir: checkout.clone(),
            ..Default::default()
        };
        let outcome = ensure_toolkit(&config, false).await.unwrap();
        assert_eq!(outcome, ToolkitOutcome::AlreadyPresent);
        assert!(checkout.join("marker").is_file());
    }

    #[tokio::test]
    async fn test_forced_setup_replaces_checkout() {
        let dir = tempdir().unwrap();
        let checkout = dir.path().join("piper");
        std::fs::create_dir_all(&checkout).unwrap();
        std::fs::write(checkout.join("marker"), b"stale").unwrap();

        let config = ToolkitConfig {
            repo_url: dir.path().join("missing.git").display().to_string(),
            dir: checkout.clone(),
            ..Default::default()
        };
        let result = ensure_toolkit(&config, true).await;
        assert!(matches!(result, Err(Error::Toolkit { .. })));
        assert!(!checkout.join("marker").exists());
    }
}
