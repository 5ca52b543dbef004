//! `tracing` subscriber setup.
//!
//! A console layer on stderr filtered by `RUST_LOG` (default `warn`), plus an
//! optional per-run file layer at DEBUG for deploy and rollback.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use deploy_common::Variant;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::infra::config::data_dir;

/// `~/.agent-deploy/logs`
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn logs_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("logs"))
}

/// `deploy-<variant>-<name>-<YYYYmmdd-HHMMSS>.log` inside `dir`.
#[must_use]
pub fn run_log_path(dir: &Path, variant: Variant, name: &str, at: DateTime<Local>) -> PathBuf {
    dir.join(format!(
        "deploy-{}-{name}-{}.log",
        variant.tag(),
        at.format("%Y%m%d-%H%M%S")
    ))
}

/// Install the global subscriber. With `run_log`, DEBUG events are also
/// appended to that file.
///
/// # Errors
///
/// Returns an error if the log file cannot be created. A subscriber that is
/// already installed is left in place.
pub fn init(color: bool, run_log: Option<&Path>) -> Result<()> {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(color)
        .with_target(false)
        .with_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        );

    let file_layer = match run_log {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating directory {}", parent.display()))?;
            }
            let file = File::create(path)
                .with_context(|| format!("creating log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_filter(LevelFilter::DEBUG),
            )
        }
        None => None,
    };

    if tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .is_err()
    {
        tracing::debug!("subscriber already installed");
    }
    Ok(())
}
