//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` — never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use deploy_common::{AllocationEntry, DeploymentRecord, Variant};

use crate::domain::artifacts::TemplateVars;
use crate::domain::error::DeployError;
use crate::domain::registry::AllocationRegistry;

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
    /// Start a long-running program in its own process group with extra
    /// environment variables, without waiting for it. Returns its PID.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn spawn_detached(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<u32>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait — no async needed.
///
/// `index` is 1-based.
pub trait ProgressReporter {
    /// A step is about to run.
    fn step_started(&self, index: usize, total: usize, name: &str);
    /// The running step finished.
    fn step_succeeded(&self, index: usize, total: usize, name: &str);
    /// The running step failed; no further steps will start.
    fn step_failed(&self, index: usize, total: usize, name: &str, error: &str);
    /// The running step is blocked on a fixed wait.
    fn waiting(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Emit an informational message.
    fn info(&self, message: &str);
}

// ── Filesystem Port ───────────────────────────────────────────────────────────

/// Abstracts local filesystem operations so services can be tested without
/// touching the real disk.
pub trait LocalFs {
    fn exists(&self, path: &Path) -> bool;
    /// # Errors
    /// Returns an error if the directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// # Errors
    /// Returns an error if the directory cannot be removed.
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    /// # Errors
    /// Returns an error if the file cannot be removed.
    fn remove_file(&self, path: &Path) -> Result<()>;
    /// # Errors
    /// Returns an error if the file cannot be written.
    fn write(&self, path: &Path, content: &str) -> Result<()>;
    /// # Errors
    /// Returns an error if the file cannot be read.
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Create `link` pointing at `target`, replacing whatever is at `link`.
    ///
    /// # Errors
    ///
    /// Returns an error if the existing entry cannot be removed or the link
    /// cannot be created.
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
}

// ── Network Probe Port ────────────────────────────────────────────────────────

/// Abstracts network connectivity checks so application services can be tested
/// without real network access.
#[allow(async_fn_in_trait)]
pub trait NetworkProbe {
    /// Check TCP connectivity to the given host and port within `timeout`.
    async fn check_tcp_connectivity(&self, host: &str, port: u16, timeout: Duration)
    -> Result<bool>;
}

// ── Template Port ─────────────────────────────────────────────────────────────

/// Renders a named template with a variable mapping.
pub trait TemplateRenderer {
    /// # Errors
    ///
    /// Returns `DeployError::Config` for an unknown template or a placeholder
    /// with no value.
    fn render(&self, name: &str, vars: &TemplateVars) -> Result<String, DeployError>;
}

// ── Registry and Record Ports ─────────────────────────────────────────────────

/// Durable allocation registry. The only way to mutate it is
/// `register_allocation`, which persists before returning.
pub trait RegistryStore {
    /// Current in-memory view.
    fn registry(&self) -> &AllocationRegistry;
    /// Append `entry`, advance the variant's cursor, and persist.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Prerequisite` on a port or UID collision (nothing
    /// is changed) and `DeployError::Registry` if persisting fails.
    fn register_allocation(&mut self, entry: AllocationEntry) -> Result<(), DeployError>;
}

/// Where deployment records are kept.
pub trait DeploymentRecordStore {
    /// Write (or overwrite) the record for its variant and name.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or written.
    fn save_record(&self, record: &DeploymentRecord) -> Result<PathBuf>;
    /// Remove the record. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be removed.
    fn remove_record(&self, variant: Variant, name: &str) -> Result<bool>;
}
