//! Application context — unified state passed to every command handler.
//!
//! Built once per invocation from the top-level flags. Commands reach the
//! configuration, the command runner, the registry, and the record store
//! through it.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::domain::config::DeployConfig;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::{YamlConfigStore, data_dir};
use crate::infra::records::FileRecordStore;
use crate::infra::registry::{FileRegistryStore, default_registry_path};
use crate::output::OutputContext;

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Behaviour flags.
pub struct BehaviourFlags {
    /// Skip interactive prompts (also set by the `CI` env var).
    pub yes: bool,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    /// Output rendering options.
    pub output: OutputFlags,
    /// Behaviour options.
    pub behaviour: BehaviourFlags,
    /// Registry file override (`--registry` / `AGENT_DEPLOY_REGISTRY`).
    pub registry: Option<PathBuf>,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    /// Host-wide deployment settings.
    pub config: DeployConfig,
    /// Host command runner.
    pub runner: TokioCommandRunner,
    /// Operator's home directory.
    pub home: PathBuf,
    /// Registry file location.
    pub registry_path: PathBuf,
    /// When `true`, skip interactive prompts and use defaults.
    ///
    /// Set when `--yes` / `-y` is passed, or when the `CI` environment
    /// variable is present.
    pub non_interactive: bool,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined or the
    /// configuration file cannot be parsed.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let non_interactive = flags.behaviour.yes || std::env::var_os("CI").is_some();

        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };

        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
        let registry_path = match &flags.registry {
            Some(path) => path.clone(),
            None => default_registry_path()?,
        };

        Ok(Self {
            // JSON mode owns stdout; progress and notices would corrupt it.
            output: OutputContext::new(
                flags.output.no_color,
                flags.output.quiet || flags.output.json,
            ),
            mode,
            config: YamlConfigStore.load().context("loading configuration")?,
            runner: TokioCommandRunner::default(),
            home,
            registry_path,
            non_interactive,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Lock and load the allocation registry. Blocks while another
    /// invocation holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be locked, read, or validated.
    pub fn open_registry(&self) -> Result<FileRegistryStore> {
        FileRegistryStore::open(&self.registry_path)
    }

    /// Deployment records, next to the registry by default.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be determined.
    pub fn record_store(&self) -> Result<FileRecordStore> {
        Ok(FileRecordStore::new(data_dir()?.join("deployments")))
    }

    /// Ask the user for confirmation.
    ///
    /// When `non_interactive` is `true` (CI or `--yes`), returns `true`
    /// immediately without prompting.
    ///
    /// # Errors
    ///
    /// Returns an error if the terminal prompt fails (e.g. no TTY available).
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.non_interactive {
            return Ok(true);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()?;
        Ok(confirmed)
    }
}
