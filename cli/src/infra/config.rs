//! Loading `DeployConfig` from YAML and locating the data directory.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::domain::config::DeployConfig;

/// Environment override for the configuration file.
pub const CONFIG_ENV: &str = "AGENT_DEPLOY_CONFIG";

/// `~/.agent-deploy`, home of the registry, records, and logs.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn data_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.join(".agent-deploy"))
}

/// Configuration stored as a YAML file on disk.
pub struct YamlConfigStore;

impl YamlConfigStore {
    /// Load the configuration. A missing file yields the defaults, and
    /// missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<DeployConfig> {
        let path = self.path()?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(DeployConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("cannot read {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(DeployConfig::default());
        }
        serde_yaml::from_str(&content).with_context(|| format!("cannot parse {}", path.display()))
    }

    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn path(&self) -> Result<PathBuf> {
        if let Ok(val) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(val));
        }
        Ok(data_dir()?.join("config.yaml"))
    }
}
