//! Deployment configuration — host layout, service binary, and defaults.
//!
//! Pure types only. Loading from disk is done by `crate::infra::config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Host-wide deployment settings.
///
/// Every field has a default so a missing or partial `config.yaml` still
/// yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Model identifier written into generated configuration.
    pub default_model: String,
    /// Root of the read-only shared resource tree.
    pub shared_path: PathBuf,
    /// Service executable name, looked up on `PATH`.
    pub service_binary: String,
    /// Absolute executable path used in daemon descriptors.
    pub service_binary_path: PathBuf,
    /// Environment variable that points the service at its configuration.
    pub config_env_var: String,
    /// Base document generated configuration is merged onto, when present.
    /// A leading `~/` is resolved against the operator's home.
    pub source_config: String,
    /// Auth profile document copied into an isolated user's home, when present.
    pub auth_profiles: String,
    /// Shared sub-paths linked into every workspace.
    pub shared_links: Vec<String>,
    pub users_root: PathBuf,
    pub launch_daemons_dir: PathBuf,
    pub service_label_prefix: String,
    pub primary_group_id: u32,
    pub user_shell: String,
    /// Dependency installation, run as the isolated user, one argv per entry.
    pub install_commands: Vec<Vec<String>>,
    /// Seconds to wait after starting the service before verifying it.
    pub startup_wait_secs: u64,
    /// Environment variable holding the model provider API key.
    pub api_key_env: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            default_model: "anthropic/claude-sonnet-4-6".to_string(),
            shared_path: PathBuf::from("/Users/Shared/openclaw-common"),
            service_binary: "openclaw".to_string(),
            service_binary_path: PathBuf::from("/opt/homebrew/bin/openclaw"),
            config_env_var: "OPENCLAW_CONFIG".to_string(),
            source_config: "~/.openclaw/openclaw.json".to_string(),
            auth_profiles: "~/.openclaw/agents/main/agent/auth-profiles.json".to_string(),
            shared_links: [
                "skills/summarize",
                "skills/meeting-notes",
                "skills/domain-model-extract",
                "protocols",
                "knowledge",
            ]
            .iter()
            .map(ToString::to_string)
            .collect(),
            users_root: PathBuf::from("/Users"),
            launch_daemons_dir: PathBuf::from("/Library/LaunchDaemons"),
            service_label_prefix: "ai.openclaw".to_string(),
            primary_group_id: 20,
            user_shell: "/bin/zsh".to_string(),
            install_commands: vec![
                argv(&["brew", "install", "node@20"]),
                argv(&["npm", "install", "-g", "openclaw", "--force"]),
            ],
            startup_wait_secs: 3,
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

impl DeployConfig {
    /// Daemon label for an isolated user, e.g. `ai.openclaw.ops.gateway`.
    #[must_use]
    pub fn service_label(&self, username: &str) -> String {
        format!("{}.{username}.gateway", self.service_label_prefix)
    }

    /// Where the daemon descriptor for `username` is written.
    #[must_use]
    pub fn descriptor_path(&self, username: &str) -> PathBuf {
        self.launch_daemons_dir
            .join(format!("{}.plist", self.service_label(username)))
    }

    #[must_use]
    pub fn user_home(&self, username: &str) -> PathBuf {
        self.users_root.join(username)
    }

    /// `~/.openclaw` inside an isolated user's home.
    #[must_use]
    pub fn user_service_dir(&self, username: &str) -> PathBuf {
        self.user_home(username).join(".openclaw")
    }

    /// Shared-profile directory under the operator's home, e.g.
    /// `~/.openclaw-scout`.
    #[must_use]
    pub fn profile_dir(home: &Path, name: &str) -> PathBuf {
        home.join(format!(".openclaw-{name}"))
    }

    /// Resolve a `~/`-prefixed setting against `home`.
    #[must_use]
    pub fn expand_home(value: &str, home: &Path) -> PathBuf {
        match value.strip_prefix("~/") {
            Some(rest) => home.join(rest),
            None if value == "~" => home.to_path_buf(),
            None => PathBuf::from(value),
        }
    }
}
