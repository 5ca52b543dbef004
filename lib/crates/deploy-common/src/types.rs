use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deployment flavor.
///
/// The serialized tag (`l1` / `l2`) is the key used by the registry's
/// `next_available` map, so it must stay stable across releases.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Variant {
    /// Profile directory under the operator's own account.
    #[serde(rename = "l1")]
    #[cfg_attr(feature = "clap", value(name = "shared-profile", alias = "l1"))]
    SharedProfile,
    /// Dedicated OS user supervised by the platform daemon manager.
    #[serde(rename = "l2")]
    #[cfg_attr(feature = "clap", value(name = "isolated-user", alias = "l2"))]
    IsolatedUser,
}

impl Variant {
    /// Registry tag for this variant.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::SharedProfile => "l1",
            Self::IsolatedUser => "l2",
        }
    }

    /// Human-facing name.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::SharedProfile => "shared-profile",
            Self::IsolatedUser => "isolated-user",
        }
    }

    /// Parse a registry tag.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "l1" => Some(Self::SharedProfile),
            "l2" => Some(Self::IsolatedUser),
            _ => None,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One registered allocation, in registration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationEntry {
    /// Profile name or OS username.
    pub name: String,
    /// Deployment flavor that claimed the port.
    #[serde(alias = "mode")]
    pub variant: Variant,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
}

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Lifecycle of a whole deployment attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    Pending,
    Running,
    Completed,
    Aborted,
}

/// Persisted outcome of one step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepRecord {
    pub name: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Persisted outcome of one verification check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRecord {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

/// Deployment record written after every attempt, success or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,
    pub variant: Variant,
    pub status: DeploymentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    pub steps: Vec<StepRecord>,
    #[serde(default)]
    pub checks: Vec<CheckRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// SHA-256 of the generated service configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
