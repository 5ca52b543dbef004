//! Typed deployment errors.
//!
//! Every step failure is one of these kinds. They convert into `anyhow::Error`
//! via the `?` operator at the command boundary, and `code()` gives the stable
//! identifier used by `--json` error output.

use thiserror::Error;

/// Failure kinds surfaced by deployment, verification, and registry code.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Missing dependency, missing shared root, target already exists, or
    /// identity collision. Always raised before any mutating step.
    #[error("prerequisite not met: {0}")]
    Prerequisite(String),

    /// Template, rendering, or generated-document failure, or an unprivileged
    /// command that exited non-zero.
    #[error("configuration failed: {0}")]
    Config(String),

    /// A privileged command failed or timed out.
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("pairing failed: {0}")]
    Pairing(String),

    /// The allocation registry could not be read, locked, or persisted.
    #[error("registry error: {0}")]
    Registry(String),
}

impl DeployError {
    /// Stable machine-readable code for this error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Prerequisite(_) => "PREREQUISITE",
            Self::Config(_) => "CONFIG",
            Self::Permission(_) => "PERMISSION",
            Self::Network(_) => "NETWORK",
            Self::Transport(_) => "TRANSPORT",
            Self::Pairing(_) => "PAIRING",
            Self::Registry(_) => "REGISTRY",
        }
    }

    /// Wrap an infrastructure error as a configuration failure, keeping the
    /// full context chain in the message.
    #[must_use]
    pub fn config(err: &anyhow::Error) -> Self {
        Self::Config(format!("{err:#}"))
    }

    /// Wrap an infrastructure error as a permission failure.
    #[must_use]
    pub fn permission(err: &anyhow::Error) -> Self {
        Self::Permission(format!("{err:#}"))
    }

    /// Wrap an infrastructure error as a registry failure.
    #[must_use]
    pub fn registry(err: &anyhow::Error) -> Self {
        Self::Registry(format!("{err:#}"))
    }
}
