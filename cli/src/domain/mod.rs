//! Domain layer — pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod artifacts;
pub mod config;
pub mod deployment;
pub mod error;
pub mod host;
pub mod registry;

pub use config::DeployConfig;
pub use deployment::{
    DeploymentPlan, DeploymentResult, PlannedStep, Reversal, StepJournal, StepKind, VerifyReport,
    validate_target_name,
};
pub use error::DeployError;
pub use registry::AllocationRegistry;
