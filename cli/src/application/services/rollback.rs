//! Application service — rollback use-case.
//!
//! Walks the variant's plan backwards and runs every reversal, whatever
//! happened to the ones before it. Missing targets are skipped, so a second
//! rollback of the same target is harmless. The isolated user's OS identity
//! and the registry entry are left alone.

use std::path::Path;

use deploy_common::Variant;

use crate::application::ports::{CommandRunner, DeploymentRecordStore, LocalFs, ProgressReporter};
use crate::application::services::host::run_privileged;
use crate::application::services::runner::{
    ReversalOutcome, ReversalRecord, ReversalStatus, StepReverser, run_reversals,
};
use crate::domain::config::DeployConfig;
use crate::domain::deployment::{DeploymentPlan, Reversal, validate_target_name};
use crate::domain::error::DeployError;
use crate::domain::host;

/// `launchctl` exit status for a service that is not loaded.
const LAUNCHCTL_NO_SUCH_PROCESS: i32 = 3;
/// `pkill` exit status when nothing matched.
const PKILL_NO_MATCH: i32 = 1;

/// Outcome of one rollback run.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub variant: Variant,
    pub target_name: String,
    pub records: Vec<ReversalRecord>,
    /// Commands the operator has to run by hand.
    pub manual_actions: Vec<String>,
}

impl RollbackReport {
    #[must_use]
    pub fn failures(&self) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r.status, ReversalStatus::Failed(_)))
            .count()
    }
}

/// What to roll back. `port` comes from the registry entry or, failing
/// that, the deployment record.
#[derive(Debug, Clone, Copy)]
pub struct RollbackTarget<'a> {
    pub variant: Variant,
    pub name: &'a str,
    pub port: Option<u16>,
}

/// Host ports rollback acts through.
pub struct RollbackPorts<'a, C, F, D> {
    pub runner: &'a C,
    pub fs: &'a F,
    pub records: &'a D,
}

struct HostReverser<'a, C, F, D> {
    ports: &'a RollbackPorts<'a, C, F, D>,
    config: &'a DeployConfig,
    home: &'a Path,
    variant: Variant,
    name: &'a str,
    port: Option<u16>,
}

impl<C, F, D> HostReverser<'_, C, F, D>
where
    C: CommandRunner,
    F: LocalFs,
    D: DeploymentRecordStore,
{
    async fn stop_service(&self) -> Result<ReversalOutcome, DeployError> {
        match self.variant {
            Variant::SharedProfile => {
                let cmd =
                    host::stop_shared_service(&self.config.service_binary, self.name, self.port);
                let output = self
                    .ports
                    .runner
                    .run(&cmd.program, &cmd.arg_refs())
                    .await
                    .map_err(|e| DeployError::config(&e))?;
                match output.status.code() {
                    Some(0) => Ok(ReversalOutcome::Reverted),
                    Some(PKILL_NO_MATCH) => Ok(ReversalOutcome::Skipped(
                        "no matching gateway process".to_string(),
                    )),
                    code => Err(DeployError::Config(format!(
                        "`{}` exited with {code:?}",
                        cmd.display()
                    ))),
                }
            }
            Variant::IsolatedUser => {
                let label = self.config.service_label(self.name);
                let cmd = host::bootout_daemon(&label);
                let output = self
                    .ports
                    .runner
                    .run(&cmd.program, &cmd.arg_refs())
                    .await
                    .map_err(|e| DeployError::permission(&e))?;
                match output.status.code() {
                    Some(0) => Ok(ReversalOutcome::Reverted),
                    Some(LAUNCHCTL_NO_SUCH_PROCESS) => {
                        Ok(ReversalOutcome::Skipped(format!("{label} is not loaded")))
                    }
                    _ => Err(DeployError::Permission(format!(
                        "`{}` failed: {}",
                        cmd.display(),
                        String::from_utf8_lossy(&output.stderr).trim()
                    ))),
                }
            }
        }
    }

    async fn remove_descriptor(&self) -> Result<ReversalOutcome, DeployError> {
        let descriptor = self.config.descriptor_path(self.name);
        if !self.ports.fs.exists(&descriptor) {
            return Ok(ReversalOutcome::Skipped(format!(
                "{} does not exist",
                descriptor.display()
            )));
        }
        run_privileged(self.ports.runner, &host::remove_privileged(&descriptor), None).await?;
        Ok(ReversalOutcome::Reverted)
    }

    fn remove_profile_dir(&self) -> Result<ReversalOutcome, DeployError> {
        if self.variant != Variant::SharedProfile {
            return Ok(ReversalOutcome::Skipped(
                "isolated-user homes are removed by hand".to_string(),
            ));
        }
        let dir = DeployConfig::profile_dir(self.home, self.name);
        if !self.ports.fs.exists(&dir) {
            return Ok(ReversalOutcome::Skipped(format!(
                "{} does not exist",
                dir.display()
            )));
        }
        self.ports
            .fs
            .remove_dir_all(&dir)
            .map_err(|e| DeployError::config(&e))?;
        Ok(ReversalOutcome::Reverted)
    }

    fn remove_record(&self) -> Result<ReversalOutcome, DeployError> {
        let removed = self
            .ports
            .records
            .remove_record(self.variant, self.name)
            .map_err(|e| DeployError::config(&e))?;
        Ok(if removed {
            ReversalOutcome::Reverted
        } else {
            ReversalOutcome::Skipped("no deployment record".to_string())
        })
    }
}

impl<C, F, D> StepReverser<Reversal> for HostReverser<'_, C, F, D>
where
    C: CommandRunner,
    F: LocalFs,
    D: DeploymentRecordStore,
{
    async fn reverse(&mut self, reversal: &Reversal) -> Result<ReversalOutcome, DeployError> {
        match reversal {
            Reversal::StopService => self.stop_service().await,
            Reversal::RemoveServiceDescriptor => self.remove_descriptor().await,
            Reversal::RemoveProfileDir => self.remove_profile_dir(),
            Reversal::RemoveDeploymentRecord => self.remove_record(),
        }
    }
}

/// Undo a deployment of `target` as far as possible.
///
/// # Errors
///
/// Returns `DeployError::Prerequisite` only for an invalid name. Individual
/// reversal failures are recorded in the report, never returned.
pub async fn rollback<C, F, D>(
    ports: &RollbackPorts<'_, C, F, D>,
    reporter: &impl ProgressReporter,
    config: &DeployConfig,
    home: &Path,
    target: &RollbackTarget<'_>,
) -> Result<RollbackReport, DeployError>
where
    C: CommandRunner,
    F: LocalFs,
    D: DeploymentRecordStore,
{
    let RollbackTarget {
        variant,
        name,
        port,
    } = *target;
    validate_target_name(name)?;
    let plan = DeploymentPlan::for_variant(variant, name);
    let sequence = plan.rollback_sequence();
    tracing::info!(
        variant = variant.tag(),
        agent = name,
        reversals = sequence.len(),
        "rollback started"
    );

    let mut reverser = HostReverser {
        ports,
        config,
        home,
        variant,
        name,
        port,
    };
    let records = run_reversals(&sequence, &mut reverser, reporter).await;

    let manual_actions = match variant {
        Variant::SharedProfile => Vec::new(),
        Variant::IsolatedUser => host::manual_user_removal(config, name),
    };
    let report = RollbackReport {
        variant,
        target_name: name.to_string(),
        records,
        manual_actions,
    };
    tracing::info!(agent = name, failures = report.failures(), "rollback finished");
    Ok(report)
}
