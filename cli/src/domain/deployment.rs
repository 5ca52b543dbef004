//! Deployment plan, step journal, and result types.
//!
//! A plan is the ordered list of steps for one variant, each tagged with the
//! reversals that undo it. The journal tracks `pending → running →
//! succeeded | failed` per step; the result is what one run hands back.

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use deploy_common::{CheckRecord, DeploymentStatus, StepRecord, StepStatus, Variant};
use regex::Regex;

use crate::domain::error::DeployError;

/// Profile names and OS usernames share one rule: they are interpolated into
/// paths, daemon labels, and `dscl` record names.
pub static TARGET_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z][a-z0-9_-]{0,31}$").expect("valid regex")
});

/// Check a target name before it reaches any path or command.
///
/// # Errors
///
/// Returns `DeployError::Prerequisite` if the name is not a short lowercase
/// identifier.
pub fn validate_target_name(name: &str) -> Result<(), DeployError> {
    if TARGET_NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(DeployError::Prerequisite(format!(
            "invalid name '{name}': use 1-32 lowercase letters, digits, '-' or '_', starting with a letter"
        )))
    }
}

/// Handle the operator pairs with on the messaging channel.
#[must_use]
pub fn pairing_handle(name: &str) -> String {
    format!("{name}_bot")
}

// ── Steps ─────────────────────────────────────────────────────────────────────

/// One unit of deployment work. Executors decide what each kind does for
/// their variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    CheckPrerequisites,
    CreateProfileDir,
    CreateUser,
    InstallDependencies,
    MaterializeConfig,
    LinkSharedResources,
    RegisterDaemon,
    StartService,
    PairingNotice,
    RegisterAllocation,
}

impl StepKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::CheckPrerequisites => "check prerequisites",
            Self::CreateProfileDir => "create profile directory",
            Self::CreateUser => "create user identity",
            Self::InstallDependencies => "install dependencies",
            Self::MaterializeConfig => "materialize configuration",
            Self::LinkSharedResources => "link shared resources",
            Self::RegisterDaemon => "register daemon",
            Self::StartService => "start service",
            Self::PairingNotice => "pairing notice",
            Self::RegisterAllocation => "register allocation",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Undo action attached to a step. Every reversal must tolerate its target
/// already being gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reversal {
    StopService,
    RemoveServiceDescriptor,
    RemoveProfileDir,
    RemoveDeploymentRecord,
}

impl Reversal {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::StopService => "stop service",
            Self::RemoveServiceDescriptor => "remove daemon descriptor",
            Self::RemoveProfileDir => "remove profile directory",
            Self::RemoveDeploymentRecord => "remove deployment record",
        }
    }
}

impl fmt::Display for Reversal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    /// Reversals for this step, in the order they run.
    pub rollback: Vec<Reversal>,
}

impl fmt::Display for PlannedStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl PlannedStep {
    fn new(kind: StepKind, rollback: &[Reversal]) -> Self {
        Self {
            kind,
            rollback: rollback.to_vec(),
        }
    }
}

/// Ordered step list for one deployment attempt. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentPlan {
    pub variant: Variant,
    pub target_name: String,
    pub steps: Vec<PlannedStep>,
}

impl DeploymentPlan {
    /// Build the step sequence for `variant`.
    #[must_use]
    pub fn for_variant(variant: Variant, target_name: &str) -> Self {
        use Reversal::{RemoveProfileDir, RemoveServiceDescriptor, StopService};
        use StepKind::{
            CheckPrerequisites, CreateProfileDir, CreateUser, InstallDependencies,
            LinkSharedResources, MaterializeConfig, PairingNotice, RegisterAllocation,
            RegisterDaemon, StartService,
        };

        let steps = match variant {
            Variant::SharedProfile => vec![
                PlannedStep::new(CheckPrerequisites, &[]),
                PlannedStep::new(CreateProfileDir, &[RemoveProfileDir]),
                PlannedStep::new(MaterializeConfig, &[]),
                PlannedStep::new(LinkSharedResources, &[]),
                PlannedStep::new(StartService, &[StopService]),
                PlannedStep::new(PairingNotice, &[]),
                PlannedStep::new(RegisterAllocation, &[]),
            ],
            // The OS identity has no reversal: deleting a user is left to the
            // operator.
            Variant::IsolatedUser => vec![
                PlannedStep::new(CheckPrerequisites, &[]),
                PlannedStep::new(CreateUser, &[]),
                PlannedStep::new(InstallDependencies, &[]),
                PlannedStep::new(MaterializeConfig, &[]),
                PlannedStep::new(LinkSharedResources, &[]),
                PlannedStep::new(RegisterDaemon, &[RemoveServiceDescriptor]),
                PlannedStep::new(StartService, &[StopService]),
                PlannedStep::new(PairingNotice, &[]),
                PlannedStep::new(RegisterAllocation, &[]),
            ],
        };

        Self {
            variant,
            target_name: target_name.to_string(),
            steps,
        }
    }

    #[must_use]
    pub fn step_kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(|s| s.kind).collect()
    }

    /// Reverse walk over the steps, collecting their reversals, followed by
    /// removal of the deployment record.
    #[must_use]
    pub fn rollback_sequence(&self) -> Vec<Reversal> {
        let mut seq: Vec<Reversal> = self
            .steps
            .iter()
            .rev()
            .flat_map(|s| s.rollback.iter().copied())
            .collect();
        seq.push(Reversal::RemoveDeploymentRecord);
        seq
    }
}

// ── Journal ───────────────────────────────────────────────────────────────────

/// Per-step status log for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepJournal {
    records: Vec<StepRecord>,
}

impl StepJournal {
    /// All steps start `pending`.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            records: names
                .into_iter()
                .map(|n| StepRecord {
                    name: n.into(),
                    status: StepStatus::Pending,
                    error: None,
                })
                .collect(),
        }
    }

    pub fn start(&mut self, index: usize) {
        self.set(index, StepStatus::Running, None);
    }

    pub fn succeed(&mut self, index: usize) {
        self.set(index, StepStatus::Succeeded, None);
    }

    pub fn fail(&mut self, index: usize, error: &str) {
        self.set(index, StepStatus::Failed, Some(error.to_string()));
    }

    fn set(&mut self, index: usize, status: StepStatus, error: Option<String>) {
        if let Some(rec) = self.records.get_mut(index) {
            rec.status = status;
            rec.error = error;
        }
    }

    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }

    /// First step that failed, if any.
    #[must_use]
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.records.iter().find(|r| r.status == StepStatus::Failed)
    }

    /// Overall deployment state derived from the step states.
    #[must_use]
    pub fn status(&self) -> DeploymentStatus {
        if self.failed_step().is_some() {
            DeploymentStatus::Aborted
        } else if self
            .records
            .iter()
            .all(|r| r.status == StepStatus::Succeeded)
        {
            DeploymentStatus::Completed
        } else if self.records.iter().all(|r| r.status == StepStatus::Pending) {
            DeploymentStatus::Pending
        } else {
            DeploymentStatus::Running
        }
    }
}

// ── Verification ──────────────────────────────────────────────────────────────

/// Outcome of the post-deployment probes. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub checks: Vec<CheckRecord>,
}

impl VerifyReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

// ── Result ────────────────────────────────────────────────────────────────────

/// What one deployment run hands back to the caller.
#[derive(Debug, Clone)]
pub struct DeploymentResult {
    /// Set only once every step has succeeded.
    pub success: bool,
    pub variant: Variant,
    pub target_name: String,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub uid: Option<u32>,
    pub service_running: bool,
    pub pairing_handle: Option<String>,
    pub verify_report: Option<VerifyReport>,
    pub error: Option<String>,
    pub journal: StepJournal,
    /// SHA-256 of the generated service configuration.
    pub config_sha256: Option<String>,
    /// Where the deployment record was written, once it has been.
    pub record_file: Option<PathBuf>,
    /// The run log, when one is being written.
    pub log_file: Option<PathBuf>,
    /// Commands the operator still has to run by hand.
    pub manual_actions: Vec<String>,
}

impl DeploymentResult {
    #[must_use]
    pub fn new(plan: &DeploymentPlan) -> Self {
        Self {
            success: false,
            variant: plan.variant,
            target_name: plan.target_name.clone(),
            port: None,
            username: None,
            uid: None,
            service_running: false,
            pairing_handle: None,
            verify_report: None,
            error: None,
            journal: StepJournal::new(plan.steps.iter().map(|s| s.kind.name())),
            config_sha256: None,
            record_file: None,
            log_file: None,
            manual_actions: Vec::new(),
        }
    }
}
