//! Generic step runner and best-effort reversal runner.
//!
//! Neither knows what a step does. The forward runner stops at the first
//! failure; the reversal runner never stops.

use std::fmt::Display;

use crate::application::ports::ProgressReporter;
use crate::domain::deployment::StepJournal;
use crate::domain::error::DeployError;

/// Performs one step of a plan.
#[allow(async_fn_in_trait)]
pub trait StepExecutor<S> {
    async fn execute(&mut self, step: &S) -> Result<(), DeployError>;
}

/// What a single reversal achieved when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversalOutcome {
    Reverted,
    /// Nothing to undo; the message says why.
    Skipped(String),
}

/// Undoes one reversal target.
#[allow(async_fn_in_trait)]
pub trait StepReverser<R> {
    async fn reverse(&mut self, reversal: &R) -> Result<ReversalOutcome, DeployError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversalStatus {
    Reverted,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalRecord {
    pub name: String,
    pub status: ReversalStatus,
}

/// Run `steps` strictly in order against `journal`.
///
/// A step starts only after the previous one succeeded. The first failure is
/// recorded, reported, and returned; later steps stay `pending`.
///
/// # Errors
///
/// Returns the first step failure unchanged.
pub async fn run_steps<S: Display>(
    steps: &[S],
    journal: &mut StepJournal,
    executor: &mut impl StepExecutor<S>,
    reporter: &impl ProgressReporter,
) -> Result<(), DeployError> {
    let total = steps.len();
    for (i, step) in steps.iter().enumerate() {
        let name = step.to_string();
        journal.start(i);
        reporter.step_started(i + 1, total, &name);
        tracing::debug!(step = %name, index = i + 1, total, "step started");

        match executor.execute(step).await {
            Ok(()) => {
                journal.succeed(i);
                reporter.step_succeeded(i + 1, total, &name);
                tracing::info!(step = %name, "step succeeded");
            }
            Err(e) => {
                let msg = e.to_string();
                journal.fail(i, &msg);
                reporter.step_failed(i + 1, total, &name, &msg);
                tracing::error!(step = %name, code = e.code(), error = %msg, "step failed");
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Attempt every reversal in order, logging failures without stopping.
pub async fn run_reversals<R: Display>(
    reversals: &[R],
    reverser: &mut impl StepReverser<R>,
    reporter: &impl ProgressReporter,
) -> Vec<ReversalRecord> {
    let total = reversals.len();
    let mut records = Vec::with_capacity(total);
    for (i, reversal) in reversals.iter().enumerate() {
        let name = reversal.to_string();
        reporter.step_started(i + 1, total, &name);
        let status = match reverser.reverse(reversal).await {
            Ok(ReversalOutcome::Reverted) => {
                reporter.step_succeeded(i + 1, total, &name);
                tracing::info!(reversal = %name, "reverted");
                ReversalStatus::Reverted
            }
            Ok(ReversalOutcome::Skipped(why)) => {
                reporter.step_succeeded(i + 1, total, &format!("{name} (skipped: {why})"));
                tracing::info!(reversal = %name, reason = %why, "nothing to revert");
                ReversalStatus::Skipped(why)
            }
            Err(e) => {
                let msg = e.to_string();
                reporter.step_failed(i + 1, total, &name, &msg);
                tracing::warn!(reversal = %name, error = %msg, "reversal failed, continuing");
                ReversalStatus::Failed(msg)
            }
        };
        records.push(ReversalRecord { name, status });
    }
    records
}
