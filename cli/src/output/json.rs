//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one pretty-printed document on
//! stdout; failures use the error object from `format_error`.

use anyhow::{Context, Result};
use deploy_common::AllocationEntry;
use serde_json::{Value, json};

use crate::application::services::deploy::DeployPreview;
use crate::application::services::rollback::RollbackReport;
use crate::application::services::runner::ReversalStatus;
use crate::domain::deployment::{DeploymentResult, VerifyReport};

/// Format a JSON error object.
///
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn pretty(value: &Value) -> Result<String> {
    serde_json::to_string_pretty(value).context("JSON serialization failed")
}

#[must_use]
pub fn allocations(entries: &[AllocationEntry]) -> Value {
    json!({ "allocations": entries })
}

#[must_use]
pub fn verify_report(name: &str, port: u16, report: &VerifyReport) -> Value {
    json!({
        "name": name,
        "port": port,
        "passed": report.all_passed(),
        "checks": report.checks,
    })
}

#[must_use]
pub fn deployment(result: &DeploymentResult) -> Value {
    json!({
        "success": result.success,
        "variant": result.variant,
        "name": result.target_name,
        "port": result.port,
        "username": result.username,
        "uid": result.uid,
        "service_running": result.service_running,
        "pairing_handle": result.pairing_handle,
        "config_sha256": result.config_sha256,
        "steps": result.journal.records(),
        "checks": result.verify_report.as_ref().map(|r| &r.checks),
        "error": result.error,
        "record_file": result.record_file,
        "log_file": result.log_file,
        "manual_actions": result.manual_actions,
    })
}

#[must_use]
pub fn preview(preview: &DeployPreview) -> Value {
    let paths: serde_json::Map<String, Value> = preview
        .paths
        .iter()
        .map(|(label, path)| ((*label).to_string(), json!(path)))
        .collect();
    json!({
        "dry_run": true,
        "variant": preview.plan.variant,
        "name": preview.plan.target_name,
        "port": preview.allocation.port,
        "uid": preview.allocation.uid,
        "steps": preview.plan.steps.iter().map(ToString::to_string).collect::<Vec<_>>(),
        "paths": paths,
    })
}

#[must_use]
pub fn rollback(report: &RollbackReport) -> Value {
    let reversals: Vec<Value> = report
        .records
        .iter()
        .map(|r| {
            let (status, detail) = match &r.status {
                ReversalStatus::Reverted => ("reverted", None),
                ReversalStatus::Skipped(why) => ("skipped", Some(why)),
                ReversalStatus::Failed(err) => ("failed", Some(err)),
            };
            json!({ "name": r.name, "status": status, "detail": detail })
        })
        .collect();
    json!({
        "variant": report.variant,
        "name": report.target_name,
        "reversals": reversals,
        "failures": report.failures(),
        "manual_actions": report.manual_actions,
    })
}
