//! Verify command — probe a registered agent.

use std::process::ExitCode;

use anyhow::Result;
use clap::Args;

use crate::app::AppContext;
use crate::application::ports::RegistryStore as _;
use crate::application::services::verify::{VerifyTarget, verify};
use crate::domain::error::DeployError;
use crate::infra::network::TokioNetworkProbe;
use crate::output::human::HumanRenderer;
use crate::output::json;

/// Arguments for the verify command.
#[derive(Args)]
pub struct VerifyArgs {
    /// Registered agent name
    pub name: String,
}

/// Run the verify command.
///
/// # Errors
///
/// Returns an error if the agent is not registered. Failed checks give
/// `ExitCode::FAILURE`.
pub async fn run(app: &AppContext, args: &VerifyArgs) -> Result<ExitCode> {
    let port = {
        let registry = app.open_registry()?;
        registry
            .registry()
            .find(&args.name)
            .map(|entry| entry.port)
            .ok_or_else(|| {
                DeployError::Prerequisite(format!("no registered agent named '{}'", args.name))
            })?
    };

    let target = VerifyTarget {
        binary: &app.config.service_binary,
        port,
    };
    let report = verify(&app.runner, &TokioNetworkProbe, &target).await;

    if app.is_json() {
        println!("{}", json::pretty(&json::verify_report(&args.name, port, &report))?);
    } else {
        HumanRenderer::new(&app.output).render_verify(&args.name, port, &report);
    }

    let failed = report.checks.iter().filter(|c| !c.passed).count();
    if failed > 0 {
        app.output.error(&format!(
            "{failed} of {} checks failed for '{}'",
            report.checks.len(),
            args.name
        ));
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
