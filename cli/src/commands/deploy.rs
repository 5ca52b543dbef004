//! Deploy command — full run, dry-run preview, or rollback.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use deploy_common::Variant;

use crate::app::AppContext;
use crate::application::ports::RegistryStore as _;
use crate::application::services::deploy::{DeployPorts, DeployRequest, DeploySettings, deploy, preview};
use crate::application::services::rollback::{RollbackPorts, RollbackTarget, rollback};
use crate::infra::fs::LocalFs;
use crate::infra::network::TokioNetworkProbe;
use crate::infra::templates::EmbeddedTemplates;
use crate::output::human::HumanRenderer;
use crate::output::json;
use crate::output::reporter::TerminalReporter;

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    /// Deployment variant
    #[arg(long, value_enum)]
    pub variant: Variant,

    /// Agent name (also the OS username for isolated-user)
    #[arg(long)]
    pub name: String,

    /// Gateway port [default: next free in the variant's range]
    #[arg(long)]
    pub port: Option<u16>,

    /// OS user id for isolated-user [default: next free from 503]
    #[arg(long)]
    pub uid: Option<u32>,

    /// Role written into the identity file
    #[arg(long)]
    pub role: Option<String>,

    /// Chat bot token
    #[arg(long, env = "AGENT_DEPLOY_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Primary model [default: from configuration]
    #[arg(long)]
    pub model: Option<String>,

    /// Show the plan and the resolved allocation without changing anything
    #[arg(long, conflicts_with = "rollback")]
    pub dry_run: bool,

    /// Undo a previous deployment of this name
    #[arg(long)]
    pub rollback: bool,

    /// Skip the rollback confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

impl DeployArgs {
    fn request(&self, api_key: Option<String>) -> DeployRequest {
        DeployRequest {
            variant: self.variant,
            name: self.name.clone(),
            port: self.port,
            uid: self.uid,
            role: self.role.clone(),
            bot_token: self.bot_token.clone(),
            model: self.model.clone(),
            api_key,
        }
    }
}

/// Run the deploy command.
///
/// # Errors
///
/// Returns an error if the registry cannot be opened or the deployment
/// fails. A rollback with failed reversals gives `ExitCode::FAILURE`.
pub async fn run(app: &AppContext, args: &DeployArgs, log_file: Option<&Path>) -> Result<ExitCode> {
    if args.dry_run {
        return run_dry(app, args).await;
    }
    if args.rollback {
        return run_rollback(app, args).await;
    }

    let api_key = std::env::var(&app.config.api_key_env)
        .ok()
        .filter(|v| !v.is_empty());
    if api_key.is_none() {
        tracing::warn!(var = %app.config.api_key_env, "model API key not set");
    }
    let request = args.request(api_key);
    let settings = DeploySettings {
        config: &app.config,
        home: &app.home,
        deploy_time: Utc::now(),
        log_file,
    };

    let mut registry = app.open_registry()?;
    let records = app.record_store()?;
    let ports = DeployPorts {
        runner: &app.runner,
        fs: &LocalFs,
        templates: &EmbeddedTemplates,
        records: &records,
    };
    let reporter = TerminalReporter::new(&app.output);

    match deploy(
        &ports,
        &mut registry,
        &TokioNetworkProbe,
        &reporter,
        &settings,
        &request,
    )
    .await
    {
        Ok(result) => {
            if app.is_json() {
                println!("{}", json::pretty(&json::deployment(&result))?);
            } else {
                HumanRenderer::new(&app.output).render_deployment(&result);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            if !app.is_json()
                && let Some(path) = &failure.result.record_file
            {
                app.output.kv("record", &path.display().to_string());
            }
            let message = match log_file {
                Some(path) => format!(
                    "deployment of '{}' aborted (log: {})",
                    args.name,
                    path.display()
                ),
                None => format!("deployment of '{}' aborted", args.name),
            };
            Err(anyhow::Error::new(failure.error).context(message))
        }
    }
}

async fn run_dry(app: &AppContext, args: &DeployArgs) -> Result<ExitCode> {
    let request = args.request(None);
    let settings = DeploySettings {
        config: &app.config,
        home: &app.home,
        deploy_time: Utc::now(),
        log_file: None,
    };
    let registry = app.open_registry()?;
    let plan = preview(&app.runner, registry.registry(), &settings, &request).await?;

    if app.is_json() {
        println!("{}", json::pretty(&json::preview(&plan))?);
    } else {
        HumanRenderer::new(&app.output).render_preview(&plan);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_rollback(app: &AppContext, args: &DeployArgs) -> Result<ExitCode> {
    let prompt = format!(
        "Roll back {} deployment '{}'?",
        args.variant.display_name(),
        args.name
    );
    if !app.confirm(&prompt).context("confirmation prompt")? {
        app.output.info("Rollback cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let records = app.record_store()?;
    let registered = app
        .open_registry()?
        .registry()
        .find(&args.name)
        .map(|entry| entry.port);
    let port = match registered {
        Some(port) => Some(port),
        None => records
            .load(args.variant, &args.name)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %format!("{e:#}"), "cannot read deployment record");
                None
            })
            .and_then(|record| record.port),
    };

    let ports = RollbackPorts {
        runner: &app.runner,
        fs: &LocalFs,
        records: &records,
    };
    let reporter = TerminalReporter::new(&app.output);
    let report = rollback(
        &ports,
        &reporter,
        &app.config,
        &app.home,
        &RollbackTarget {
            variant: args.variant,
            name: &args.name,
            port,
        },
    )
    .await?;

    if app.is_json() {
        println!("{}", json::pretty(&json::rollback(&report))?);
    } else {
        HumanRenderer::new(&app.output).render_rollback(&report);
    }

    match report.failures() {
        0 => Ok(ExitCode::SUCCESS),
        n => {
            app.output.error(&format!(
                "rollback of '{}' finished with {n} failed reversal(s)",
                args.name
            ));
            Ok(ExitCode::FAILURE)
        }
    }
}
