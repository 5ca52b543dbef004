//! CLI argument parsing with clap derive

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};

use crate::app::{AppContext, AppFlags, BehaviourFlags, OutputFlags};
use crate::commands;
use crate::domain::deployment::validate_target_name;
use crate::infra::logging;

/// Provision isolated agent gateways on a single host
#[derive(Parser)]
#[command(
    name = "agent-deploy",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Allocation registry file [default: ~/.agent-deploy/registry.yaml]
    #[arg(long, global = true, env = "AGENT_DEPLOY_REGISTRY", value_name = "PATH")]
    pub registry: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Deploy, preview, or roll back an agent
    Deploy(commands::deploy::DeployArgs),

    /// List registered allocations
    List,

    /// Probe a registered agent
    Verify(commands::verify::VerifyArgs),

    /// Show version
    Version,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails. A command that ran but found
    /// problems (failed checks, failed reversals) returns `ExitCode::FAILURE`.
    pub async fn run(self) -> Result<ExitCode> {
        let Cli {
            json,
            quiet,
            no_color,
            registry,
            command,
        } = self;

        let run_log = match &command {
            Command::Deploy(args) if !args.dry_run && validate_target_name(&args.name).is_ok() => {
                Some(logging::run_log_path(
                    &logging::logs_dir()?,
                    args.variant,
                    &args.name,
                    Local::now(),
                ))
            }
            _ => None,
        };
        let stderr_color =
            crate::output::use_colors(no_color, console::Term::stderr().is_term());
        logging::init(stderr_color, run_log.as_deref())?;

        let yes = matches!(&command, Command::Deploy(args) if args.yes);
        let app = || {
            AppContext::new(&AppFlags {
                output: OutputFlags {
                    no_color,
                    quiet,
                    json,
                },
                behaviour: BehaviourFlags { yes },
                registry: registry.clone(),
            })
        };

        match command {
            Command::Version => commands::version::run(json).map(|()| ExitCode::SUCCESS),
            Command::List => commands::list::run(&app()?).map(|()| ExitCode::SUCCESS),
            Command::Verify(args) => commands::verify::run(&app()?, &args).await,
            Command::Deploy(args) => commands::deploy::run(&app()?, &args, run_log.as_deref()).await,
        }
    }
}
