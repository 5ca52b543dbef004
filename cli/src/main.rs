//! agent-deploy — provision isolated agent gateways on a single host

use std::process::ExitCode;

use clap::Parser;

use agent_deploy::cli::Cli;
use agent_deploy::domain::error::DeployError;
use agent_deploy::output::json;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = cli.json;
    match cli.run().await {
        Ok(code) => code,
        Err(e) => {
            if json_mode {
                let code = e
                    .downcast_ref::<DeployError>()
                    .map_or("ERROR", DeployError::code);
                if let Ok(out) = json::format_error(&format!("{e:#}"), code) {
                    println!("{out}");
                }
            }
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
