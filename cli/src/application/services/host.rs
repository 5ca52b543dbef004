//! Running host commands and classifying their failures.

use std::process::Output;
use std::time::Duration;

use crate::application::ports::CommandRunner;
use crate::domain::error::DeployError;
use crate::domain::host::HostCommand;

/// Timeout for dependency installation.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(600);

const SUDO_HINT: &str = "refresh sudo credentials with `sudo -v` and retry";

fn describe_failure(cmd: &HostCommand, output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    let code = output
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    if stderr.is_empty() {
        format!("`{}` exited with {code}", cmd.display())
    } else {
        format!("`{}` exited with {code}: {stderr}", cmd.display())
    }
}

/// Run a root command. Spawn failure, timeout, or non-zero exit is a
/// permission failure.
///
/// # Errors
///
/// Returns `DeployError::Permission` on any failure.
pub async fn run_privileged(
    runner: &impl CommandRunner,
    cmd: &HostCommand,
    stdin: Option<&[u8]>,
) -> Result<Output, DeployError> {
    tracing::debug!(command = %cmd.display(), "running privileged command");
    let args = cmd.arg_refs();
    let output = match stdin {
        Some(input) => runner.run_with_stdin(&cmd.program, &args, input).await,
        None => runner.run(&cmd.program, &args).await,
    }
    .map_err(|e| DeployError::Permission(format!("{e:#} ({SUDO_HINT})")))?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(DeployError::Permission(format!(
            "{} ({SUDO_HINT})",
            describe_failure(cmd, &output)
        )))
    }
}

/// Run an unprivileged command, or one delegated to the isolated user.
///
/// # Errors
///
/// Returns `DeployError::Config` on spawn failure, timeout, or non-zero exit.
pub async fn run_checked(
    runner: &impl CommandRunner,
    cmd: &HostCommand,
    stdin: Option<&[u8]>,
    timeout: Option<Duration>,
) -> Result<Output, DeployError> {
    tracing::debug!(command = %cmd.display(), "running command");
    let args = cmd.arg_refs();
    let output = match (stdin, timeout) {
        (Some(input), _) => runner.run_with_stdin(&cmd.program, &args, input).await,
        (None, Some(t)) => runner.run_with_timeout(&cmd.program, &args, t).await,
        (None, None) => runner.run(&cmd.program, &args).await,
    }
    .map_err(|e| DeployError::config(&e))?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(DeployError::Config(describe_failure(cmd, &output)))
    }
}
