//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` is the production implementation that uses tokio
//! for async process execution with a guaranteed kill on timeout.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;

use crate::application::ports::CommandRunner;

/// Default timeout for host commands (`dscl`, `launchctl`, `ps`, `lsof`, ...).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Production `CommandRunner`.
///
/// `tokio::time::timeout` around `.output().await` only drops the future; the
/// OS process keeps running. This implementation races the child against a
/// sleep with `tokio::select!` and kills it explicitly.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

async fn drain<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

/// Wait for `child` to exit and collect its output, killing it once `timeout`
/// elapses.
async fn collect(mut child: Child, program: &str, timeout: Duration) -> Result<Output> {
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    tokio::select! {
        result = async {
            let (status, stdout, stderr) =
                tokio::join!(child.wait(), drain(stdout_handle), drain(stderr_handle));
            Ok(Output {
                status: status.with_context(|| format!("waiting for {program}"))?,
                stdout,
                stderr,
            })
        } => result,
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
        }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        tracing::trace!(program, ?args, "spawning");
        let child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        collect(child, program, timeout).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        tracing::trace!(program, ?args, bytes = input.len(), "spawning with stdin");
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        // Dropping the handle after the write closes the pipe, so `tee` and
        // friends see EOF.
        let stdin_handle = child.stdin.take();
        let input_owned = input.to_vec();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin_handle {
                use tokio::io::AsyncWriteExt;
                let _ = stdin.write_all(&input_owned).await;
            }
        });

        let output = collect(child, program, self.timeout).await;
        let _ = stdin_task.await;
        output
    }

    fn spawn_detached(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<u32> {
        use std::os::unix::process::CommandExt;

        let child = std::process::Command::new(program)
            .args(args)
            .envs(env.iter().copied())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;
        Ok(child.id())
    }
}
