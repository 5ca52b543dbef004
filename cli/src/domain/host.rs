//! Argument vectors for host primitives (`dscl`, `launchctl`, `sudo`, `ps`,
//! `lsof`) and parsers for their output.
//!
//! Nothing here spawns a process; services hand these to a `CommandRunner`.

use std::collections::BTreeSet;
use std::path::Path;

use crate::domain::config::DeployConfig;

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HostCommand {
    #[must_use]
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Borrowed view for `CommandRunner::run`.
    #[must_use]
    pub fn arg_refs(&self) -> Vec<&str> {
        self.args.iter().map(String::as_str).collect()
    }

    /// Run as root, never prompting for a password.
    #[must_use]
    pub fn privileged(self) -> Self {
        let mut args = vec!["-n".to_string(), self.program];
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
        }
    }

    /// Run as `user` with that user's `HOME`, never prompting.
    #[must_use]
    pub fn as_user(self, user: &str) -> Self {
        let mut args = vec![
            "-n".to_string(),
            "-u".to_string(),
            user.to_string(),
            "-H".to_string(),
            self.program,
        ];
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
        }
    }

    /// Shell-like rendering for logs and manual-action notices.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ── Probes ────────────────────────────────────────────────────────────────────

#[must_use]
pub fn which(binary: &str) -> HostCommand {
    HostCommand::new("which", [binary])
}

#[must_use]
pub fn list_users() -> HostCommand {
    HostCommand::new("dscl", [".", "-list", "/Users"])
}

#[must_use]
pub fn list_user_ids() -> HostCommand {
    HostCommand::new("dscl", [".", "-list", "/Users", "UniqueID"])
}

/// Full command line of every process, one per line.
#[must_use]
pub fn process_table() -> HostCommand {
    HostCommand::new("ps", ["ax", "-o", "command="])
}

#[must_use]
pub fn listening_sockets(port: u16) -> HostCommand {
    HostCommand::new(
        "lsof",
        [
            "-nP".to_string(),
            format!("-iTCP:{port}"),
            "-sTCP:LISTEN".to_string(),
        ],
    )
}

/// Exact-match lookup in `dscl . -list /Users` output.
#[must_use]
pub fn user_listed(list_output: &str, username: &str) -> bool {
    list_output.lines().any(|l| l.trim() == username)
}

/// Parse `dscl . -list /Users UniqueID` output (`name   uid` per line).
/// Malformed lines are skipped.
#[must_use]
pub fn parse_user_ids(output: &str) -> BTreeSet<u32> {
    output
        .lines()
        .filter_map(|l| l.split_whitespace().last())
        .filter_map(|uid| uid.parse().ok())
        .collect()
}

/// True if some process line mentions both the service binary and the port.
#[must_use]
pub fn process_listed(ps_output: &str, binary: &str, port: u16) -> bool {
    let port = port.to_string();
    let assigned = format!("={port}");
    ps_output.lines().any(|l| {
        l.contains(binary)
            && l
                .split_whitespace()
                .any(|tok| tok == port || tok.ends_with(&assigned))
    })
}

// ── Identity ──────────────────────────────────────────────────────────────────

/// Directory-service records for a new user, then its home directory.
#[must_use]
pub fn create_user(
    cfg: &DeployConfig,
    username: &str,
    uid: u32,
    real_name: &str,
) -> Vec<HostCommand> {
    let record = format!("/Users/{username}");
    let attr = |key: &str, value: String| {
        HostCommand::new(
            "dscl",
            [
                ".".to_string(),
                "-create".to_string(),
                record.clone(),
                key.to_string(),
                value,
            ],
        )
        .privileged()
    };
    vec![
        HostCommand::new("dscl", [".", "-create", record.as_str()]).privileged(),
        attr("UserShell", cfg.user_shell.clone()),
        attr("RealName", real_name.to_string()),
        attr("UniqueID", uid.to_string()),
        attr("PrimaryGroupID", cfg.primary_group_id.to_string()),
        attr("NFSHomeDirectory", path_arg(&cfg.user_home(username))),
        HostCommand::new("createhomedir", ["-c", "-u", username]).privileged(),
    ]
}

/// Operator commands that remove an isolated user. Shown, never run.
#[must_use]
pub fn manual_user_removal(cfg: &DeployConfig, username: &str) -> Vec<String> {
    vec![
        format!("sudo dscl . -delete /Users/{username}"),
        format!("sudo rm -rf {}", cfg.user_home(username).display()),
    ]
}

/// Setting a password is interactive, so it is left to the operator.
#[must_use]
pub fn manual_password(username: &str) -> String {
    format!("sudo passwd {username}")
}

// ── Files ─────────────────────────────────────────────────────────────────────

/// `tee` the command's stdin into `path` as root.
#[must_use]
pub fn write_privileged(path: &Path) -> HostCommand {
    HostCommand::new("tee", [path_arg(path)]).privileged()
}

/// `tee` stdin into `path` as `user`, so the file is owned by them.
#[must_use]
pub fn write_as_user(user: &str, path: &Path) -> HostCommand {
    HostCommand::new("tee", [path_arg(path)]).as_user(user)
}

#[must_use]
pub fn mkdir_as_user(user: &str, dir: &Path) -> HostCommand {
    HostCommand::new("mkdir", ["-p".to_string(), path_arg(dir)]).as_user(user)
}

/// Replace any link at `link` with one pointing at `target`.
#[must_use]
pub fn symlink_as_user(user: &str, target: &Path, link: &Path) -> HostCommand {
    HostCommand::new("ln", ["-sfn".to_string(), path_arg(target), path_arg(link)]).as_user(user)
}

#[must_use]
pub fn chown_privileged(owner: &str, path: &Path) -> HostCommand {
    HostCommand::new("chown", [owner.to_string(), path_arg(path)]).privileged()
}

#[must_use]
pub fn chmod_privileged(mode: &str, path: &Path) -> HostCommand {
    HostCommand::new("chmod", [mode.to_string(), path_arg(path)]).privileged()
}

#[must_use]
pub fn remove_privileged(path: &Path) -> HostCommand {
    HostCommand::new("rm", ["-f".to_string(), path_arg(path)]).privileged()
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Foreground gateway command for a shared profile.
#[must_use]
pub fn gateway(binary: &str, port: u16) -> HostCommand {
    HostCommand::new(binary, ["gateway".to_string(), "--port".to_string(), port.to_string()])
}

/// Kill the profile's gateway by command-line pattern. The profile directory
/// only reaches the process through its environment, so the port is the
/// precise match; without one, fall back to the name.
///
/// The port must end the argument: `--port 1900` never matches `--port 19003`.
#[must_use]
pub fn stop_shared_service(binary: &str, name: &str, port: Option<u16>) -> HostCommand {
    let pattern = match port {
        Some(port) => format!("{binary} gateway --port {port}( |$)"),
        None => format!("{binary}.*{name}"),
    };
    HostCommand::new("pkill", ["-f".to_string(), pattern])
}

#[must_use]
pub fn bootstrap_daemon(descriptor: &Path) -> HostCommand {
    HostCommand::new(
        "launchctl",
        ["bootstrap".to_string(), "system".to_string(), path_arg(descriptor)],
    )
    .privileged()
}

#[must_use]
pub fn bootout_daemon(label: &str) -> HostCommand {
    HostCommand::new("launchctl", ["bootout".to_string(), format!("system/{label}")]).privileged()
}

/// Directory the daemon's stdout/stderr logs go to.
#[must_use]
pub fn daemon_log_dir(username: &str) -> String {
    format!("/tmp/openclaw-{username}")
}
