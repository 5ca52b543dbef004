//! Shared stub ports for unit tests.
//!
//! Each stub records what the services asked of it so tests can assert on
//! the exact host interaction without running anything.

#![allow(clippy::expect_used, dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Output};
use std::time::Duration;

use agent_deploy::application::ports::{
    CommandRunner, DeploymentRecordStore, LocalFs, NetworkProbe, ProgressReporter, RegistryStore,
};
use agent_deploy::domain::config::DeployConfig;
use agent_deploy::domain::error::DeployError;
use agent_deploy::domain::registry::AllocationRegistry;
use anyhow::Result;
use deploy_common::{AllocationEntry, DeploymentRecord, Variant};

// ── Output helpers ────────────────────────────────────────────────────────────

pub fn ok_output(stdout: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

pub fn exit_output(code: i32, stderr: &str) -> Output {
    Output {
        status: ExitStatus::from_raw(code << 8),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Host settings with no startup wait and a shared root the stub fs knows.
pub fn test_config() -> DeployConfig {
    DeployConfig {
        shared_path: PathBuf::from("/shared"),
        startup_wait_secs: 0,
        ..DeployConfig::default()
    }
}

// ── Host: canned command responses ────────────────────────────────────────────

/// Answers the directory-service, process, and socket probes from canned
/// text. Every other command succeeds with empty output unless it contains
/// `fail_on`.
pub struct HostStub {
    pub users: String,
    pub uids: String,
    pub processes: String,
    pub fail_on: Option<(&'static str, i32)>,
    pub calls: RefCell<Vec<String>>,
    pub stdin: RefCell<Vec<(String, String)>>,
    pub spawned: RefCell<Vec<(String, Vec<(String, String)>)>>,
}

impl Default for HostStub {
    fn default() -> Self {
        Self {
            users: "_www\nroot\nalice\n".to_string(),
            uids: "_www 70\nroot 0\nalice 501\n".to_string(),
            processes: String::new(),
            fail_on: None,
            calls: RefCell::new(Vec::new()),
            stdin: RefCell::new(Vec::new()),
            spawned: RefCell::new(Vec::new()),
        }
    }
}

impl HostStub {
    /// A stub whose process table shows a gateway on `port`.
    pub fn serving(port: u16) -> Self {
        Self {
            processes: format!("/usr/sbin/cron\nopenclaw gateway --port {port}\n"),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.calls.borrow().iter().position(|c| c.starts_with(prefix))
    }

    fn respond(&self, line: &str) -> Output {
        if let Some((needle, code)) = self.fail_on
            && line.contains(needle)
        {
            return exit_output(code, "simulated failure");
        }
        if line == "dscl . -list /Users UniqueID" {
            ok_output(&self.uids)
        } else if line == "dscl . -list /Users" {
            ok_output(&self.users)
        } else if line.starts_with("ps ") {
            ok_output(&self.processes)
        } else if line.starts_with("lsof ") {
            if self.processes.contains("gateway") {
                ok_output("openclaw 4242 ops 20u IPv4 TCP 127.0.0.1:19003 (LISTEN)\n")
            } else {
                exit_output(1, "")
            }
        } else {
            ok_output("")
        }
    }
}

impl CommandRunner for HostStub {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        let line = format!("{program} {}", args.join(" "));
        self.calls.borrow_mut().push(line.clone());
        Ok(self.respond(&line))
    }
    async fn run_with_timeout(&self, program: &str, args: &[&str], _: Duration) -> Result<Output> {
        self.run(program, args).await
    }
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output> {
        let line = format!("{program} {}", args.join(" "));
        self.stdin
            .borrow_mut()
            .push((line, String::from_utf8_lossy(stdin).into_owned()));
        self.run(program, args).await
    }
    fn spawn_detached(&self, program: &str, args: &[&str], env: &[(&str, &str)]) -> Result<u32> {
        self.spawned.borrow_mut().push((
            format!("{program} {}", args.join(" ")),
            env.iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        ));
        Ok(4242)
    }
}

// ── Filesystem: in-memory ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemFs {
    pub dirs: RefCell<BTreeSet<PathBuf>>,
    pub files: RefCell<BTreeMap<PathBuf, String>>,
    pub links: RefCell<Vec<(PathBuf, PathBuf)>>,
}

impl MemFs {
    pub fn with_dirs<I: IntoIterator<Item = &'static str>>(dirs: I) -> Self {
        let fs = Self::default();
        fs.dirs
            .borrow_mut()
            .extend(dirs.into_iter().map(PathBuf::from));
        fs
    }

    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.borrow().get(path).cloned()
    }
}

impl LocalFs for MemFs {
    fn exists(&self, path: &Path) -> bool {
        self.dirs.borrow().contains(path) || self.files.borrow().contains_key(path)
    }
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.dirs
            .borrow_mut()
            .extend(path.ancestors().map(Path::to_path_buf));
        Ok(())
    }
    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        self.dirs.borrow_mut().retain(|d| !d.starts_with(path));
        self.files.borrow_mut().retain(|f, _| !f.starts_with(path));
        Ok(())
    }
    fn remove_file(&self, path: &Path) -> Result<()> {
        self.files.borrow_mut().remove(path);
        Ok(())
    }
    fn write(&self, path: &Path, content: &str) -> Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }
    fn read_to_string(&self, path: &Path) -> Result<String> {
        self.file(path)
            .ok_or_else(|| anyhow::anyhow!("{} not found", path.display()))
    }
    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        self.links
            .borrow_mut()
            .push((target.to_path_buf(), link.to_path_buf()));
        Ok(())
    }
}

// ── Registry and records ──────────────────────────────────────────────────────

/// Registry held in memory. With `fail_persist`, every registration fails
/// the way an unwritable registry file would.
#[derive(Default)]
pub struct MemRegistry {
    pub registry: AllocationRegistry,
    pub fail_persist: bool,
}

impl RegistryStore for MemRegistry {
    fn registry(&self) -> &AllocationRegistry {
        &self.registry
    }
    fn register_allocation(&mut self, entry: AllocationEntry) -> Result<(), DeployError> {
        let mut next = self.registry.clone();
        next.register(entry)?;
        if self.fail_persist {
            return Err(DeployError::Registry("disk full".to_string()));
        }
        self.registry = next;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemRecords {
    pub saved: RefCell<Vec<DeploymentRecord>>,
}

impl DeploymentRecordStore for MemRecords {
    fn save_record(&self, record: &DeploymentRecord) -> Result<PathBuf> {
        self.saved.borrow_mut().push(record.clone());
        Ok(PathBuf::from(format!(
            "/records/deploy-{}-{}.json",
            record.variant.tag(),
            record.name
        )))
    }
    fn remove_record(&self, variant: Variant, name: &str) -> Result<bool> {
        let mut saved = self.saved.borrow_mut();
        let before = saved.len();
        saved.retain(|r| !(r.variant == variant && r.name == name));
        Ok(saved.len() != before)
    }
}

// ── Network and progress ──────────────────────────────────────────────────────

pub struct Reachable(pub bool);

impl NetworkProbe for Reachable {
    async fn check_tcp_connectivity(&self, _: &str, _: u16, _: Duration) -> Result<bool> {
        Ok(self.0)
    }
}

/// Records every progress event as a short tagged line.
#[derive(Default)]
pub struct RecordingReporter {
    pub events: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    fn push(&self, event: String) {
        self.events.borrow_mut().push(event);
    }
}

impl ProgressReporter for RecordingReporter {
    fn step_started(&self, index: usize, total: usize, name: &str) {
        self.push(format!("start {index}/{total} {name}"));
    }
    fn step_succeeded(&self, index: usize, total: usize, name: &str) {
        self.push(format!("ok {index}/{total} {name}"));
    }
    fn step_failed(&self, index: usize, total: usize, name: &str, error: &str) {
        self.push(format!("fail {index}/{total} {name}: {error}"));
    }
    fn waiting(&self, message: &str) {
        self.push(format!("wait {message}"));
    }
    fn warn(&self, message: &str) {
        self.push(format!("warn {message}"));
    }
    fn info(&self, message: &str) {
        self.push(format!("info {message}"));
    }
}
