//! Deploy use-case: full runs of both variants against stubbed ports.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use agent_deploy::application::ports::LocalFs as _;
use agent_deploy::application::services::deploy::{
    DeployPorts, DeployRequest, DeploySettings, deploy, preview,
};
use agent_deploy::domain::config::DeployConfig;
use agent_deploy::domain::deployment::DeploymentResult;
use agent_deploy::infra::templates::EmbeddedTemplates;
use agent_deploy::output::json;
use chrono::{TimeZone, Utc};
use deploy_common::{AllocationEntry, DeploymentStatus, StepStatus, Variant};

use crate::mocks::{
    HostStub, MemFs, MemRecords, MemRegistry, Reachable, RecordingReporter, test_config,
};

const HOME: &str = "/Users/me";
const PLIST: &str = "/Library/LaunchDaemons/ai.openclaw.ops.gateway.plist";

fn settings(cfg: &DeployConfig) -> DeploySettings<'_> {
    DeploySettings {
        config: cfg,
        home: Path::new(HOME),
        deploy_time: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
        log_file: None,
    }
}

fn request(variant: Variant, name: &str) -> DeployRequest {
    DeployRequest {
        variant,
        name: name.to_string(),
        port: None,
        uid: None,
        role: None,
        bot_token: Some("123456:abc".to_string()),
        model: None,
        api_key: Some("sk-test".to_string()),
    }
}

struct Harness {
    cfg: DeployConfig,
    host: HostStub,
    fs: MemFs,
    records: MemRecords,
    registry: MemRegistry,
    reporter: RecordingReporter,
    online: bool,
}

impl Harness {
    fn new(host: HostStub) -> Self {
        Self {
            cfg: test_config(),
            host,
            fs: MemFs::with_dirs(["/shared", "/shared/protocols"]),
            records: MemRecords::default(),
            registry: MemRegistry::default(),
            reporter: RecordingReporter::default(),
            online: true,
        }
    }

    async fn run(&mut self, req: &DeployRequest) -> Result<DeploymentResult, DeploymentResult> {
        let ports = DeployPorts {
            runner: &self.host,
            fs: &self.fs,
            templates: &EmbeddedTemplates,
            records: &self.records,
        };
        let settings = settings(&self.cfg);
        deploy(
            &ports,
            &mut self.registry,
            &Reachable(self.online),
            &self.reporter,
            &settings,
            req,
        )
        .await
        .map_err(|failure| {
            let mut result = failure.result;
            result.error = Some(format!("{}|{}", failure.error.code(), failure.error));
            result
        })
    }
}

fn statuses(result: &DeploymentResult) -> Vec<StepStatus> {
    result.journal.records().iter().map(|r| r.status).collect()
}

fn error_code(result: &DeploymentResult) -> &str {
    result
        .error
        .as_deref()
        .and_then(|e| e.split('|').next())
        .unwrap_or_default()
}

// ── Shared profile ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_shared_profile_deploy_runs_every_step() {
    let mut h = Harness::new(HostStub::serving(19003));
    let result = h
        .run(&request(Variant::SharedProfile, "scout"))
        .await
        .expect("deploy succeeds");

    assert!(result.success);
    assert_eq!(result.port, Some(19003));
    assert_eq!(statuses(&result), vec![StepStatus::Succeeded; 7]);
    assert!(result.service_running);
    assert_eq!(result.pairing_handle.as_deref(), Some("scout_bot"));
    assert!(result.verify_report.as_ref().unwrap().all_passed());
    assert!(result.config_sha256.as_ref().is_some_and(|s| s.len() == 64));

    assert_eq!(
        h.registry.registry.allocated,
        vec![AllocationEntry {
            name: "scout".to_string(),
            variant: Variant::SharedProfile,
            port: 19003,
            username: None,
            uid: None,
        }]
    );
    assert_eq!(h.registry.registry.next_available(Variant::SharedProfile), 19004);

    let spawned = h.host.spawned.borrow();
    assert_eq!(spawned.len(), 1);
    assert_eq!(spawned[0].0, "openclaw gateway --port 19003");
    assert_eq!(
        spawned[0].1,
        vec![(
            "OPENCLAW_CONFIG".to_string(),
            "/Users/me/.openclaw-scout".to_string()
        )]
    );

    let saved = h.records.saved.borrow();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].status, DeploymentStatus::Completed);
    assert_eq!(saved[0].checks.len(), 4);
}

#[tokio::test]
async fn test_summary_carries_the_run_log() {
    let mut h = Harness::new(HostStub::serving(19003));
    let log = PathBuf::from("/Users/me/.agent-deploy/logs/deploy-scout.log");
    let ports = DeployPorts {
        runner: &h.host,
        fs: &h.fs,
        templates: &EmbeddedTemplates,
        records: &h.records,
    };
    let settings = DeploySettings {
        log_file: Some(log.as_path()),
        ..settings(&h.cfg)
    };
    let result = deploy(
        &ports,
        &mut h.registry,
        &Reachable(true),
        &h.reporter,
        &settings,
        &request(Variant::SharedProfile, "scout"),
    )
    .await
    .expect("deploy succeeds");

    assert_eq!(result.log_file.as_deref(), Some(log.as_path()));
    let doc = json::deployment(&result);
    assert_eq!(doc["log_file"], log.display().to_string());
    assert!(doc["manual_actions"].as_array().unwrap().is_empty());
    assert_eq!(
        h.records.saved.borrow()[0].log_file.as_deref(),
        Some("/Users/me/.agent-deploy/logs/deploy-scout.log")
    );
}

#[tokio::test]
async fn test_shared_profile_writes_config_identity_and_links() {
    let mut h = Harness::new(HostStub::serving(19003));
    h.run(&request(Variant::SharedProfile, "scout"))
        .await
        .expect("deploy succeeds");

    let profile = PathBuf::from("/Users/me/.openclaw-scout");
    assert!(h.fs.exists(&profile), "profile root exists once its workspace does");
    assert!(h.fs.exists(&profile.join("workspace")));
    let config: serde_json::Value =
        serde_json::from_str(&h.fs.file(&profile.join("openclaw.json")).unwrap()).unwrap();
    assert_eq!(config["gateway"]["port"], 19003);
    assert_eq!(config["channels"]["telegram"]["botToken"], "123456:abc");

    let identity = h
        .fs
        .file(&profile.join("workspace/IDENTITY.md"))
        .unwrap();
    assert!(identity.contains("scout"));
    assert!(identity.contains("2026-03-01T09:00:00Z"));

    assert_eq!(
        h.fs.links.borrow().as_slice(),
        &[(
            PathBuf::from("/shared/protocols"),
            profile.join("workspace/protocols")
        )]
    );
    assert!(
        h.reporter
            .events()
            .contains(&"warn shared resource missing, not linked: knowledge".to_string())
    );
}

#[tokio::test]
async fn test_operator_base_config_is_merged_not_replaced() {
    let mut h = Harness::new(HostStub::serving(19003));
    h.fs.files.borrow_mut().insert(
        PathBuf::from("/Users/me/.openclaw/openclaw.json"),
        r#"{"gateway":{"port":18789,"auth":{"mode":"token"}},"ui":{"theme":"dark"}}"#.to_string(),
    );
    h.run(&request(Variant::SharedProfile, "scout"))
        .await
        .expect("deploy succeeds");

    let written = h
        .fs
        .file(Path::new("/Users/me/.openclaw-scout/openclaw.json"))
        .unwrap();
    let config: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(config["gateway"]["port"], 19003);
    assert_eq!(config["gateway"]["auth"]["mode"], "token");
    assert_eq!(config["ui"]["theme"], "dark");
}

#[tokio::test]
async fn test_api_key_is_written_under_the_configured_variable() {
    let mut h = Harness::new(HostStub::serving(19003));
    h.cfg.api_key_env = "QWEN_API_KEY".to_string();
    h.run(&request(Variant::SharedProfile, "scout"))
        .await
        .expect("deploy succeeds");

    let written = h
        .fs
        .file(Path::new("/Users/me/.openclaw-scout/openclaw.json"))
        .unwrap();
    let config: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(config["env"]["QWEN_API_KEY"], "sk-test");
    assert!(config["env"].get("DASHSCOPE_API_KEY").is_none());
}

#[tokio::test]
async fn test_missing_api_key_warns_but_deploys() {
    let mut h = Harness::new(HostStub::serving(19003));
    let mut req = request(Variant::SharedProfile, "scout");
    req.api_key = None;
    let result = h.run(&req).await.expect("deploy succeeds");
    assert!(result.success);
    assert!(
        h.reporter
            .events()
            .iter()
            .any(|e| e.starts_with("warn DASHSCOPE_API_KEY is not set"))
    );
}

#[tokio::test]
async fn test_failed_verification_does_not_fail_the_deployment() {
    let mut h = Harness::new(HostStub::default());
    h.online = false;
    let result = h
        .run(&request(Variant::SharedProfile, "scout"))
        .await
        .expect("deploy succeeds");

    let report = result.verify_report.unwrap();
    let failed: Vec<&str> = report
        .checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(failed, vec!["process", "port", "transport"]);
    assert_eq!(h.registry.registry.allocated.len(), 1);
}

#[tokio::test]
async fn test_existing_profile_is_a_prerequisite_failure() {
    let mut h = Harness::new(HostStub::serving(19003));
    h.fs.dirs
        .borrow_mut()
        .insert(PathBuf::from("/Users/me/.openclaw-scout"));
    let result = h
        .run(&request(Variant::SharedProfile, "scout"))
        .await
        .unwrap_err();

    assert_eq!(error_code(&result), "PREREQUISITE");
    assert_eq!(result.journal.failed_step().unwrap().name, "check prerequisites");
    assert!(h.host.spawned.borrow().is_empty());
    assert!(h.registry.registry.allocated.is_empty());
}

#[tokio::test]
async fn test_reserved_port_override_is_rejected() {
    let mut h = Harness::new(HostStub::serving(19003));
    let mut req = request(Variant::SharedProfile, "scout");
    req.port = Some(19000);
    let result = h.run(&req).await.unwrap_err();
    assert_eq!(error_code(&result), "PREREQUISITE");
    assert!(result.error.unwrap().contains("19000"));
}

#[tokio::test]
async fn test_registry_persist_failure_fails_the_last_step() {
    let mut h = Harness::new(HostStub::serving(19003));
    h.registry.fail_persist = true;
    let result = h
        .run(&request(Variant::SharedProfile, "scout"))
        .await
        .unwrap_err();

    assert_eq!(error_code(&result), "REGISTRY");
    assert_eq!(result.journal.failed_step().unwrap().name, "register allocation");
    assert!(result.service_running);
    assert!(h.registry.registry.allocated.is_empty());
    assert_eq!(
        h.records.saved.borrow()[0].status,
        DeploymentStatus::Aborted
    );
}

#[tokio::test]
async fn test_invalid_name_touches_nothing() {
    let mut h = Harness::new(HostStub::serving(19003));
    let result = h
        .run(&request(Variant::SharedProfile, "../etc"))
        .await
        .unwrap_err();

    assert_eq!(error_code(&result), "PREREQUISITE");
    assert!(h.host.calls().is_empty());
    assert!(h.records.saved.borrow().is_empty());
    assert_eq!(statuses(&result), vec![StepStatus::Pending; 7]);
}

// ── Isolated user ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_isolated_user_deploy_creates_identity_then_daemon() {
    let mut h = Harness::new(HostStub::serving(19004));
    let result = h
        .run(&request(Variant::IsolatedUser, "ops"))
        .await
        .expect("deploy succeeds");

    assert_eq!(statuses(&result), vec![StepStatus::Succeeded; 9]);
    assert_eq!(result.port, Some(19004));
    assert_eq!(result.uid, Some(503));
    assert_eq!(result.username.as_deref(), Some("ops"));

    let create = h
        .host
        .position("sudo -n dscl . -create /Users/ops UniqueID 503")
        .unwrap();
    let install = h
        .host
        .position("sudo -n -u ops -H brew install node@20")
        .unwrap();
    let descriptor = h.host.position(&format!("sudo -n tee {PLIST}")).unwrap();
    let bootstrap = h
        .host
        .position(&format!("sudo -n launchctl bootstrap system {PLIST}"))
        .unwrap();
    assert!(create < install && install < descriptor && descriptor < bootstrap);
    assert!(h.host.spawned.borrow().is_empty());
    assert!(h.host.calls().iter().all(|c| !c.contains("passwd")));
    assert_eq!(result.manual_actions, vec!["sudo passwd ops".to_string()]);
    assert_eq!(
        json::deployment(&result)["manual_actions"][0],
        "sudo passwd ops"
    );

    assert_eq!(
        h.registry.registry.allocated,
        vec![AllocationEntry {
            name: "ops".to_string(),
            variant: Variant::IsolatedUser,
            port: 19004,
            username: Some("ops".to_string()),
            uid: Some(503),
        }]
    );
}

#[tokio::test]
async fn test_isolated_user_files_are_written_as_that_user() {
    let mut h = Harness::new(HostStub::serving(19004));
    h.run(&request(Variant::IsolatedUser, "ops"))
        .await
        .expect("deploy succeeds");

    let stdin = h.host.stdin.borrow();
    let config = stdin
        .iter()
        .find(|(cmd, _)| cmd == "sudo -n -u ops -H tee /Users/ops/.openclaw/openclaw.json")
        .map(|(_, body)| body.clone())
        .unwrap();
    let config: serde_json::Value = serde_json::from_str(&config).unwrap();
    assert_eq!(config["gateway"]["port"], 19004);

    let plist = stdin
        .iter()
        .find(|(cmd, _)| cmd == &format!("sudo -n tee {PLIST}"))
        .map(|(_, body)| body.clone())
        .unwrap();
    assert!(plist.contains("<string>ai.openclaw.ops.gateway</string>"));
    assert!(plist.contains("<string>19004</string>"));
    assert!(plist.contains("<key>UserName</key>\n    <string>ops</string>"));

    assert!(h.host.calls().contains(
        &"sudo -n -u ops -H ln -sfn /shared/protocols /Users/ops/.openclaw/workspace/protocols"
            .to_string()
    ));
}

#[tokio::test]
async fn test_uid_skips_ids_the_os_already_uses() {
    let host = HostStub {
        uids: "root 0\nalice 501\nbob 503\ncarol 504\n".to_string(),
        ..HostStub::serving(19004)
    };
    let mut h = Harness::new(host);
    let result = h
        .run(&request(Variant::IsolatedUser, "ops"))
        .await
        .expect("deploy succeeds");
    assert_eq!(result.uid, Some(505));
}

#[tokio::test]
async fn test_failure_halts_remaining_steps() {
    let host = HostStub {
        fail_on: Some(("createhomedir", 1)),
        ..HostStub::serving(19004)
    };
    let mut h = Harness::new(host);
    let result = h
        .run(&request(Variant::IsolatedUser, "ops"))
        .await
        .unwrap_err();

    assert_eq!(error_code(&result), "PERMISSION");
    let mut expected = vec![StepStatus::Succeeded, StepStatus::Failed];
    expected.extend([StepStatus::Pending; 7]);
    assert_eq!(statuses(&result), expected);
    assert!(h.host.calls().iter().all(|c| !c.contains("launchctl")));
    assert!(h.registry.registry.allocated.is_empty());
    assert_eq!(
        h.records.saved.borrow()[0].status,
        DeploymentStatus::Aborted
    );
    assert!(
        h.reporter
            .events()
            .iter()
            .any(|e| e.starts_with("fail 2/9 create user identity"))
    );
}

#[tokio::test]
async fn test_existing_user_stops_before_any_sudo() {
    let host = HostStub {
        users: "root\nops\n".to_string(),
        ..HostStub::serving(19004)
    };
    let mut h = Harness::new(host);
    let result = h
        .run(&request(Variant::IsolatedUser, "ops"))
        .await
        .unwrap_err();

    assert_eq!(error_code(&result), "PREREQUISITE");
    assert!(h.host.calls().iter().all(|c| !c.starts_with("sudo")));
}

// ── Dry run ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_preview_never_consumes_an_allocation() {
    let cfg = test_config();
    let host = HostStub::default();
    let mut registry = MemRegistry::default();
    registry
        .registry
        .register(AllocationEntry {
            name: "first".to_string(),
            variant: Variant::SharedProfile,
            port: 19003,
            username: None,
            uid: None,
        })
        .unwrap();
    let before = registry.registry.clone();
    let req = request(Variant::SharedProfile, "scout");

    let first = preview(&host, &registry.registry, &settings(&cfg), &req)
        .await
        .unwrap();
    let second = preview(&host, &registry.registry, &settings(&cfg), &req)
        .await
        .unwrap();

    assert_eq!(first.allocation, second.allocation);
    assert_eq!(first.allocation.port, 19004);
    assert_eq!(first.plan.steps.len(), 7);
    assert!(
        first
            .paths
            .contains(&("profile", PathBuf::from("/Users/me/.openclaw-scout")))
    );
    assert_eq!(registry.registry, before);
    assert!(host.calls().is_empty());
}

#[tokio::test]
async fn test_preview_isolated_user_resolves_uid() {
    let cfg = test_config();
    let host = HostStub::default();
    let preview = preview(
        &host,
        &MemRegistry::default().registry,
        &settings(&cfg),
        &request(Variant::IsolatedUser, "ops"),
    )
    .await
    .unwrap();
    assert_eq!(preview.allocation.uid, Some(503));
    assert_eq!(preview.plan.steps.len(), 9);
    assert_eq!(host.calls(), vec!["dscl . -list /Users UniqueID".to_string()]);
}
