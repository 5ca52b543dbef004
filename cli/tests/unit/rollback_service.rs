//! Rollback after a real deployment against the same stubbed host.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::Path;

use agent_deploy::application::ports::LocalFs as _;
use agent_deploy::application::services::deploy::{
    DeployPorts, DeployRequest, DeploySettings, deploy,
};
use agent_deploy::application::services::rollback::{RollbackPorts, RollbackTarget, rollback};
use agent_deploy::application::services::runner::ReversalStatus;
use agent_deploy::infra::templates::EmbeddedTemplates;
use chrono::Utc;
use deploy_common::Variant;

use crate::mocks::{
    HostStub, MemFs, MemRecords, MemRegistry, Reachable, RecordingReporter, test_config,
};

#[tokio::test]
async fn test_rollback_undoes_a_shared_profile_deployment() {
    let cfg = test_config();
    let home = Path::new("/Users/me");
    let host = HostStub::serving(19003);
    let fs = MemFs::with_dirs(["/shared"]);
    let records = MemRecords::default();
    let mut registry = MemRegistry::default();
    let reporter = RecordingReporter::default();

    let ports = DeployPorts {
        runner: &host,
        fs: &fs,
        templates: &EmbeddedTemplates,
        records: &records,
    };
    let settings = DeploySettings {
        config: &cfg,
        home,
        deploy_time: Utc::now(),
        log_file: None,
    };
    let request = DeployRequest {
        variant: Variant::SharedProfile,
        name: "scout".to_string(),
        port: None,
        uid: None,
        role: Some("researcher".to_string()),
        bot_token: None,
        model: None,
        api_key: None,
    };
    deploy(
        &ports,
        &mut registry,
        &Reachable(true),
        &reporter,
        &settings,
        &request,
    )
    .await
    .expect("deploy succeeds");
    let profile = home.join(".openclaw-scout");
    assert!(fs.exists(&profile));

    let target = RollbackTarget {
        variant: Variant::SharedProfile,
        name: "scout",
        port: registry.registry.find("scout").map(|e| e.port),
    };
    let rollback_ports = RollbackPorts {
        runner: &host,
        fs: &fs,
        records: &records,
    };
    let report = rollback(&rollback_ports, &reporter, &cfg, home, &target)
        .await
        .unwrap();

    assert_eq!(report.failures(), 0);
    assert!(
        report
            .records
            .iter()
            .all(|r| r.status == ReversalStatus::Reverted)
    );
    assert!(!fs.exists(&profile));
    assert!(!fs.exists(&profile.join("openclaw.json")));
    assert!(records.saved.borrow().is_empty());
    assert_eq!(
        host.calls().last().unwrap(),
        "pkill -f openclaw gateway --port 19003( |$)"
    );
    // The allocation stays claimed.
    assert_eq!(registry.registry.allocated.len(), 1);
}
