//! Property-based tests for generated documents and name validation.
//!
//! Uses `proptest` to check that operator-supplied text can never break the
//! structure of what gets written to disk.

#![allow(clippy::expect_used)]

use std::path::Path;

use agent_deploy::application::ports::TemplateRenderer;
use agent_deploy::domain::artifacts::{
    ConfigInputs, DAEMON_TEMPLATE, SERVICE_CONFIG_TEMPLATE, daemon_vars, merge_service_config,
    service_config_vars,
};
use agent_deploy::domain::config::DeployConfig;
use agent_deploy::domain::deployment::validate_target_name;
use agent_deploy::infra::templates::EmbeddedTemplates;
use chrono::Utc;
use proptest::prelude::*;

proptest! {
    /// Any bot token, model, key, or role renders to JSON that round-trips
    /// the exact value and carries the allocated port.
    #[test]
    fn prop_service_config_survives_any_text(
        token in ".*",
        model in ".*",
        role in ".*",
        port in 1024u16..,
    ) {
        let inputs = ConfigInputs {
            agent_name: "scout",
            port,
            bot_token: &token,
            model: &model,
            api_key: "sk",
            api_key_env: "DASHSCOPE_API_KEY",
            workspace_path: Path::new("/Users/me/.openclaw-scout/workspace"),
            role: &role,
            deploy_time: Utc::now(),
        };
        let rendered = EmbeddedTemplates
            .render(SERVICE_CONFIG_TEMPLATE, &service_config_vars(&inputs))
            .expect("all placeholders bound");
        let merged = merge_service_config(None, &rendered, port).expect("valid JSON");
        let doc: serde_json::Value = serde_json::from_str(&merged).expect("parses");
        prop_assert_eq!(doc["channels"]["telegram"]["botToken"].as_str(), Some(token.as_str()));
        prop_assert_eq!(doc["agents"]["defaults"]["model"]["primary"].as_str(), Some(model.as_str()));
        prop_assert_eq!(doc["gateway"]["port"].as_u64(), Some(u64::from(port)));
    }

    /// Every name the validator accepts stays inside one path component and
    /// produces a descriptor with no stray markup.
    #[test]
    fn prop_valid_names_are_path_and_markup_safe(name in "[a-z][a-z0-9_-]{0,31}") {
        prop_assert!(validate_target_name(&name).is_ok());
        let cfg = DeployConfig::default();
        let home = cfg.user_home(&name);
        prop_assert_eq!(home.parent(), Some(cfg.users_root.as_path()));
        let plist = EmbeddedTemplates
            .render(DAEMON_TEMPLATE, &daemon_vars(&cfg, &name, 19004))
            .expect("renders");
        prop_assert_eq!(plist.matches("<dict>").count(), 1);
    }

    /// Anything with a separator, dot, or uppercase letter is refused.
    #[test]
    fn prop_unsafe_names_are_rejected(
        prefix in "[a-z]{1,5}",
        bad in prop::sample::select(vec!['/', '.', ' ', 'A', '$', '\\']),
        suffix in "[a-z]{0,5}",
    ) {
        let name = format!("{prefix}{bad}{suffix}");
        prop_assert!(validate_target_name(&name).is_err());
    }
}
