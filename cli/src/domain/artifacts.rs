//! Generated per-target artifacts — template variables, the merged service
//! configuration, and the deployment record. Pure functions, no I/O.
//!
//! The caller renders templates and writes the results.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use deploy_common::{DeploymentRecord, Variant};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::config::DeployConfig;
use crate::domain::deployment::DeploymentResult;
use crate::domain::error::DeployError;
use crate::domain::host::daemon_log_dir;

pub const SERVICE_CONFIG_TEMPLATE: &str = "service-config.json";
pub const IDENTITY_TEMPLATE: &str = "identity.md";
pub const DAEMON_TEMPLATE: &str = "launchd.plist";

/// File names inside a profile or `~/.openclaw` directory.
pub const SERVICE_CONFIG_FILE: &str = "openclaw.json";
pub const IDENTITY_FILE: &str = "IDENTITY.md";

/// Variable mapping handed to the template renderer.
pub type TemplateVars = BTreeMap<String, String>;

/// Everything the generated configuration and identity documents depend on.
#[derive(Debug, Clone)]
pub struct ConfigInputs<'a> {
    pub agent_name: &'a str,
    pub port: u16,
    pub bot_token: &'a str,
    pub model: &'a str,
    pub api_key: &'a str,
    /// Environment variable the gateway reads the key from.
    pub api_key_env: &'a str,
    pub workspace_path: &'a Path,
    pub role: &'a str,
    pub deploy_time: DateTime<Utc>,
}

impl ConfigInputs<'_> {
    fn raw_vars(&self) -> TemplateVars {
        let mut vars = TemplateVars::new();
        vars.insert("agent_name".into(), self.agent_name.to_string());
        vars.insert("port".into(), self.port.to_string());
        vars.insert("bot_token".into(), self.bot_token.to_string());
        vars.insert("default_model".into(), self.model.to_string());
        vars.insert("api_key".into(), self.api_key.to_string());
        vars.insert("api_key_env".into(), self.api_key_env.to_string());
        vars.insert(
            "workspace_path".into(),
            self.workspace_path.to_string_lossy().into_owned(),
        );
        vars.insert("role".into(), self.role.to_string());
        vars.insert(
            "deploy_time".into(),
            self.deploy_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        vars
    }
}

/// Variables for `service-config.json`, escaped for use inside JSON strings.
#[must_use]
pub fn service_config_vars(inputs: &ConfigInputs<'_>) -> TemplateVars {
    inputs
        .raw_vars()
        .into_iter()
        .map(|(k, v)| (k, json_escape(&v)))
        .collect()
}

/// Variables for `identity.md`, unescaped.
#[must_use]
pub fn identity_vars(inputs: &ConfigInputs<'_>) -> TemplateVars {
    inputs.raw_vars()
}

/// Variables for the daemon descriptor, escaped for XML.
#[must_use]
pub fn daemon_vars(cfg: &DeployConfig, username: &str, port: u16) -> TemplateVars {
    let log_dir = daemon_log_dir(username);
    let mut vars = TemplateVars::new();
    vars.insert("label".into(), cfg.service_label(username));
    vars.insert(
        "executable".into(),
        cfg.service_binary_path.to_string_lossy().into_owned(),
    );
    vars.insert("port".into(), port.to_string());
    vars.insert(
        "working_directory".into(),
        cfg.user_home(username).to_string_lossy().into_owned(),
    );
    vars.insert("stdout_path".into(), format!("{log_dir}/openclaw.log"));
    vars.insert("stderr_path".into(), format!("{log_dir}/openclaw.err"));
    vars.insert("username".into(), username.to_string());
    vars.into_iter().map(|(k, v)| (k, xml_escape(&v))).collect()
}

fn json_escape(value: &str) -> String {
    // serde_json never fails on a plain string.
    let quoted = serde_json::to_string(value).unwrap_or_default();
    quoted
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or_default()
        .to_string()
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Merge the rendered configuration onto the operator's base document and
/// check the result names the allocated gateway port.
///
/// Objects merge key by key; anything else in `rendered` replaces the base
/// value.
///
/// # Errors
///
/// Returns `DeployError::Config` if either document is not valid JSON or the
/// merged document's `gateway.port` differs from `port`.
pub fn merge_service_config(
    base: Option<&str>,
    rendered: &str,
    port: u16,
) -> Result<String, DeployError> {
    let overlay: Value = serde_json::from_str(rendered)
        .map_err(|e| DeployError::Config(format!("rendered service configuration is not JSON: {e}")))?;
    let mut doc = match base {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| DeployError::Config(format!("base service configuration is not JSON: {e}")))?,
        None => Value::Object(serde_json::Map::new()),
    };
    merge_json(&mut doc, overlay);
    check_gateway_port(&doc, port)?;
    let mut out = serde_json::to_string_pretty(&doc)
        .map_err(|e| DeployError::Config(format!("serializing service configuration: {e}")))?;
    out.push('\n');
    Ok(out)
}

fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// # Errors
///
/// Returns `DeployError::Config` unless `doc.gateway.port == port`.
pub fn check_gateway_port(doc: &Value, port: u16) -> Result<(), DeployError> {
    match doc.pointer("/gateway/port").and_then(Value::as_u64) {
        Some(found) if found == u64::from(port) => Ok(()),
        Some(found) => Err(DeployError::Config(format!(
            "generated configuration sets gateway.port {found}, expected {port}"
        ))),
        None => Err(DeployError::Config(
            "generated configuration has no gateway.port".to_string(),
        )),
    }
}

/// Lowercase hex encoding.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from(HEX[(b >> 4) as usize]));
        out.push(char::from(HEX[(b & 0xf) as usize]));
    }
    out
}

#[must_use]
pub fn sha256_hex(content: &[u8]) -> String {
    hex_encode(&Sha256::digest(content))
}

/// `<variant>-<name>.json`
#[must_use]
pub fn record_file_name(variant: Variant, name: &str) -> String {
    format!("{}-{name}.json", variant.tag())
}

/// Snapshot a run for the deployment record.
#[must_use]
pub fn build_record(
    result: &DeploymentResult,
    log_file: Option<&Path>,
    recorded_at: DateTime<Utc>,
) -> DeploymentRecord {
    DeploymentRecord {
        name: result.target_name.clone(),
        variant: result.variant,
        status: result.journal.status(),
        port: result.port,
        username: result.username.clone(),
        uid: result.uid,
        steps: result.journal.records().to_vec(),
        checks: result
            .verify_report
            .as_ref()
            .map(|r| r.checks.clone())
            .unwrap_or_default(),
        error: result.error.clone(),
        config_sha256: result.config_sha256.clone(),
        log_file: log_file.map(|p| p.to_string_lossy().into_owned()),
        recorded_at,
    }
}
