//! Application service — deploy use-case.
//!
//! Resolves the allocation, drives the variant's step sequence through the
//! generic runner, verifies a completed deployment, and writes the
//! deployment record. Imports only from `crate::domain` and
//! `crate::application`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use deploy_common::Variant;

use crate::application::ports::{
    CommandRunner, DeploymentRecordStore, LocalFs, NetworkProbe, ProgressReporter, RegistryStore,
    TemplateRenderer,
};
use crate::application::services::host::run_checked;
use crate::application::services::isolated_user::IsolatedUserExecutor;
use crate::application::services::runner::run_steps;
use crate::application::services::shared_profile::SharedProfileExecutor;
use crate::application::services::verify::{VerifyTarget, verify};
use crate::domain::artifacts::{
    ConfigInputs, IDENTITY_TEMPLATE, SERVICE_CONFIG_TEMPLATE, build_record, identity_vars,
    merge_service_config, service_config_vars, sha256_hex,
};
use crate::domain::config::DeployConfig;
use crate::domain::deployment::{DeploymentPlan, DeploymentResult, validate_target_name};
use crate::domain::error::DeployError;
use crate::domain::host;
use crate::domain::registry::AllocationRegistry;

/// What the operator asked for.
#[derive(Debug, Clone)]
pub struct DeployRequest {
    pub variant: Variant,
    pub name: String,
    pub port: Option<u16>,
    pub uid: Option<u32>,
    pub role: Option<String>,
    pub bot_token: Option<String>,
    pub model: Option<String>,
    /// Read from the environment by the caller, never from a file.
    pub api_key: Option<String>,
}

/// Per-invocation environment.
pub struct DeploySettings<'a> {
    pub config: &'a DeployConfig,
    /// Operator's home directory.
    pub home: &'a Path,
    pub deploy_time: DateTime<Utc>,
    /// Log artifact for this run, referenced from the deployment record.
    pub log_file: Option<&'a Path>,
}

/// Host ports the steps act through.
pub struct DeployPorts<'a, C, F, T, D> {
    pub runner: &'a C,
    pub fs: &'a F,
    pub templates: &'a T,
    pub records: &'a D,
}

/// Everything a step executor reads.
pub struct StepContext<'a, C, F, T, R> {
    pub runner: &'a C,
    pub fs: &'a F,
    pub templates: &'a T,
    pub reporter: &'a R,
    pub settings: &'a DeploySettings<'a>,
    pub request: &'a DeployRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub port: u16,
    pub uid: Option<u32>,
}

/// Values steps produce for the result.
#[derive(Debug, Clone, Default)]
pub struct DeploymentProgress {
    pub allocation: Option<Allocation>,
    pub username: Option<String>,
    pub config_sha256: Option<String>,
    pub pairing_handle: Option<String>,
    pub service_running: bool,
    pub manual_actions: Vec<String>,
}

impl DeploymentProgress {
    fn apply(self, result: &mut DeploymentResult) {
        if let Some(a) = self.allocation {
            result.port = Some(a.port);
            result.uid = a.uid;
        }
        result.username = self.username;
        result.config_sha256 = self.config_sha256;
        result.pairing_handle = self.pairing_handle;
        result.service_running = self.service_running;
        result.manual_actions = self.manual_actions;
    }

    /// The allocation, once `check prerequisites` has produced it.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Config` if called before allocation.
    pub fn allocation(&self) -> Result<Allocation, DeployError> {
        self.allocation
            .ok_or_else(|| DeployError::Config("no port allocated yet".to_string()))
    }
}

/// A run that stopped at a failed step.
#[derive(Debug)]
pub struct DeployFailure {
    pub result: DeploymentResult,
    pub error: DeployError,
}

/// Dry-run output.
#[derive(Debug, Clone)]
pub struct DeployPreview {
    pub plan: DeploymentPlan,
    pub allocation: Allocation,
    /// Labelled paths the run would create.
    pub paths: Vec<(&'static str, PathBuf)>,
}

// ── Allocation ────────────────────────────────────────────────────────────────

/// UIDs the OS directory service already hands out.
///
/// # Errors
///
/// Returns `DeployError::Prerequisite` if the directory service cannot be
/// queried.
pub async fn occupied_uids(runner: &impl CommandRunner) -> Result<BTreeSet<u32>, DeployError> {
    let output = run_checked(runner, &host::list_user_ids(), None, None)
        .await
        .map_err(|e| DeployError::Prerequisite(format!("cannot list user ids: {e}")))?;
    Ok(host::parse_user_ids(&String::from_utf8_lossy(&output.stdout)))
}

/// Pick the port (and UID for an isolated user), honouring explicit
/// overrides. Never mutates the registry.
///
/// # Errors
///
/// Returns `DeployError::Prerequisite` if an override collides with the
/// registry or the OS, or `--uid` is given for a shared profile, and
/// `DeployError::Config` if the port space is exhausted.
pub async fn resolve_allocation(
    runner: &impl CommandRunner,
    registry: &AllocationRegistry,
    request: &DeployRequest,
) -> Result<Allocation, DeployError> {
    let port = match request.port {
        Some(p) if registry.is_port_allocated(p) => {
            return Err(DeployError::Prerequisite(format!(
                "port {p} is reserved or already allocated"
            )));
        }
        Some(p) => p,
        None => registry.allocate_port(request.variant)?,
    };

    let uid = match request.variant {
        Variant::SharedProfile => {
            if request.uid.is_some() {
                return Err(DeployError::Prerequisite(
                    "--uid only applies to isolated-user deployments".to_string(),
                ));
            }
            None
        }
        Variant::IsolatedUser => {
            let occupied = occupied_uids(runner).await?;
            match request.uid {
                Some(u) if registry.is_uid_allocated(u) || occupied.contains(&u) => {
                    return Err(DeployError::Prerequisite(format!(
                        "uid {u} is already in use"
                    )));
                }
                Some(u) => Some(u),
                None => Some(registry.allocate_uid(&occupied)),
            }
        }
    };

    Ok(Allocation { port, uid })
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Rendered service configuration and identity document for one target.
pub struct MaterializedConfig {
    pub service_config: String,
    pub identity: String,
    pub sha256: String,
}

impl<C, F, T, R> StepContext<'_, C, F, T, R>
where
    C: CommandRunner,
    F: LocalFs,
    T: TemplateRenderer,
    R: ProgressReporter,
{
    /// Render both documents and merge the service configuration onto the
    /// operator's base document when one exists.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Config` on any read, render, or merge failure.
    pub fn materialize(&self, port: u16, workspace: &Path) -> Result<MaterializedConfig, DeployError> {
        let cfg = self.settings.config;
        let req = self.request;

        let api_key = req.api_key.as_deref().unwrap_or_default();
        if api_key.is_empty() {
            self.reporter.warn(&format!(
                "{} is not set; the generated configuration has an empty API key",
                cfg.api_key_env
            ));
        }

        let inputs = ConfigInputs {
            agent_name: &req.name,
            port,
            bot_token: req.bot_token.as_deref().unwrap_or_default(),
            model: req.model.as_deref().unwrap_or(&cfg.default_model),
            api_key,
            api_key_env: &cfg.api_key_env,
            workspace_path: workspace,
            role: req.role.as_deref().unwrap_or(&req.name),
            deploy_time: self.settings.deploy_time,
        };

        let source = DeployConfig::expand_home(&cfg.source_config, self.settings.home);
        let base = if self.fs.exists(&source) {
            tracing::debug!(path = %source.display(), "merging onto base configuration");
            Some(
                self.fs
                    .read_to_string(&source)
                    .map_err(|e| DeployError::config(&e))?,
            )
        } else {
            None
        };

        let rendered = self
            .templates
            .render(SERVICE_CONFIG_TEMPLATE, &service_config_vars(&inputs))?;
        let service_config = merge_service_config(base.as_deref(), &rendered, port)?;
        let identity = self
            .templates
            .render(IDENTITY_TEMPLATE, &identity_vars(&inputs))?;
        let sha256 = sha256_hex(service_config.as_bytes());

        Ok(MaterializedConfig {
            service_config,
            identity,
            sha256,
        })
    }

    /// Fixed wait for the service to bind its port.
    pub async fn startup_wait(&self) {
        let secs = self.settings.config.startup_wait_secs;
        self.reporter
            .waiting(&format!("waiting {secs}s for the gateway to bind its port"));
        tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
    }

    /// Print the manual pairing instructions and return the bot handle.
    pub fn pairing_notice(&self) -> String {
        let handle = crate::domain::deployment::pairing_handle(&self.request.name);
        self.reporter
            .info(&format!("pair the messaging channel manually with @{handle}:"));
        self.reporter.info("  1. send /start to the bot");
        self.reporter.info("  2. note the pairing code it replies with");
        self.reporter.info(&format!(
            "  3. run: {} pairing approve telegram <CODE>",
            self.settings.config.service_binary
        ));
        handle
    }
}

// ── Use cases ─────────────────────────────────────────────────────────────────

/// Show what a deployment would do without touching the registry or host.
///
/// # Errors
///
/// Returns an error if the name is invalid or no allocation is possible.
pub async fn preview(
    runner: &impl CommandRunner,
    registry: &AllocationRegistry,
    settings: &DeploySettings<'_>,
    request: &DeployRequest,
) -> Result<DeployPreview, DeployError> {
    validate_target_name(&request.name)?;
    let plan = DeploymentPlan::for_variant(request.variant, &request.name);
    let allocation = resolve_allocation(runner, registry, request).await?;
    let cfg = settings.config;
    let paths = match request.variant {
        Variant::SharedProfile => {
            let dir = DeployConfig::profile_dir(settings.home, &request.name);
            vec![
                ("profile", dir.clone()),
                ("workspace", dir.join("workspace")),
            ]
        }
        Variant::IsolatedUser => vec![
            ("home", cfg.user_home(&request.name)),
            ("config", cfg.user_service_dir(&request.name)),
            ("daemon", cfg.descriptor_path(&request.name)),
        ],
    };
    Ok(DeployPreview {
        plan,
        allocation,
        paths,
    })
}

/// Run a full deployment.
///
/// On success the result carries the verification report. On failure the
/// partial result and the failing step's error are returned together; no
/// rollback is attempted. The deployment record is written either way.
///
/// # Errors
///
/// Returns `DeployFailure` if the name is invalid or any step fails.
pub async fn deploy<C, F, T, D>(
    ports: &DeployPorts<'_, C, F, T, D>,
    registry: &mut impl RegistryStore,
    network: &impl NetworkProbe,
    reporter: &impl ProgressReporter,
    settings: &DeploySettings<'_>,
    request: &DeployRequest,
) -> Result<DeploymentResult, Box<DeployFailure>>
where
    C: CommandRunner,
    F: LocalFs,
    T: TemplateRenderer,
    D: DeploymentRecordStore,
{
    let plan = DeploymentPlan::for_variant(request.variant, &request.name);
    let mut result = DeploymentResult::new(&plan);
    result.log_file = settings.log_file.map(Path::to_path_buf);

    if let Err(error) = validate_target_name(&request.name) {
        result.error = Some(error.to_string());
        return Err(Box::new(DeployFailure { result, error }));
    }

    tracing::info!(
        variant = request.variant.tag(),
        agent = %request.name,
        steps = plan.steps.len(),
        "deployment started"
    );

    let ctx = StepContext {
        runner: ports.runner,
        fs: ports.fs,
        templates: ports.templates,
        reporter,
        settings,
        request,
    };

    let (outcome, progress) = match request.variant {
        Variant::SharedProfile => {
            let mut exec = SharedProfileExecutor::new(ctx, registry);
            let outcome = run_steps(&plan.steps, &mut result.journal, &mut exec, reporter).await;
            (outcome, exec.into_progress())
        }
        Variant::IsolatedUser => {
            let mut exec = IsolatedUserExecutor::new(ctx, registry);
            let outcome = run_steps(&plan.steps, &mut result.journal, &mut exec, reporter).await;
            (outcome, exec.into_progress())
        }
    };
    progress.apply(&mut result);

    match outcome {
        Ok(()) => {
            result.success = true;
            tracing::info!(agent = %request.name, "all steps completed");
            if let Some(port) = result.port {
                let target = VerifyTarget {
                    binary: &settings.config.service_binary,
                    port,
                };
                result.verify_report = Some(verify(ports.runner, network, &target).await);
            }
            write_record(ports.records, reporter, settings, &mut result);
            Ok(result)
        }
        Err(error) => {
            tracing::error!(agent = %request.name, error = %error, "deployment aborted");
            result.error = Some(error.to_string());
            write_record(ports.records, reporter, settings, &mut result);
            Err(Box::new(DeployFailure { result, error }))
        }
    }
}

/// The record is an audit artifact: failing to write it is reported but does
/// not change the deployment outcome.
fn write_record(
    records: &impl DeploymentRecordStore,
    reporter: &impl ProgressReporter,
    settings: &DeploySettings<'_>,
    result: &mut DeploymentResult,
) {
    let record = build_record(result, settings.log_file, Utc::now());
    match records.save_record(&record) {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "deployment record written");
            result.record_file = Some(path);
        }
        Err(e) => {
            tracing::warn!(error = %format!("{e:#}"), "cannot write deployment record");
            reporter.warn(&format!("cannot write deployment record: {e:#}"));
        }
    }
}
