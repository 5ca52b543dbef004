//! Step executor for the shared-profile variant: a profile directory under
//! the operator's own account and a detached gateway process.

use std::path::PathBuf;

use deploy_common::{AllocationEntry, Variant};

use crate::application::ports::{
    CommandRunner, LocalFs, ProgressReporter, RegistryStore, TemplateRenderer,
};
use crate::application::services::deploy::{DeploymentProgress, StepContext, resolve_allocation};
use crate::application::services::host::run_checked;
use crate::application::services::runner::StepExecutor;
use crate::domain::artifacts::{IDENTITY_FILE, SERVICE_CONFIG_FILE};
use crate::domain::config::DeployConfig;
use crate::domain::deployment::{PlannedStep, StepKind};
use crate::domain::error::DeployError;
use crate::domain::host;

pub struct SharedProfileExecutor<'a, C, F, T, R, G> {
    ctx: StepContext<'a, C, F, T, R>,
    registry: &'a mut G,
    progress: DeploymentProgress,
}

impl<'a, C, F, T, R, G> SharedProfileExecutor<'a, C, F, T, R, G>
where
    C: CommandRunner,
    F: LocalFs,
    T: TemplateRenderer,
    R: ProgressReporter,
    G: RegistryStore,
{
    pub fn new(ctx: StepContext<'a, C, F, T, R>, registry: &'a mut G) -> Self {
        Self {
            ctx,
            registry,
            progress: DeploymentProgress::default(),
        }
    }

    #[must_use]
    pub fn into_progress(self) -> DeploymentProgress {
        self.progress
    }

    fn profile_dir(&self) -> PathBuf {
        DeployConfig::profile_dir(self.ctx.settings.home, &self.ctx.request.name)
    }

    fn workspace(&self) -> PathBuf {
        self.profile_dir().join("workspace")
    }

    async fn check_prerequisites(&mut self) -> Result<(), DeployError> {
        let cfg = self.ctx.settings.config;
        let which = host::which(&cfg.service_binary);
        if run_checked(self.ctx.runner, &which, None, None).await.is_err() {
            return Err(DeployError::Prerequisite(format!(
                "{} is not installed",
                cfg.service_binary
            )));
        }
        if !self.ctx.fs.exists(&cfg.shared_path) {
            return Err(DeployError::Prerequisite(format!(
                "shared resource root is missing: {}",
                cfg.shared_path.display()
            )));
        }
        let dir = self.profile_dir();
        if self.ctx.fs.exists(&dir) {
            return Err(DeployError::Prerequisite(format!(
                "profile already exists: {}",
                dir.display()
            )));
        }
        let allocation =
            resolve_allocation(self.ctx.runner, self.registry.registry(), self.ctx.request).await?;
        tracing::info!(port = allocation.port, "port allocated");
        self.progress.allocation = Some(allocation);
        Ok(())
    }

    fn create_profile_dir(&self) -> Result<(), DeployError> {
        self.ctx
            .fs
            .create_dir_all(&self.workspace())
            .map_err(|e| DeployError::config(&e))
    }

    fn materialize_config(&mut self) -> Result<(), DeployError> {
        let port = self.progress.allocation()?.port;
        let workspace = self.workspace();
        let docs = self.ctx.materialize(port, &workspace)?;
        let fs = self.ctx.fs;
        fs.write(&self.profile_dir().join(SERVICE_CONFIG_FILE), &docs.service_config)
            .map_err(|e| DeployError::config(&e))?;
        fs.write(&workspace.join(IDENTITY_FILE), &docs.identity)
            .map_err(|e| DeployError::config(&e))?;
        self.progress.config_sha256 = Some(docs.sha256);
        Ok(())
    }

    fn link_shared_resources(&self) -> Result<(), DeployError> {
        let cfg = self.ctx.settings.config;
        let fs = self.ctx.fs;
        let workspace = self.workspace();
        for rel in &cfg.shared_links {
            let target = cfg.shared_path.join(rel);
            if !fs.exists(&target) {
                tracing::warn!(path = %target.display(), "shared resource missing, not linked");
                self.ctx
                    .reporter
                    .warn(&format!("shared resource missing, not linked: {rel}"));
                continue;
            }
            let link = workspace.join(rel);
            if let Some(parent) = link.parent() {
                fs.create_dir_all(parent)
                    .map_err(|e| DeployError::config(&e))?;
            }
            fs.symlink(&target, &link)
                .map_err(|e| DeployError::config(&e))?;
        }
        Ok(())
    }

    async fn start_service(&mut self) -> Result<(), DeployError> {
        let cfg = self.ctx.settings.config;
        let port = self.progress.allocation()?.port;
        let cmd = host::gateway(&cfg.service_binary, port);
        let dir = self.profile_dir().to_string_lossy().into_owned();
        let pid = self
            .ctx
            .runner
            .spawn_detached(
                &cmd.program,
                &cmd.arg_refs(),
                &[(cfg.config_env_var.as_str(), dir.as_str())],
            )
            .map_err(|e| DeployError::config(&e))?;
        tracing::info!(pid, port, "gateway spawned");
        self.ctx.startup_wait().await;
        self.progress.service_running = true;
        Ok(())
    }

    fn register_allocation(&mut self) -> Result<(), DeployError> {
        let allocation = self.progress.allocation()?;
        self.registry.register_allocation(AllocationEntry {
            name: self.ctx.request.name.clone(),
            variant: Variant::SharedProfile,
            port: allocation.port,
            username: None,
            uid: None,
        })
    }
}

impl<C, F, T, R, G> StepExecutor<PlannedStep> for SharedProfileExecutor<'_, C, F, T, R, G>
where
    C: CommandRunner,
    F: LocalFs,
    T: TemplateRenderer,
    R: ProgressReporter,
    G: RegistryStore,
{
    async fn execute(&mut self, step: &PlannedStep) -> Result<(), DeployError> {
        match step.kind {
            StepKind::CheckPrerequisites => self.check_prerequisites().await,
            StepKind::CreateProfileDir => self.create_profile_dir(),
            StepKind::MaterializeConfig => self.materialize_config(),
            StepKind::LinkSharedResources => self.link_shared_resources(),
            StepKind::StartService => self.start_service().await,
            StepKind::PairingNotice => {
                self.progress.pairing_handle = Some(self.ctx.pairing_notice());
                Ok(())
            }
            StepKind::RegisterAllocation => self.register_allocation(),
            other @ (StepKind::CreateUser
            | StepKind::InstallDependencies
            | StepKind::RegisterDaemon) => Err(DeployError::Config(format!(
                "step '{other}' does not apply to shared-profile deployments"
            ))),
        }
    }
}
