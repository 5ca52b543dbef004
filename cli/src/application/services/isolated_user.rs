//! Step executor for the isolated-user variant: a dedicated OS user whose
//! gateway is supervised by the system daemon manager.
//!
//! Root operations go through `sudo -n`; files inside the user's home are
//! written as that user so they end up owned by them.

use std::path::{Path, PathBuf};

use deploy_common::{AllocationEntry, Variant};

use crate::application::ports::{
    CommandRunner, LocalFs, ProgressReporter, RegistryStore, TemplateRenderer,
};
use crate::application::services::deploy::{DeploymentProgress, StepContext, resolve_allocation};
use crate::application::services::host::{INSTALL_TIMEOUT, run_checked, run_privileged};
use crate::application::services::runner::StepExecutor;
use crate::domain::artifacts::{DAEMON_TEMPLATE, IDENTITY_FILE, SERVICE_CONFIG_FILE, daemon_vars};
use crate::domain::config::DeployConfig;
use crate::domain::deployment::{PlannedStep, StepKind};
use crate::domain::error::DeployError;
use crate::domain::host::{self, HostCommand};

pub struct IsolatedUserExecutor<'a, C, F, T, R, G> {
    ctx: StepContext<'a, C, F, T, R>,
    registry: &'a mut G,
    progress: DeploymentProgress,
}

impl<'a, C, F, T, R, G> IsolatedUserExecutor<'a, C, F, T, R, G>
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

    fn username(&self) -> &str {
        &self.ctx.request.name
    }

    fn workspace(&self) -> PathBuf {
        self.ctx
            .settings
            .config
            .user_service_dir(self.username())
            .join("workspace")
    }

    async fn write_as_user(&self, path: &Path, content: &str) -> Result<(), DeployError> {
        let cmd = host::write_as_user(self.username(), path);
        run_checked(self.ctx.runner, &cmd, Some(content.as_bytes()), None).await?;
        Ok(())
    }

    async fn mkdir_as_user(&self, dir: &Path) -> Result<(), DeployError> {
        let cmd = host::mkdir_as_user(self.username(), dir);
        run_checked(self.ctx.runner, &cmd, None, None).await?;
        Ok(())
    }

    async fn check_prerequisites(&mut self) -> Result<(), DeployError> {
        let cfg = self.ctx.settings.config;
        let runner = self.ctx.runner;
        if run_checked(runner, &host::which(&cfg.service_binary), None, None)
            .await
            .is_err()
        {
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
        let users = run_checked(runner, &host::list_users(), None, None)
            .await
            .map_err(|e| DeployError::Prerequisite(format!("cannot list users: {e}")))?;
        if host::user_listed(&String::from_utf8_lossy(&users.stdout), self.username()) {
            return Err(DeployError::Prerequisite(format!(
                "user already exists: {}",
                self.username()
            )));
        }
        let allocation =
            resolve_allocation(runner, self.registry.registry(), self.ctx.request).await?;
        tracing::info!(port = allocation.port, uid = ?allocation.uid, "port and uid allocated");
        self.progress.allocation = Some(allocation);
        self.progress.username = Some(self.username().to_string());
        Ok(())
    }

    async fn create_user(&mut self) -> Result<(), DeployError> {
        let uid = self
            .progress
            .allocation()?
            .uid
            .ok_or_else(|| DeployError::Config("no uid allocated".to_string()))?;
        let name = self.username();
        let real_name = self.ctx.request.role.as_deref().unwrap_or(name);
        for cmd in host::create_user(self.ctx.settings.config, name, uid, real_name) {
            run_privileged(self.ctx.runner, &cmd, None).await?;
        }
        let password = host::manual_password(name);
        self.progress.manual_actions.push(password);
        Ok(())
    }

    async fn install_dependencies(&self) -> Result<(), DeployError> {
        for argv in &self.ctx.settings.config.install_commands {
            let Some((program, args)) = argv.split_first() else {
                continue;
            };
            let cmd = HostCommand::new(program, args.iter().cloned()).as_user(self.username());
            run_checked(self.ctx.runner, &cmd, None, Some(INSTALL_TIMEOUT)).await?;
        }
        Ok(())
    }

    async fn materialize_config(&mut self) -> Result<(), DeployError> {
        let cfg = self.ctx.settings.config;
        let port = self.progress.allocation()?.port;
        let workspace = self.workspace();
        let service_dir = cfg.user_service_dir(self.username());

        self.mkdir_as_user(&workspace).await?;
        let docs = self.ctx.materialize(port, &workspace)?;
        self.write_as_user(&service_dir.join(SERVICE_CONFIG_FILE), &docs.service_config)
            .await?;
        self.write_as_user(&workspace.join(IDENTITY_FILE), &docs.identity)
            .await?;

        let auth_src = DeployConfig::expand_home(&cfg.auth_profiles, self.ctx.settings.home);
        if self.ctx.fs.exists(&auth_src) {
            let content = self
                .ctx
                .fs
                .read_to_string(&auth_src)
                .map_err(|e| DeployError::config(&e))?;
            let auth_dst = service_dir.join("agents/main/agent/auth-profiles.json");
            if let Some(parent) = auth_dst.parent() {
                self.mkdir_as_user(parent).await?;
            }
            self.write_as_user(&auth_dst, &content).await?;
        } else {
            tracing::debug!(path = %auth_src.display(), "no auth profiles to copy");
        }

        self.progress.config_sha256 = Some(docs.sha256);
        Ok(())
    }

    async fn link_shared_resources(&self) -> Result<(), DeployError> {
        let cfg = self.ctx.settings.config;
        let workspace = self.workspace();
        for rel in &cfg.shared_links {
            let target = cfg.shared_path.join(rel);
            if !self.ctx.fs.exists(&target) {
                tracing::warn!(path = %target.display(), "shared resource missing, not linked");
                self.ctx
                    .reporter
                    .warn(&format!("shared resource missing, not linked: {rel}"));
                continue;
            }
            let link = workspace.join(rel);
            if let Some(parent) = link.parent() {
                self.mkdir_as_user(parent).await?;
            }
            let cmd = host::symlink_as_user(self.username(), &target, &link);
            run_checked(self.ctx.runner, &cmd, None, None).await?;
        }
        Ok(())
    }

    async fn register_daemon(&self) -> Result<(), DeployError> {
        let cfg = self.ctx.settings.config;
        let name = self.username();
        let port = self.progress.allocation()?.port;
        let descriptor = cfg.descriptor_path(name);
        let plist = self
            .ctx
            .templates
            .render(DAEMON_TEMPLATE, &daemon_vars(cfg, name, port))?;

        self.mkdir_as_user(Path::new(&host::daemon_log_dir(name)))
            .await?;

        let runner = self.ctx.runner;
        run_privileged(runner, &host::write_privileged(&descriptor), Some(plist.as_bytes())).await?;
        run_privileged(runner, &host::chown_privileged("root:wheel", &descriptor), None).await?;
        run_privileged(runner, &host::chmod_privileged("644", &descriptor), None).await?;
        run_privileged(runner, &host::bootstrap_daemon(&descriptor), None).await?;
        tracing::info!(label = %cfg.service_label(name), "daemon bootstrapped");
        Ok(())
    }

    async fn start_service(&mut self) -> Result<(), DeployError> {
        // RunAtLoad starts the gateway as soon as the daemon is bootstrapped.
        self.ctx.startup_wait().await;
        self.progress.service_running = true;
        Ok(())
    }

    fn register_allocation(&mut self) -> Result<(), DeployError> {
        let allocation = self.progress.allocation()?;
        self.registry.register_allocation(AllocationEntry {
            name: self.ctx.request.name.clone(),
            variant: Variant::IsolatedUser,
            port: allocation.port,
            username: Some(self.ctx.request.name.clone()),
            uid: allocation.uid,
        })
    }
}

impl<C, F, T, R, G> StepExecutor<PlannedStep> for IsolatedUserExecutor<'_, C, F, T, R, G>
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
            StepKind::CreateUser => self.create_user().await,
            StepKind::InstallDependencies => self.install_dependencies().await,
            StepKind::MaterializeConfig => self.materialize_config().await,
            StepKind::LinkSharedResources => self.link_shared_resources().await,
            StepKind::RegisterDaemon => self.register_daemon().await,
            StepKind::StartService => self.start_service().await,
            StepKind::PairingNotice => {
                self.progress.pairing_handle = Some(self.ctx.pairing_notice());
                Ok(())
            }
            StepKind::RegisterAllocation => self.register_allocation(),
            StepKind::CreateProfileDir => Err(DeployError::Config(
                "step 'create profile directory' does not apply to isolated-user deployments"
                    .to_string(),
            )),
        }
    }
}
