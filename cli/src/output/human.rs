//! Human-readable terminal renderer.

use deploy_common::{AllocationEntry, CheckRecord};
use owo_colors::OwoColorize as _;

use crate::application::services::deploy::DeployPreview;
use crate::application::services::rollback::RollbackReport;
use crate::application::services::runner::ReversalStatus;
use crate::domain::deployment::{DeploymentResult, VerifyReport};
use crate::output::OutputContext;

/// Renders domain types as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Render registered allocations in registration order.
    pub fn render_allocations(&self, entries: &[AllocationEntry]) {
        if self.ctx.quiet {
            return;
        }
        if entries.is_empty() {
            println!("No agents registered. Deploy one: agent-deploy deploy --variant <v> --name <n>");
            return;
        }
        println!(
            "  {}",
            format!("{:<20} {:<16} {:<7} {:<16} {}", "NAME", "VARIANT", "PORT", "USER", "UID")
                .style(self.ctx.styles.bold)
        );
        for e in entries {
            println!(
                "  {:<20} {:<16} {:<7} {:<16} {}",
                e.name,
                e.variant
                    .display_name()
                    .style(self.ctx.styles.variant(e.variant)),
                e.port.style(self.ctx.styles.allocation),
                e.username.as_deref().unwrap_or("-"),
                e.uid.map_or_else(|| "-".to_string(), |u| u.to_string()),
            );
        }
    }

    /// Render the dry-run plan.
    pub fn render_preview(&self, preview: &DeployPreview) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.header(&format!(
            "Dry run: {} deployment of '{}'",
            preview.plan.variant, preview.plan.target_name
        ));
        println!();
        for (i, step) in preview.plan.steps.iter().enumerate() {
            println!("  {:>2}. {step}", i + 1);
        }
        println!();
        self.ctx.kv(
            "port",
            &preview
                .allocation
                .port
                .style(self.ctx.styles.allocation)
                .to_string(),
        );
        if let Some(uid) = preview.allocation.uid {
            self.ctx.kv("uid", &uid.to_string());
        }
        for (label, path) in &preview.paths {
            self.ctx.kv(label, &path.display().to_string());
        }
        println!();
        self.ctx.info("Nothing was changed.");
    }

    /// Render the summary after a successful deployment.
    pub fn render_deployment(&self, result: &DeploymentResult) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header(&format!(
            "Deployed {} '{}'",
            result.variant, result.target_name
        ));
        if let Some(port) = result.port {
            self.ctx.kv("port", &port.to_string());
        }
        if let Some(user) = &result.username {
            self.ctx.kv("user", user);
        }
        if let Some(uid) = result.uid {
            self.ctx.kv("uid", &uid.to_string());
        }
        if let Some(handle) = &result.pairing_handle {
            self.ctx.kv("bot", &format!("@{handle}"));
        }
        if let Some(sha) = &result.config_sha256 {
            self.ctx.kv("config", &format!("sha256:{sha}"));
        }
        if let Some(path) = &result.record_file {
            self.ctx.kv("record", &path.display().to_string());
        }
        if let Some(path) = &result.log_file {
            self.ctx.kv("log", &path.display().to_string());
        }
        if !result.manual_actions.is_empty() {
            println!();
            self.ctx.info("Still to do by hand:");
            for cmd in &result.manual_actions {
                println!("      {cmd}");
            }
        }
        if let Some(report) = &result.verify_report {
            println!();
            self.render_checks(&report.checks);
            if !report.all_passed() {
                self.ctx
                    .warn("Some checks failed; the service may still be starting.");
                self.ctx.info(&format!(
                    "Re-run later: agent-deploy verify {}",
                    result.target_name
                ));
            }
        }
    }

    /// Render the standalone verification report.
    pub fn render_verify(&self, name: &str, port: u16, report: &VerifyReport) {
        if self.ctx.quiet {
            return;
        }
        self.ctx.header(&format!("Verifying '{name}' on port {port}"));
        self.render_checks(&report.checks);
    }

    fn render_checks(&self, checks: &[CheckRecord]) {
        for check in checks {
            let line = format!("{:<10} {}", check.name, check.message);
            if check.passed {
                self.ctx.success(&line);
            } else {
                self.ctx.error(&line);
            }
        }
    }

    /// Render the rollback outcome and any manual follow-ups.
    pub fn render_rollback(&self, report: &RollbackReport) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header(&format!(
            "Rolled back {} '{}'",
            report.variant, report.target_name
        ));
        for record in &report.records {
            match &record.status {
                ReversalStatus::Reverted => self.ctx.success(&record.name),
                ReversalStatus::Skipped(why) => self
                    .ctx
                    .info(&format!("{} {}", record.name, format!("({why})").style(self.ctx.styles.dim))),
                ReversalStatus::Failed(err) => self.ctx.error(&format!("{}: {err}", record.name)),
            }
        }
        if !report.manual_actions.is_empty() {
            println!();
            self.ctx
                .warn("The OS user and its home directory were kept. Remove them by hand:");
            for cmd in &report.manual_actions {
                println!("      {cmd}");
            }
        }
    }
}
