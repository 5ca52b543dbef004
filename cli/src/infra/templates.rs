//! Templates compiled into the binary and a strict `{{ var }}` renderer.
//!
//! At compile time, `include_dir!` embeds everything under `cli/templates/`:
//!   - `service-config.json.tmpl` — gateway configuration overlay
//!   - `identity.md.tmpl`         — agent identity document
//!   - `launchd.plist.tmpl`       — system daemon descriptor

use std::collections::BTreeSet;
use std::sync::LazyLock;

use include_dir::{Dir, include_dir};
use regex::{Captures, Regex};

use crate::application::ports::TemplateRenderer;
use crate::domain::artifacts::TemplateVars;
use crate::domain::error::DeployError;

static EMBEDDED_TEMPLATES: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/templates");

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("valid regex")
});

/// Substitute every `{{ var }}` in `template`.
///
/// # Errors
///
/// Returns `DeployError::Config` naming every placeholder without a value.
pub fn render_str(template: &str, vars: &TemplateVars) -> Result<String, DeployError> {
    let missing: BTreeSet<&str> = PLACEHOLDER_RE
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| !vars.contains_key(*name))
        .collect();
    if !missing.is_empty() {
        return Err(DeployError::Config(format!(
            "template placeholders without a value: {}",
            missing.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }
    Ok(PLACEHOLDER_RE
        .replace_all(template, |c: &Captures<'_>| {
            vars.get(&c[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

/// Production `TemplateRenderer` over the embedded templates.
pub struct EmbeddedTemplates;

impl EmbeddedTemplates {
    fn source(name: &str) -> Result<&'static str, DeployError> {
        let file = EMBEDDED_TEMPLATES
            .get_file(format!("{name}.tmpl"))
            .ok_or_else(|| DeployError::Config(format!("unknown template: {name}")))?;
        file.contents_utf8()
            .ok_or_else(|| DeployError::Config(format!("template {name} is not UTF-8")))
    }
}

impl TemplateRenderer for EmbeddedTemplates {
    fn render(&self, name: &str, vars: &TemplateVars) -> Result<String, DeployError> {
        let rendered = render_str(Self::source(name)?, vars)?;
        tracing::debug!(template = name, bytes = rendered.len(), "template rendered");
        Ok(rendered)
    }
}
