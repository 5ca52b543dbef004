//! Terminal stylesheet. Every style is plain until `colorize` runs, so
//! `--no-color` output needs no special casing at call sites.

use deploy_common::Variant;
use owo_colors::Style;

#[derive(Default, Clone)]
pub struct Styles {
    pub success: Style,
    pub warning: Style,
    pub error: Style,
    pub info: Style,
    pub dim: Style,
    pub bold: Style,
    pub header: Style,
    /// Allocated ports and UIDs in tables and summaries.
    pub allocation: Style,
    pub shared_profile: Style,
    pub isolated_user: Style,
}

impl Styles {
    pub fn colorize(&mut self) {
        self.success = Style::new().green();
        self.warning = Style::new().yellow();
        self.error = Style::new().red();
        self.info = Style::new().blue();
        self.dim = Style::new().dimmed();
        self.bold = Style::new().bold();
        self.header = Style::new().bold().cyan();
        self.allocation = Style::new().bold().magenta();
        self.shared_profile = Style::new().cyan();
        self.isolated_user = Style::new().yellow();
    }

    /// Label colour for a deployment variant.
    #[must_use]
    pub fn variant(&self, variant: Variant) -> Style {
        match variant {
            Variant::SharedProfile => self.shared_profile,
            Variant::IsolatedUser => self.isolated_user,
        }
    }
}
