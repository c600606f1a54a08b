//! Output text templating

use anyhow::{Context, Result};
use minijinja::{context, Environment};

/// Renders the configured output template around recognized text
pub struct TextFormatter {
    env: Environment<'static>,
}

impl Default for TextFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TextFormatter {
    pub fn new() -> Self {
        Self {
            env: Environment::new(),
        }
    }

    /// Render `template` with `output` bound to `text`
    pub fn format(&self, template: &str, text: &str) -> Result<String> {
        self.env
            .render_str(template, context! { output => text })
            .context("failed to render output template")
    }
}
