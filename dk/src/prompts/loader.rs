//! Prompt Loader
//!
//! Loads prompt templates from override directories or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::{debug, info};

use super::embedded;

/// Context for rendering the decomposition prompt
#[derive(Debug, Clone, Serialize)]
pub struct DecomposeContext {
    /// Normalized document text
    pub document: String,
    /// True when the normalizer cut the document to its character budget
    pub truncated: bool,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// Override directories, searched in order
    override_dirs: Vec<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `configured` (if any), then `<root>/.docket/prompts`
    pub fn new(root: impl AsRef<Path>, configured: Option<&Path>) -> Self {
        let root = root.as_ref();
        debug!(?root, ?configured, "PromptLoader::new: called");

        let candidates = configured
            .map(Path::to_path_buf)
            .into_iter()
            .chain(std::iter::once(root.join(".docket").join("prompts")));
        let override_dirs: Vec<PathBuf> = candidates.filter(|dir| dir.is_dir()).collect();
        debug!(?override_dirs, "PromptLoader::new: override directories");

        Self {
            hbs: Self::engine(),
            override_dirs,
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        Self {
            hbs: Self::engine(),
            override_dirs: Vec::new(),
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Document text goes to the model verbatim, not HTML-escaped
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in &self.override_dirs {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found override");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt override {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: using embedded");
            return Ok(content.to_string());
        }

        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        let template = self.load_template(template_name)?;
        info!("Rendering template '{}'", template_name);

        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }

    /// System prompt and user prompt for one extraction call
    pub fn decompose(&self, context: &DecomposeContext) -> Result<(String, String)> {
        debug!(document_len = context.document.len(), truncated = context.truncated, "PromptLoader::decompose: called");
        let system = self.render("decompose-system", context)?;
        let user = self.render("decompose-user", context)?;
        Ok((system.trim().to_string(), user))
    }
}
