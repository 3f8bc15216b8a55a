//! The prompt builder: loads and caches templates from
//! `TEMPLATE_BASE_PATH/TEMPLATE_VERSION`, renders them against a
//! `PromptContext`, and estimates whether the result fits the configured
//! token budget.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use handlebars::Handlebars;
use tracing::debug;
use vmv_core::Error;

use crate::context::PromptContext;
use crate::helpers::register_helpers;

const DEFAULT_BUDGET_TOKENS: u32 = 16000;
const CHARS_PER_TOKEN: usize = 4;

/// Loads, caches, and renders handlebars prompt templates.
pub struct PromptBuilder {
    base_path: PathBuf,
    version: String,
    engine: Handlebars<'static>,
    cache: RwLock<HashMap<String, String>>,
}

impl PromptBuilder {
    /// Build a `PromptBuilder` rooted at `base_path/version`.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        let mut engine = Handlebars::new();
        register_helpers(&mut engine);
        Self {
            base_path: base_path.into(),
            version: version.into(),
            engine,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn template_path(&self, name: &str) -> PathBuf {
        self.base_path.join(&self.version).join(format!("{name}.hbs"))
    }

    fn load_source(&self, name: &str) -> Result<String, Error> {
        if let Some(cached) = self.cache.read().unwrap().get(name) {
            return Ok(cached.clone());
        }
        let path = self.template_path(name);
        let source = std::fs::read_to_string(&path).map_err(|e| {
            Error::template(format!("failed to read template {}: {e}", path.display()))
                .with_component("prompt_builder")
                .with_operation("load_source")
        })?;
        self.cache.write().unwrap().insert(name.to_string(), source.clone());
        debug!(template = name, path = %path.display(), "loaded prompt template");
        Ok(source)
    }

    /// Render `name` against `context`, returning the rendered text.
    pub fn render(&self, name: &str, context: &PromptContext) -> Result<String, Error> {
        let source = self.load_source(name)?;
        let data = context
            .flatten()
            .map_err(|e| Error::template(format!("failed to flatten context: {e}")))?;
        self.engine.render_template(&source, &data).map_err(|e| {
            Error::template(format!("failed to render template {name}: {e}"))
                .with_component("prompt_builder")
                .with_operation("render")
        })
    }

    /// Estimate the rendered prompt's token count (`len(text) / 4`) and
    /// report whether it fits within `budget_tokens` (default 16000,
    /// `BUDGET_TOKENS`).
    #[must_use]
    pub fn fits_budget(text: &str, budget_tokens: Option<u32>) -> bool {
        let budget = budget_tokens.unwrap_or(DEFAULT_BUDGET_TOKENS) as usize;
        estimate_tokens(text) <= budget
    }
}

/// Estimate a token count from character length, used as a fallback
/// estimator when the vendor does not report reasoning token usage.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / CHARS_PER_TOKEN
}

/// Load templates from a directory on disk, used in tests instead of the
/// packaged `src/templates` tree.
pub fn builder_for_dir(dir: &Path) -> PromptBuilder {
    PromptBuilder::new(dir, "")
}
