//! Role prompt loading
//!
//! Role definitions are opaque strings loaded from disk once at startup
//! and cached in memory. A workspace can override any role by dropping a
//! file into `.adc/prompts/`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::agent::AgentId;

/// Loads and caches role prompts
pub struct PromptLoader {
    hbs: Handlebars<'static>,
    /// Workspace override directory (`.adc/prompts/`), if it exists
    override_dir: Option<PathBuf>,
    /// Role prompts, populated once at construction
    roles: HashMap<AgentId, String>,
}

impl PromptLoader {
    /// Create a loader for a workspace, caching every role prompt
    ///
    /// Checks `.adc/prompts/{role}.md` in the workspace first, then falls
    /// back to the embedded defaults.
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        let override_dir = workspace.as_ref().join(".adc").join("prompts");
        let override_dir = if override_dir.exists() {
            debug!(?override_dir, "PromptLoader::new: override directory found");
            Some(override_dir)
        } else {
            None
        };

        let mut loader = Self {
            hbs: Handlebars::new(),
            override_dir,
            roles: HashMap::new(),
        };
        loader.load_roles();
        loader
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        let mut loader = Self {
            hbs: Handlebars::new(),
            override_dir: None,
            roles: HashMap::new(),
        };
        loader.load_roles();
        loader
    }

    fn load_roles(&mut self) {
        for agent in AgentId::all() {
            let name = agent.role_file_stem();

            if let Some(ref dir) = self.override_dir {
                let path = dir.join(format!("{}.md", name));
                if path.exists() {
                    match std::fs::read_to_string(&path) {
                        Ok(content) => {
                            debug!(?path, "PromptLoader::load_roles: using override");
                            self.roles.insert(*agent, content);
                            continue;
                        }
                        Err(e) => {
                            tracing::warn!(?path, error = %e, "Failed to read prompt override");
                        }
                    }
                }
            }

            if let Some(content) = embedded::get_embedded(name) {
                self.roles.insert(*agent, content.to_string());
            } else {
                tracing::warn!(%name, "No embedded prompt for role");
            }
        }
    }

    /// The cached role prompt for an agent
    pub fn role(&self, agent: AgentId) -> Result<&str> {
        self.roles
            .get(&agent)
            .map(String::as_str)
            .ok_or_else(|| eyre!("Role prompt not loaded: {}", agent))
    }

    /// Render a phase-prompt template with a serializable context
    pub fn render<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.hbs
            .render_template(template, context)
            .map_err(|e| eyre!("Failed to render prompt template: {}", e))
    }
}
