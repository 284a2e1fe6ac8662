// Prompt template resolution with cascading lookup
//
// Resolution order:
// 1. Data dir ({data_dir}/.blueprint/templates/) - deployment overrides
// 2. Global (~/.blueprint/templates/) - user's global templates
// 3. Builtin - compiled-in default prompts

use crate::prompts::builtin;
use anyhow::{anyhow, Result};
use log::{debug, info};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a template was resolved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    /// Template under {data_dir}/.blueprint/templates/
    DataDir,
    /// Template under ~/.blueprint/templates/
    Global,
    /// Compiled-in default
    Builtin,
}

/// Resolved template info
#[derive(Debug, Clone)]
pub struct ResolvedPrompt {
    pub name: String,
    pub content: String,
    pub source: PromptSource,
    /// Path to the template file (if file-based)
    pub path: Option<PathBuf>,
}

/// Template resolver with cascading lookup. The orchestrator treats prompt
/// content as opaque; swapping a `.tera` file into an override directory
/// changes what the model is asked without touching code.
pub struct PromptResolver {
    data_dir: Option<PathBuf>,
    cache: HashMap<String, ResolvedPrompt>,
    use_cache: bool,
}

impl PromptResolver {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            cache: HashMap::new(),
            use_cache: true,
        }
    }

    /// Set the data dir for deployment-level template overrides
    pub fn with_data_dir(mut self, path: &Path) -> Self {
        self.data_dir = Some(path.to_path_buf());
        self
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.use_cache = enabled;
        self
    }

    /// Resolve a template by name: data dir → global → builtin
    pub fn resolve(&mut self, name: &str) -> Result<ResolvedPrompt> {
        debug!("Resolving prompt template: {}", name);

        if self.use_cache {
            if let Some(cached) = self.cache.get(name) {
                debug!(
                    "Template '{}' resolved from cache (source: {:?})",
                    name, cached.source
                );
                return Ok(cached.clone());
            }
        }

        if let Some(template) = self.try_file_template(
            name,
            self.data_dir_templates(),
            PromptSource::DataDir,
        )? {
            info!("Template '{}' resolved from data dir: {:?}", name, template.path);
            return Ok(self.remember(template));
        }

        if let Some(template) =
            self.try_file_template(name, self.global_templates(), PromptSource::Global)?
        {
            info!("Template '{}' resolved from global dir: {:?}", name, template.path);
            return Ok(self.remember(template));
        }

        if let Some(content) = builtin::get_builtin_template(name) {
            debug!("Template '{}' resolved from builtins", name);
            let template = ResolvedPrompt {
                name: name.to_string(),
                content: content.to_string(),
                source: PromptSource::Builtin,
                path: None,
            };
            return Ok(self.remember(template));
        }

        Err(anyhow!("Prompt template '{}' not found in any location", name))
    }

    /// Check if a template exists in any location
    pub fn exists(&self, name: &str) -> bool {
        let in_dir = |dir: Option<PathBuf>| {
            dir.map(|d| d.join(format!("{}.tera", name)).exists())
                .unwrap_or(false)
        };
        in_dir(self.data_dir_templates())
            || in_dir(self.global_templates())
            || builtin::get_builtin_template(name).is_some()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// All available templates in resolution-priority order, deduplicated
    pub fn list_all(&self) -> Vec<(String, PromptSource)> {
        let mut templates = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (dir, source) in [
            (self.data_dir_templates(), PromptSource::DataDir),
            (self.global_templates(), PromptSource::Global),
        ] {
            let Some(dir) = dir else { continue };
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map_or(false, |e| e == "tera") {
                    if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                        if seen.insert(name.to_string()) {
                            templates.push((name.to_string(), source.clone()));
                        }
                    }
                }
            }
        }

        for name in builtin::list_builtin_templates() {
            if seen.insert(name.to_string()) {
                templates.push((name.to_string(), PromptSource::Builtin));
            }
        }

        templates
    }

    fn remember(&mut self, template: ResolvedPrompt) -> ResolvedPrompt {
        if self.use_cache {
            self.cache.insert(template.name.clone(), template.clone());
        }
        template
    }

    fn data_dir_templates(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|p| p.join(".blueprint").join("templates"))
    }

    fn global_templates(&self) -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".blueprint").join("templates"))
    }

    fn try_file_template(
        &self,
        name: &str,
        dir: Option<PathBuf>,
        source: PromptSource,
    ) -> Result<Option<ResolvedPrompt>> {
        if let Some(dir) = dir {
            let path = dir.join(format!("{}.tera", name));
            if path.exists() {
                debug!("Found template at {:?}", path);
                let content = fs::read_to_string(&path)?;
                return Ok(Some(ResolvedPrompt {
                    name: name.to_string(),
                    content,
                    source,
                    path: Some(path),
                }));
            }
        }
        Ok(None)
    }
}

impl Default for PromptResolver {
    fn default() -> Self {
        Self::new()
    }
}
