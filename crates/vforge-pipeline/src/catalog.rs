//! Template catalog loaded from a directory of JSON files.
//!
//! One file per template. A malformed file is skipped with a warning so a
//! bad edit never takes the whole catalog down. When two files carry the
//! same `template_id`, the higher version shadows the lower.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use vforge_models::{Template, TemplateId};

use crate::error::{PipelineError, PipelineResult};

/// In-memory template catalog, immutable after load.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    /// Load every `*.json` template under `dir`.
    ///
    /// A missing directory is a configuration error; an empty one is
    /// allowed but means every request will fail to match.
    pub async fn load(dir: &Path) -> PipelineResult<Self> {
        if !dir.is_dir() {
            return Err(PipelineError::Catalog(format!(
                "template directory {} does not exist",
                dir.display()
            )));
        }

        let mut parsed = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let body = tokio::fs::read_to_string(&path).await?;
            match serde_json::from_str::<Template>(&body) {
                Ok(template) => parsed.push(template),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping malformed template file");
                }
            }
        }

        let catalog = Self::from_templates(parsed);
        if catalog.is_empty() {
            warn!(dir = %dir.display(), "template catalog is empty; no request can match");
        } else {
            info!(dir = %dir.display(), count = catalog.len(), "template catalog loaded");
        }
        Ok(catalog)
    }

    /// Build a catalog from already-parsed templates.
    pub fn from_templates(templates: Vec<Template>) -> Self {
        let mut newest: HashMap<String, Template> = HashMap::new();
        for template in templates {
            let id = template.template_id.as_str().to_string();
            match newest.get(&id) {
                Some(kept) if version_key(&kept.version) >= version_key(&template.version) => {
                    warn!(
                        template_id = %id,
                        shadowed = %template.version,
                        kept = %kept.version,
                        "duplicate template id, keeping higher version"
                    );
                }
                _ => {
                    newest.insert(id, template);
                }
            }
        }

        let mut templates: Vec<Template> = newest.into_values().collect();
        templates.sort_by(|a, b| a.template_id.as_str().cmp(b.template_id.as_str()));
        Self { templates }
    }

    pub fn get(&self, id: &TemplateId) -> Option<&Template> {
        self.templates.iter().find(|t| &t.template_id == id)
    }

    pub fn all(&self) -> &[Template] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Numeric sort key for a dotted version string ("1.10.0" > "1.9.0").
fn version_key(version: &str) -> Vec<u32> {
    version
        .split('.')
        .map(|part| part.trim().parse().unwrap_or(0))
        .collect()
}
