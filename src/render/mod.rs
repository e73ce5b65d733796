//! QG-010: Renderers: compiled plan in, source text out.
//!
//! The core never inspects rendered text. A renderer is chosen per
//! generator instance and asked for one template per schema.

pub mod json;
pub mod rust;

use crate::core::types::CompiledPlan;
use std::path::Path;
use thiserror::Error;

/// Built-in templates and the extension of the files they produce.
pub const TEMPLATES: &[(&str, &str)] = &[("multi_query", "rs"), ("plan_json", "json")];

/// Crate path rendered code uses to reach the runtime.
pub const DEFAULT_CRATE_PATH: &str = "querygen";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    #[error("cannot serialize plan: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("template '{template}' cannot render '{plan}': {reason}")]
    Unsupported {
        template: String,
        plan: String,
        reason: String,
    },
}

/// Turns a compiled plan into the text of one artifact.
pub trait Renderer: Send + Sync {
    fn render(
        &self,
        template: &str,
        plan: &CompiledPlan,
        output_path: &Path,
    ) -> Result<String, RenderError>;

    fn file_extension(&self, template: &str) -> Result<String, RenderError>;
}

/// The templates shipped with querygen.
#[derive(Debug, Clone)]
pub struct BuiltinRenderer {
    /// Type the generated impl block targets
    pub receiver: String,
    pub crate_path: String,
}

impl BuiltinRenderer {
    pub fn new(receiver: impl Into<String>) -> Self {
        Self {
            receiver: receiver.into(),
            crate_path: DEFAULT_CRATE_PATH.to_string(),
        }
    }
}

impl Renderer for BuiltinRenderer {
    fn render(
        &self,
        template: &str,
        plan: &CompiledPlan,
        output_path: &Path,
    ) -> Result<String, RenderError> {
        match template {
            "multi_query" => rust::render(plan, &self.receiver, &self.crate_path, output_path),
            "plan_json" => json::render(plan),
            other => Err(RenderError::UnknownTemplate(other.to_string())),
        }
    }

    fn file_extension(&self, template: &str) -> Result<String, RenderError> {
        TEMPLATES
            .iter()
            .find(|(name, _)| *name == template)
            .map(|(_, ext)| ext.to_string())
            .ok_or_else(|| RenderError::UnknownTemplate(template.to_string()))
    }
}
