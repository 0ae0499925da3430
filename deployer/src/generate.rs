//! First-draft generation of a Flow document from a plain-language requirement.

use anyhow::{Result, anyhow};
use tracing::{info, instrument, warn};

use crate::core::flow_name::validate_flow_name;
use crate::core::response::clean_model_output;
use crate::io::model::Model;
use crate::io::prompt::{GeneratePrompt, PromptEngine};
use crate::io::retrieval::Retriever;

const SCREEN_KEYWORDS: [&str; 4] = ["screen", "user", "input", "display"];

/// What to generate.
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub requirement: &'a str,
    pub flow_name: &'a str,
    /// Explicit flow type label; inferred from the requirement when absent.
    pub flow_type: Option<&'a str>,
}

/// Flow type label inferred from requirement wording.
pub fn flow_type_hint(requirement: &str) -> &'static str {
    let lowered = requirement.to_lowercase();
    if SCREEN_KEYWORDS.iter().any(|keyword| lowered.contains(keyword)) {
        "Screen"
    } else {
        "AutoLaunched"
    }
}

pub struct FlowGenerator<M: Model, R: Retriever> {
    model: M,
    retriever: R,
    prompts: PromptEngine,
    api_version: String,
}

impl<M: Model, R: Retriever> FlowGenerator<M, R> {
    pub fn new(model: M, retriever: R, api_version: &str) -> Self {
        Self {
            model,
            retriever,
            prompts: PromptEngine::new(),
            api_version: api_version.to_string(),
        }
    }

    /// Generate a cleaned document. The result is not validated; run it
    /// through the deploy loop to repair and deploy it.
    #[instrument(skip_all, fields(flow = request.flow_name))]
    pub fn generate(&self, request: &GenerateRequest<'_>) -> Result<String> {
        validate_flow_name(request.flow_name)?;
        if request.requirement.trim().is_empty() {
            return Err(anyhow!("requirement must not be empty"));
        }
        if !self.model.is_available() {
            return Err(anyhow!("no model configured for generation"));
        }

        let flow_type = request
            .flow_type
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .unwrap_or_else(|| flow_type_hint(request.requirement));
        info!(flow_type, "generating flow");

        let query = format!("{flow_type} flow: {}", request.requirement.trim());
        let patterns = match self.retriever.retrieve(&query) {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "pattern retrieval failed; generating without patterns");
                String::new()
            }
        };

        let prompt = self.prompts.render_generate(&GeneratePrompt {
            flow_type,
            requirement: request.requirement,
            flow_name: request.flow_name,
            patterns: Some(patterns.as_str()),
            api_version: &self.api_version,
        })?;
        let raw = self.model.complete(&prompt)?;
        clean_model_output(&raw).ok_or_else(|| anyhow!("model returned no usable document"))
    }
}
