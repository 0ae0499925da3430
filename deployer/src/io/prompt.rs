//! Prompt rendering for repair and generation.
//!
//! Rule text lives in `prompts/*.md`, embedded at compile time. Templates are
//! registered under extension-less names so minijinja never HTML-escapes the
//! XML documents interpolated into them.

use anyhow::Result;
use minijinja::{Environment, context};

const IDENTITY_TEMPLATE: &str = include_str!("prompts/identity.md");
const SCREEN_TEMPLATE: &str = include_str!("prompts/screen.md");
const AUTOLAUNCHED_TEMPLATE: &str = include_str!("prompts/autolaunched.md");
const RECORD_TRIGGERED_TEMPLATE: &str = include_str!("prompts/record_triggered.md");
const SCHEDULED_TEMPLATE: &str = include_str!("prompts/scheduled.md");
const GENERIC_TEMPLATE: &str = include_str!("prompts/generic.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");

/// Inputs for one repair prompt.
#[derive(Debug, Clone)]
pub struct RepairPrompt<'a> {
    /// Human label for the flow kind (`Screen`, `Record-Triggered`, ...).
    pub flow_label: &'a str,
    /// Name of the registered rule template for this flow kind.
    pub rules_template: &'a str,
    pub document: &'a str,
    pub errors: &'a [String],
    /// `XML_STRUCTURE` or `SALESFORCE_DEPLOYMENT`.
    pub phase: &'a str,
    pub attempt: u32,
}

/// Inputs for a first-draft generation prompt.
#[derive(Debug, Clone)]
pub struct GeneratePrompt<'a> {
    pub flow_type: &'a str,
    pub requirement: &'a str,
    pub flow_name: &'a str,
    pub patterns: Option<&'a str>,
    pub api_version: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        for (name, source) in [
            ("identity", IDENTITY_TEMPLATE),
            ("screen", SCREEN_TEMPLATE),
            ("autolaunched", AUTOLAUNCHED_TEMPLATE),
            ("record_triggered", RECORD_TRIGGERED_TEMPLATE),
            ("scheduled", SCHEDULED_TEMPLATE),
            ("generic", GENERIC_TEMPLATE),
            ("repair", REPAIR_TEMPLATE),
            ("generate", GENERATE_TEMPLATE),
        ] {
            env.add_template(name, source)
                .expect("embedded prompt template should be valid");
        }
        Self { env }
    }

    pub fn render_repair(&self, input: &RepairPrompt<'_>) -> Result<String> {
        let template = self.env.get_template("repair")?;
        let rendered = template.render(context! {
            flow_label => input.flow_label,
            rules_template => input.rules_template,
            document => input.document.trim(),
            errors => input.errors,
            phase => input.phase,
            attempt => input.attempt,
        })?;
        Ok(rendered)
    }

    pub fn render_generate(&self, input: &GeneratePrompt<'_>) -> Result<String> {
        let template = self.env.get_template("generate")?;
        let rendered = template.render(context! {
            flow_type => input.flow_type,
            requirement => input.requirement.trim(),
            flow_name => input.flow_name,
            patterns => input.patterns.map(str::trim).filter(|s| !s.is_empty()),
            api_version => input.api_version,
        })?;
        Ok(rendered)
    }
}
