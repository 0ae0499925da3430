//! Language model boundary.
//!
//! [`Model`] decouples repair and generation from the HTTP client. Tests use
//! scripted models that return predetermined completions.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::io::config::ModelConfig;

pub trait Model {
    /// Send one prompt and return the completion text.
    fn complete(&self, prompt: &str) -> Result<String>;

    /// Whether the model is configured at all.
    fn is_available(&self) -> bool {
        true
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

impl<M: Model + ?Sized> Model for &M {
    fn complete(&self, prompt: &str) -> Result<String> {
        (**self).complete(prompt)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

/// Client for an OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletionsModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionsModel {
    pub fn new(cfg: &ModelConfig, api_key: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: cfg.name.clone(),
        })
    }
}

impl Model for ChatCompletionsModel {
    #[instrument(skip_all, fields(model = %self.model, prompt_chars = prompt.len()))]
    fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .with_context(|| format!("POST {url}"))?
            .error_for_status()
            .context("model request rejected")?;
        let parsed: ChatResponse = response.json().context("parse model response")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("model response had no content"))?;
        debug!(chars = content.len(), "model completion received");
        Ok(content)
    }
}

/// Stand-in used when no API key is configured.
pub struct UnavailableModel;

impl Model for UnavailableModel {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("no model configured (set GEMINI_API_KEY)"))
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Build the configured model, or [`UnavailableModel`] without an API key.
pub fn build_model(cfg: &ModelConfig) -> Result<Box<dyn Model>> {
    match cfg.api_key.as_deref().map(str::trim).filter(|key| !key.is_empty()) {
        Some(key) => Ok(Box::new(ChatCompletionsModel::new(cfg, key)?)),
        None => Ok(Box::new(UnavailableModel)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_builds_unavailable_model() {
        let model = build_model(&ModelConfig::default()).expect("build");
        assert!(!model.is_available());
        assert!(model.complete("hi").is_err());
    }

    #[test]
    fn configured_key_builds_available_model() {
        let cfg = ModelConfig {
            api_key: Some("key".to_string()),
            ..ModelConfig::default()
        };
        let model = build_model(&cfg).expect("build");
        assert!(model.is_available());
    }

    #[test]
    fn parses_chat_response_shape() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"<Flow/>"}}]}"#,
        )
        .expect("parse");
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("<Flow/>"));
    }
}
