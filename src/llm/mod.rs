//! Model backends.
//!
//! Every provider implements [`ModelBackend`]; the agent loop is written once
//! against the trait. Tool declarations are prepared up front with
//! [`adapter::to_provider_format`] in the backend's [`ToolFormat`].

pub mod adapter;
mod anthropic;
mod gemini;
mod openrouter;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::agent::{ConversationState, ToolCallRequest};
use crate::config::{BackendConfig, BackendKind};
use crate::tools::{arguments_from_json, Arguments};

pub use adapter::{to_provider_format, ProviderToolSpec};
pub use anthropic::AnthropicBackend;
pub use gemini::GeminiBackend;
pub use openrouter::OpenRouterBackend;

/// Tool declaration shape a backend expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolFormat {
    Anthropic,
    Gemini,
    OpenAi,
}

/// What the model wants to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStep {
    /// The model is done and answered with this text.
    Final(String),
    /// The model wants these tools run, optionally with accompanying text.
    ToolCalls {
        text: Option<String>,
        requests: Vec<ToolCallRequest>,
    },
}

/// Failures talking to a model backend. Fatal to the current query.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (HTTP {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Unexpected stop reason: {0}")]
    UnexpectedStop(String),

    #[error("Received empty response")]
    EmptyResponse,

    #[error("Tool declarations prepared for {actual:?}, backend expects {expected:?}")]
    ToolFormatMismatch {
        expected: ToolFormat,
        actual: ToolFormat,
    },
}

/// A language model that can request tool calls.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Declaration shape this backend consumes.
    fn tool_format(&self) -> ToolFormat;

    /// Submit the whole conversation and get the model's next step.
    async fn next_step(
        &self,
        conversation: &ConversationState,
        tools: &ProviderToolSpec,
    ) -> Result<ModelStep, BackendError>;
}

/// Build the backend selected in configuration.
pub fn create_backend(config: &BackendConfig) -> Result<Box<dyn ModelBackend>, BackendError> {
    let model = config.model.as_deref();
    let base_url = config.base_url.as_deref();
    Ok(match config.kind {
        BackendKind::Gemini => Box::new(GeminiBackend::new(&config.api_key, model, base_url)?),
        BackendKind::Anthropic => {
            Box::new(AnthropicBackend::new(&config.api_key, model, base_url)?)
        }
        BackendKind::OpenRouter => {
            Box::new(OpenRouterBackend::new(&config.api_key, model, base_url)?)
        }
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared helpers for backend implementations
// ─────────────────────────────────────────────────────────────────────────────

/// Upper bound on one model round-trip, including reading the body.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

fn http_client() -> Result<reqwest::Client, BackendError> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn check_format(expected: ToolFormat, tools: &ProviderToolSpec) -> Result<(), BackendError> {
    if tools.format() == expected {
        Ok(())
    } else {
        Err(BackendError::ToolFormatMismatch {
            expected,
            actual: tools.format(),
        })
    }
}

/// Send a request and return the JSON body of a successful response.
async fn send_json(request: reqwest::RequestBuilder) -> Result<Value, BackendError> {
    let response = request.send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(BackendError::Api { status, body });
    }

    response
        .json()
        .await
        .map_err(|e| BackendError::Malformed(e.to_string()))
}

fn parse_arguments(tool: &str, value: Value) -> Result<Arguments, BackendError> {
    arguments_from_json(value)
        .map_err(|e| BackendError::Malformed(format!("arguments for '{}': {}", tool, e)))
}

/// Provider messages keyed by role, merging consecutive turns that map to
/// the same role into one message.
#[derive(Debug, Default)]
struct RoleGroups {
    groups: Vec<(&'static str, Vec<Value>)>,
}

impl RoleGroups {
    fn push(&mut self, role: &'static str, parts: Vec<Value>) {
        match self.groups.last_mut() {
            Some((last_role, last_parts)) if *last_role == role => last_parts.extend(parts),
            _ => self.groups.push((role, parts)),
        }
    }

    fn into_messages(self, content_key: &str) -> Vec<Value> {
        self.groups
            .into_iter()
            .map(|(role, parts)| {
                let mut message = serde_json::Map::new();
                message.insert("role".to_string(), Value::from(role));
                message.insert(content_key.to_string(), Value::Array(parts));
                Value::Object(message)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_groups_merge_consecutive_roles() {
        let mut groups = RoleGroups::default();
        groups.push("user", vec![json!({"text": "hi"})]);
        groups.push("model", vec![json!({"text": "let me check"})]);
        groups.push("model", vec![json!({"functionCall": {"name": "x"}})]);
        groups.push("user", vec![json!({"functionResponse": {}})]);

        let messages = groups.into_messages("parts");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["role"], "model");
        assert_eq!(messages[1]["parts"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn format_mismatch_is_reported() {
        let spec = to_provider_format(ToolFormat::Gemini, &[]);
        assert!(check_format(ToolFormat::Gemini, &spec).is_ok());
        let err = check_format(ToolFormat::Anthropic, &spec).unwrap_err();
        assert!(matches!(
            err,
            BackendError::ToolFormatMismatch {
                expected: ToolFormat::Anthropic,
                actual: ToolFormat::Gemini
            }
        ));
    }

    #[test]
    fn factory_selects_backend() {
        let config = BackendConfig {
            kind: BackendKind::Anthropic,
            api_key: "k".into(),
            model: None,
            base_url: None,
        };
        let backend = create_backend(&config).unwrap();
        assert_eq!(backend.name(), "Anthropic Claude");
        assert_eq!(backend.tool_format(), ToolFormat::Anthropic);

        let backend = create_backend(&BackendConfig {
            kind: BackendKind::Gemini,
            ..config.clone()
        })
        .unwrap();
        assert_eq!(backend.tool_format(), ToolFormat::Gemini);

        let backend = create_backend(&BackendConfig {
            kind: BackendKind::OpenRouter,
            ..config
        })
        .unwrap();
        assert_eq!(backend.tool_format(), ToolFormat::OpenAi);
    }

    #[test]
    fn malformed_arguments_name_the_tool() {
        let err = parse_arguments("get_forecast", json!([1])).unwrap_err();
        assert!(err.to_string().contains("get_forecast"));
    }
}
