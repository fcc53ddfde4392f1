//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    check_format, http_client, parse_arguments, send_json, BackendError, ModelBackend, ModelStep,
    ProviderToolSpec, RoleGroups, ToolFormat,
};
use crate::agent::{ConversationState, ToolCallRequest, Turn};
use crate::tools::arguments_to_json;

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

/// Anthropic Claude backend.
pub struct AnthropicBackend {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(
        api_key: &str,
        model: Option<&str>,
        base_url: Option<&str>,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            client: http_client()?,
        })
    }

    fn build_request_body(&self, conversation: &ConversationState, tools: &ProviderToolSpec) -> Value {
        let mut groups = RoleGroups::default();

        for turn in conversation.turns() {
            match turn {
                Turn::UserText(text) => {
                    groups.push("user", vec![json!({"type": "text", "text": text})]);
                }
                Turn::ModelText(text) => {
                    groups.push("assistant", vec![json!({"type": "text", "text": text})]);
                }
                Turn::ModelToolRequests(requests) => {
                    let blocks = requests
                        .iter()
                        .map(|r| {
                            json!({
                                "type": "tool_use",
                                "id": r.id,
                                "name": r.name,
                                "input": arguments_to_json(&r.arguments),
                            })
                        })
                        .collect();
                    groups.push("assistant", blocks);
                }
                Turn::ToolResults(results) => {
                    let blocks = results
                        .iter()
                        .map(|r| {
                            json!({
                                "type": "tool_result",
                                "tool_use_id": r.id,
                                "content": r.text,
                            })
                        })
                        .collect();
                    groups.push("user", blocks);
                }
            }
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "messages": groups.into_messages("content"),
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.declarations().to_vec());
        }

        body
    }
}

/// Interpret a Messages API response body.
fn parse_response(parsed: &Value) -> Result<ModelStep, BackendError> {
    let blocks = parsed
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Malformed("missing 'content' array".to_string()))?;

    let mut text = String::new();
    let mut requests = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let id = block
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| BackendError::Malformed("tool_use block without id".to_string()))?;
                let name = block
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| BackendError::Malformed("tool_use block without name".to_string()))?;
                requests.push(ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: parse_arguments(name, block.get("input").cloned().unwrap_or_default())?,
                });
            }
            _ => {}
        }
    }

    let stop_reason = parsed
        .get("stop_reason")
        .and_then(Value::as_str)
        .unwrap_or_default();

    // tool_use blocks are honoured under end_turn as well.
    match stop_reason {
        "tool_use" | "end_turn" if !requests.is_empty() => Ok(ModelStep::ToolCalls {
            text: (!text.is_empty()).then_some(text),
            requests,
        }),
        "tool_use" => Err(BackendError::Malformed(
            "stop_reason tool_use without tool_use blocks".to_string(),
        )),
        "end_turn" => Ok(ModelStep::Final(text)),
        other => Err(BackendError::UnexpectedStop(other.to_string())),
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "Anthropic Claude"
    }

    fn tool_format(&self) -> ToolFormat {
        ToolFormat::Anthropic
    }

    async fn next_step(
        &self,
        conversation: &ConversationState,
        tools: &ProviderToolSpec,
    ) -> Result<ModelStep, BackendError> {
        check_format(ToolFormat::Anthropic, tools)?;
        let body = self.build_request_body(conversation, tools);

        debug!(model = %self.model, turns = conversation.len(), "calling Anthropic API");

        let request = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);

        let parsed = send_json(request).await?;
        parse_response(&parsed)
    }
}
