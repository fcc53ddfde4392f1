//! Google Gemini `generateContent` backend.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    check_format, http_client, parse_arguments, send_json, BackendError, ModelBackend, ModelStep,
    ProviderToolSpec, RoleGroups, ToolFormat,
};
use crate::agent::{ConversationState, ToolCallRequest, Turn};
use crate::tools::arguments_to_json;

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini backend.
pub struct GeminiBackend {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiBackend {
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

    /// Gemini answers function calls by name, so results are matched back to
    /// their request turn to recover the tool name.
    fn build_request_body(
        &self,
        conversation: &ConversationState,
        tools: &ProviderToolSpec,
    ) -> Result<Value, BackendError> {
        let mut groups = RoleGroups::default();

        for (index, turn) in conversation.turns().iter().enumerate() {
            match turn {
                Turn::UserText(text) => groups.push("user", vec![json!({"text": text})]),
                Turn::ModelText(text) => groups.push("model", vec![json!({"text": text})]),
                Turn::ModelToolRequests(requests) => {
                    let parts = requests
                        .iter()
                        .map(|r| {
                            json!({
                                "functionCall": {
                                    "name": r.name,
                                    "args": arguments_to_json(&r.arguments),
                                }
                            })
                        })
                        .collect();
                    groups.push("model", parts);
                }
                Turn::ToolResults(results) => {
                    let mut parts = Vec::with_capacity(results.len());
                    for result in results {
                        let request = conversation.request_for(index, &result.id).ok_or_else(|| {
                            BackendError::Malformed(format!(
                                "tool result '{}' has no matching request",
                                result.id
                            ))
                        })?;
                        parts.push(json!({
                            "functionResponse": {
                                "name": request.name,
                                "response": {"result": result.text},
                            }
                        }));
                    }
                    groups.push("user", parts);
                }
            }
        }

        let mut body = json!({ "contents": groups.into_messages("parts") });

        if !tools.is_empty() {
            body["tools"] = json!([{ "functionDeclarations": tools.declarations() }]);
        }

        Ok(body)
    }
}

/// Interpret a `generateContent` response body.
fn parse_response(parsed: &Value) -> Result<ModelStep, BackendError> {
    let parts = parsed
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .filter(|parts| !parts.is_empty())
        .ok_or(BackendError::EmptyResponse)?;

    let mut text = String::new();
    let mut requests = Vec::new();

    for part in parts {
        if let Some(t) = part.get("text").and_then(Value::as_str) {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| BackendError::Malformed("functionCall without name".to_string()))?;
            let id = call
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            requests.push(ToolCallRequest {
                id,
                name: name.to_string(),
                arguments: parse_arguments(name, call.get("args").cloned().unwrap_or_default())?,
            });
        }
    }

    if !requests.is_empty() {
        Ok(ModelStep::ToolCalls {
            text: (!text.is_empty()).then_some(text),
            requests,
        })
    } else if !text.is_empty() {
        Ok(ModelStep::Final(text))
    } else {
        Err(BackendError::EmptyResponse)
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn name(&self) -> &str {
        "Google Gemini"
    }

    fn tool_format(&self) -> ToolFormat {
        ToolFormat::Gemini
    }

    async fn next_step(
        &self,
        conversation: &ConversationState,
        tools: &ProviderToolSpec,
    ) -> Result<ModelStep, BackendError> {
        check_format(ToolFormat::Gemini, tools)?;
        let body = self.build_request_body(conversation, tools)?;

        debug!(model = %self.model, turns = conversation.len(), "calling Gemini API");

        let request = self
            .client
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body);

        let parsed = send_json(request).await?;
        parse_response(&parsed)
    }
}
