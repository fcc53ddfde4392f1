//! OpenRouter backend (OpenAI-compatible chat completions).

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::{
    check_format, http_client, parse_arguments, send_json, BackendError, ModelBackend, ModelStep,
    ProviderToolSpec, ToolFormat,
};
use crate::agent::{ConversationState, ToolCallRequest, Turn};
use crate::tools::arguments_to_json;

const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4.5";
const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter chat-completions backend.
pub struct OpenRouterBackend {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenRouterBackend {
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
        let mut messages: Vec<Value> = Vec::new();

        for turn in conversation.turns() {
            match turn {
                Turn::UserText(text) => messages.push(json!({"role": "user", "content": text})),
                Turn::ModelText(text) => {
                    messages.push(json!({"role": "assistant", "content": text}))
                }
                Turn::ModelToolRequests(requests) => {
                    let calls: Vec<Value> = requests
                        .iter()
                        .map(|r| {
                            json!({
                                "id": r.id,
                                "type": "function",
                                "function": {
                                    "name": r.name,
                                    "arguments": arguments_to_json(&r.arguments).to_string(),
                                }
                            })
                        })
                        .collect();

                    // Text and tool calls from one model response share a message.
                    match messages.last_mut() {
                        Some(last)
                            if last["role"] == "assistant" && last.get("tool_calls").is_none() =>
                        {
                            last["tool_calls"] = Value::Array(calls);
                        }
                        _ => messages.push(json!({
                            "role": "assistant",
                            "content": Value::Null,
                            "tool_calls": calls,
                        })),
                    }
                }
                Turn::ToolResults(results) => {
                    messages.extend(results.iter().map(|r| {
                        json!({
                            "role": "tool",
                            "tool_call_id": r.id,
                            "content": r.text,
                        })
                    }));
                }
            }
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });

        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.declarations().to_vec());
        }

        body
    }
}

/// Interpret a chat-completions response body.
fn parse_response(parsed: &Value) -> Result<ModelStep, BackendError> {
    let message = parsed
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .ok_or_else(|| BackendError::Malformed("missing choices[0].message".to_string()))?;

    let text = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut requests = Vec::new();
    for call in message
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let id = call
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Malformed("tool call without id".to_string()))?;
        let function = call
            .get("function")
            .ok_or_else(|| BackendError::Malformed("tool call without function".to_string()))?;
        let name = function
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::Malformed("tool call without name".to_string()))?;

        requests.push(ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: parse_arguments(name, function.get("arguments").cloned().unwrap_or_default())?,
        });
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
impl ModelBackend for OpenRouterBackend {
    fn name(&self) -> &str {
        "OpenRouter"
    }

    fn tool_format(&self) -> ToolFormat {
        ToolFormat::OpenAi
    }

    async fn next_step(
        &self,
        conversation: &ConversationState,
        tools: &ProviderToolSpec,
    ) -> Result<ModelStep, BackendError> {
        check_format(ToolFormat::OpenAi, tools)?;
        let body = self.build_request_body(conversation, tools);

        debug!(model = %self.model, turns = conversation.len(), "calling OpenRouter API");

        let request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body);

        let parsed = send_json(request).await?;
        parse_response(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ToolCallResult;
    use crate::llm::to_provider_format;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use crate::tools::{ArgValue, Arguments};

    #[test]
    fn tool_calls_attach_to_preceding_text() {
        let mut args = Arguments::new();
        args.insert("city".into(), ArgValue::from("Lima"));

        let mut state = ConversationState::new("Lima?");
        state.push(Turn::ModelText("Looking it up.".into()));
        state.push(Turn::ModelToolRequests(vec![ToolCallRequest {
            id: "call_1".into(),
            name: "get_current_weather".into(),
            arguments: args,
        }]));
        state.push(Turn::ToolResults(vec![ToolCallResult {
            id: "call_1".into(),
            text: "warm".into(),
        }]));

        let backend = OpenRouterBackend::new("k", None, None).unwrap();
        let body = backend.build_request_body(&state, &to_provider_format(ToolFormat::OpenAi, &[]));

        assert!(body.get("tools").is_none());
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"], "Looking it up.");
        assert_eq!(messages[1]["tool_calls"][0]["function"]["arguments"], "{\"city\":\"Lima\"}");
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["tool_call_id"], "call_1");
    }

    #[test]
    fn parses_encoded_arguments() {
        let step = parse_response(&json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": {"name": "get_weather_by_coordinates", "arguments": "{\"latitude\":35.68,\"longitude\":139.69}"}
                }]
            }}]
        }))
        .unwrap();

        match step {
            ModelStep::ToolCalls { requests, .. } => {
                assert_eq!(requests[0].id, "call_9");
                assert_eq!(requests[0].arguments["longitude"].as_f64(), Some(139.69));
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn null_optional_arguments_are_dropped() {
        let step = parse_response(&json!({
            "choices": [{"message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_2",
                    "type": "function",
                    "function": {"name": "get_current_weather", "arguments": "{\"city\":\"Paris\",\"country\":null}"}
                }]
            }}]
        }))
        .unwrap();

        match step {
            ModelStep::ToolCalls { requests, .. } => {
                assert_eq!(requests[0].arguments.len(), 1);
                assert_eq!(requests[0].arguments["city"], ArgValue::from("Paris"));
            }
            other => panic!("expected tool calls, got {other:?}"),
        }
    }

    #[test]
    fn parses_final_and_rejects_garbage() {
        let step = parse_response(&json!({"choices": [{"message": {"content": "Rainy."}}]})).unwrap();
        assert_eq!(step, ModelStep::Final("Rainy.".into()));

        assert!(matches!(
            parse_response(&json!({"choices": []})).unwrap_err(),
            BackendError::Malformed(_)
        ));
        assert!(matches!(
            parse_response(&json!({"choices": [{"message": {"content": ""}}]})).unwrap_err(),
            BackendError::EmptyResponse
        ));
    }

    #[tokio::test]
    async fn sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer or-key"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"choices": [{"message": {"content": "hello"}}]})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let backend = OpenRouterBackend::new("or-key", None, Some(&server.uri())).unwrap();

        let step = backend
            .next_step(
                &ConversationState::new("hi"),
                &to_provider_format(ToolFormat::OpenAi, &[]),
            )
            .await
            .unwrap();
        assert_eq!(step, ModelStep::Final("hello".into()));

        let requests = server.received_requests().await.unwrap();
        let body: Value = requests[0].body_json().unwrap();
        assert_eq!(body["model"], DEFAULT_MODEL);
    }
}
