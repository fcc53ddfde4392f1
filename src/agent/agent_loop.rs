//! Core agent loop implementation.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::conversation::{ConversationState, ToolCallRequest, ToolCallResult, Turn};
use crate::llm::{ModelBackend, ModelStep, ProviderToolSpec};
use crate::tools::{ToolDescriptor, ToolSession};

/// Round-trips to the model allowed per query.
pub const MAX_ITERATIONS: usize = 10;

/// How a query ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    FinalAnswer(String),
    IterationBudgetExceeded,
    Error(String),
}

/// Everything one query produced.
#[derive(Debug, Clone)]
pub struct QueryRun {
    pub outcome: DispatchOutcome,
    pub conversation: ConversationState,
    /// Round-trips made to the model backend.
    pub model_calls: usize,
    /// Calls forwarded to the tool session.
    pub tool_calls: usize,
}

enum State {
    AwaitingModel,
    ExecutingTools(Vec<ToolCallRequest>),
    Final(String),
    Budgeted,
    Failed(String),
}

/// Drives one model backend against one tool session.
pub struct Dispatcher<'a> {
    backend: &'a dyn ModelBackend,
    session: &'a dyn ToolSession,
    tool_spec: &'a ProviderToolSpec,
    known_tools: HashSet<&'a str>,
}

impl<'a> Dispatcher<'a> {
    /// `tool_spec` must have been prepared from `tools` in the backend's format.
    pub fn new(
        backend: &'a dyn ModelBackend,
        session: &'a dyn ToolSession,
        tools: &'a [ToolDescriptor],
        tool_spec: &'a ProviderToolSpec,
    ) -> Self {
        Self {
            backend,
            session,
            tool_spec,
            known_tools: tools.iter().map(|t| t.name.as_str()).collect(),
        }
    }

    /// Run one query from a fresh conversation until the model answers, the
    /// backend fails, or the iteration budget runs out.
    pub async fn run(&self, query: &str) -> QueryRun {
        let mut conversation = ConversationState::new(query);
        let mut model_calls = 0;
        let mut tool_calls = 0;
        let mut state = State::AwaitingModel;

        let outcome = loop {
            state = match state {
                State::AwaitingModel => {
                    if model_calls >= MAX_ITERATIONS {
                        State::Budgeted
                    } else {
                        model_calls += 1;
                        debug!(
                            iteration = model_calls,
                            turns = conversation.len(),
                            backend = self.backend.name(),
                            "calling model backend"
                        );
                        self.await_model(&mut conversation).await
                    }
                }
                State::ExecutingTools(requests) => {
                    let results = self.execute_tools(&requests, &mut tool_calls).await;
                    conversation.push(Turn::ToolResults(results));
                    State::AwaitingModel
                }
                State::Final(text) => {
                    info!(model_calls, tool_calls, "query answered");
                    break DispatchOutcome::FinalAnswer(text);
                }
                State::Budgeted => {
                    warn!(model_calls, tool_calls, max = MAX_ITERATIONS, "iteration budget exhausted");
                    break DispatchOutcome::IterationBudgetExceeded;
                }
                State::Failed(reason) => {
                    warn!(model_calls, error = %reason, "query failed");
                    break DispatchOutcome::Error(reason);
                }
            };
        };

        QueryRun {
            outcome,
            conversation,
            model_calls,
            tool_calls,
        }
    }

    async fn await_model(&self, conversation: &mut ConversationState) -> State {
        match self.backend.next_step(conversation, self.tool_spec).await {
            Ok(ModelStep::Final(text)) => {
                conversation.push(Turn::ModelText(text.clone()));
                State::Final(text)
            }
            Ok(ModelStep::ToolCalls { requests, .. }) if requests.is_empty() => {
                State::Failed("model requested tools without naming any".to_string())
            }
            Ok(ModelStep::ToolCalls { text, requests }) => {
                if let Some(text) = text {
                    conversation.push(Turn::ModelText(text));
                }
                info!(tool_call_count = requests.len(), "model requested tools");
                conversation.push(Turn::ModelToolRequests(requests.clone()));
                State::ExecutingTools(requests)
            }
            Err(e) => State::Failed(e.to_string()),
        }
    }

    /// Run requests one at a time, in the order the model produced them.
    async fn execute_tools(
        &self,
        requests: &[ToolCallRequest],
        tool_calls: &mut usize,
    ) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(requests.len());

        for request in requests {
            let text = if !self.known_tools.contains(request.name.as_str()) {
                warn!(tool = %request.name, id = %request.id, "model requested unknown tool");
                format!("Unknown tool: {}", request.name)
            } else {
                info!(tool = %request.name, id = %request.id, "executing tool call");
                *tool_calls += 1;
                match self.session.call_tool(&request.name, &request.arguments).await {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(tool = %request.name, err = %e, "tool call failed");
                        format!("Error: {}", e)
                    }
                }
            };

            debug!(tool = %request.name, result_len = text.len(), "tool call completed");
            results.push(ToolCallResult {
                id: request.id.clone(),
                text,
            });
        }

        results
    }
}
