//! Conversation state replayed to the model on every iteration.

use crate::tools::Arguments;

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Correlation id, unique within one request turn.
    pub id: String,
    pub name: String,
    pub arguments: Arguments,
}

/// The text result of one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallResult {
    /// Id of the request this answers.
    pub id: String,
    pub text: String,
}

/// One entry in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    UserText(String),
    ModelText(String),
    ModelToolRequests(Vec<ToolCallRequest>),
    ToolResults(Vec<ToolCallResult>),
}

/// Append-only sequence of turns owned by a single query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    /// Start a conversation with the user's query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::UserText(query.into())],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Find the request a result answers, searching the most recent request
    /// turn at or before `turn_index`.
    pub fn request_for(&self, turn_index: usize, id: &str) -> Option<&ToolCallRequest> {
        let end = turn_index.saturating_add(1).min(self.turns.len());
        self.turns[..end]
            .iter()
            .rev()
            .find_map(|turn| match turn {
                Turn::ModelToolRequests(requests) => Some(requests),
                _ => None,
            })
            .and_then(|requests| requests.iter().find(|r| r.id == id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str, name: &str) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments: Arguments::new(),
        }
    }

    #[test]
    fn starts_with_user_text() {
        let state = ConversationState::new("weather in Oslo?");
        assert_eq!(state.turns(), &[Turn::UserText("weather in Oslo?".into())]);
    }

    #[test]
    fn request_for_uses_latest_request_turn() {
        let mut state = ConversationState::new("q");
        state.push(Turn::ModelToolRequests(vec![request("1", "get_forecast")]));
        state.push(Turn::ToolResults(vec![ToolCallResult {
            id: "1".into(),
            text: "ok".into(),
        }]));
        state.push(Turn::ModelToolRequests(vec![request("1", "get_current_weather")]));
        state.push(Turn::ToolResults(vec![ToolCallResult {
            id: "1".into(),
            text: "ok".into(),
        }]));

        assert_eq!(state.request_for(2, "1").unwrap().name, "get_forecast");
        assert_eq!(state.request_for(4, "1").unwrap().name, "get_current_weather");
        assert!(state.request_for(4, "missing").is_none());
        assert!(state.request_for(0, "1").is_none());
    }
}
