//! Agent module - the tool-calling dispatch loop.
//!
//! The agent follows a "tools in a loop" pattern:
//! 1. Start a conversation from the user's query
//! 2. Call the model backend with the prepared tool declarations
//! 3. If the model requests tool calls, execute them in order and feed results back
//! 4. Repeat until the model answers, the backend fails, or the budget runs out

mod agent_loop;
mod conversation;

pub use agent_loop::{DispatchOutcome, Dispatcher, QueryRun, MAX_ITERATIONS};
pub use conversation::{ConversationState, ToolCallRequest, ToolCallResult, Turn};
