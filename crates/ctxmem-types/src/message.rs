use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{MessageId, SessionId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            "tool" => Some(MessageRole::Tool),
            _ => None,
        }
    }
}

/// A conversational turn. The core only consumes ids + roles + serialized
/// parts; the message body itself is persisted externally (Non-goal).
/// `session_id` is carried so a flush can find the session's unassigned
/// (`task_id IS NULL`) batch; it is not itself part of the value the core
/// reasons about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub session_id: SessionId,
    pub role: MessageRole,
    pub parts: Value,
    pub task_id: Option<TaskId>,
}

impl Message {
    /// Render a message for prompt packing, truncated to `max_chars`.
    pub fn to_prompt_string(&self, max_chars: usize) -> String {
        let body = match &self.parts {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let truncated: String = body.chars().take(max_chars).collect();
        format!("[{}] {}", self.role.as_str(), truncated)
    }
}
