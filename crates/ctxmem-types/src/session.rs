use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, SessionId, SpaceId, TaskId};

/// Conversation thread. May be linked to at most one space (once set,
/// immutable). Owns an ordered list of tasks and a planning task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub space_id: Option<SpaceId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "success" => Some(TaskStatus::Success),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    /// Status transition rules from spec.md §4.G: `success` -> anything is
    /// rejected; everything else (including `failed` -> `running`) is
    /// permitted.
    pub fn can_transition_to(&self, _next: TaskStatus) -> bool {
        !matches!(self, TaskStatus::Success)
    }
}

/// Structured task payload, carried as `task.data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskData {
    #[serde(default)]
    pub task_description: String,
    #[serde(default)]
    pub progresses: Vec<String>,
    #[serde(default)]
    pub user_preferences: Vec<String>,
    #[serde(default)]
    pub sop_thinking: Option<String>,
}

/// Ordered unit of work within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub session_id: SessionId,
    pub order: i64,
    pub status: TaskStatus,
    pub is_planning: bool,
    pub space_digested: bool,
    pub data: TaskData,
    pub raw_message_ids: Vec<MessageId>,
}

impl Task {
    /// Rendered form used in prompt packing sections, e.g.
    /// `"task 3 [running]: fix the login bug"`.
    pub fn to_prompt_line(&self) -> String {
        format!(
            "task {} [{}]: {}",
            self.order,
            self.status.as_str(),
            self.data.task_description
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_rejects_any_transition() {
        assert!(!TaskStatus::Success.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Success.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn failed_can_resume_to_running() {
        assert!(TaskStatus::Failed.can_transition_to(TaskStatus::Running));
    }

    #[test]
    fn pending_to_running_allowed() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
    }
}
