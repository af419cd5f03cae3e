use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, ProjectId, SessionId, SpaceId, TaskId};
use crate::sop::SopData;

/// Marker trait for a message-bus payload schema. Implementors are plain
/// `serde`-derived structs; the framework validates the incoming JSON
/// against this schema before dispatch (spec.md §4.K).
pub trait BusPayload: serde::Serialize + serde::de::DeserializeOwned + Send + Sync + 'static {
    /// Stable name used for logging and dead-letter records.
    fn schema_name() -> &'static str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertNewMessage {
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub message_id: MessageId,
}

impl BusPayload for InsertNewMessage {
    fn schema_name() -> &'static str {
        "InsertNewMessage"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTaskComplete {
    pub project_id: ProjectId,
    pub session_id: SessionId,
    pub task_id: TaskId,
}

impl BusPayload for NewTaskComplete {
    fn schema_name() -> &'static str {
        "NewTaskComplete"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SopComplete {
    pub project_id: ProjectId,
    pub space_id: SpaceId,
    pub task_id: TaskId,
    pub sop_data: SopData,
}

impl BusPayload for SopComplete {
    fn schema_name() -> &'static str {
        "SOPComplete"
    }
}

/// Exchange/routing-key names, as fixed constants rather than magic strings
/// scattered across call sites (mirrors `original_source/service/constants.py`'s
/// `EX`/`RK` namespaces).
pub mod exchanges {
    pub const SPACE_TASK: &str = "space_task";
    pub const SPACE_SOP: &str = "space_sop";
    pub const SESSION: &str = "session";
}

pub mod routing_keys {
    pub const SPACE_TASK_COMPLETE: &str = "space_task_complete";
    pub const SOP_COMPLETE: &str = "sop_complete";
    pub const NEW_MESSAGE: &str = "new_message";
}
