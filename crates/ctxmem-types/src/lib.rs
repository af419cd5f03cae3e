pub mod block;
pub mod bus;
pub mod config;
pub mod error;
pub mod ids;
pub mod llm;
pub mod message;
pub mod project;
pub mod session;
pub mod sop;
pub mod tool;

pub use block::{
    Block, BlockEmbedding, BlockType, EmbeddingPhase, ExperienceSearchResult, SearchResultBlockItem,
    CONTENT_BLOCK_TYPES, PATH_BLOCK_TYPES,
};
pub use bus::{exchanges, routing_keys, BusPayload, InsertNewMessage, NewTaskComplete, SopComplete};
pub use config::{CoreConfig, ProjectConfig};
pub use error::{Error, ErrorKind, Result};
pub use ids::{BlockId, MessageId, ProjectId, SessionId, SpaceId, TaskId, ToolReferenceId};
pub use llm::{AssistantMessage, ChatMessage};
pub use message::{Message, MessageRole};
pub use project::{Project, ToolReference, ToolRename};
pub use session::{Session, Task, TaskData, TaskStatus};
pub use sop::{SopData, ToolSopEntry};
pub use tool::{ToolCall, ToolCallFunction, ToolResponse, ToolSchema};
