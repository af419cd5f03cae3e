//! The four LLM-driven agents that turn raw session messages into a
//! searchable knowledge space, plus the shared DB handle they all take.

mod experience_search;
mod handle;
mod retrieval;
mod sop_abstraction;
mod space_construction;
mod task_extraction;

pub use experience_search::{search_agentic, search_fast, ExperienceSearchCtx};
pub use handle::DbHandle;
pub use retrieval::{search_blocks, search_content_blocks, search_path_blocks};
pub use sop_abstraction::{run as run_sop_abstraction, SopAbstractionCtx, SopPromptCustomization};
pub use space_construction::{run as run_space_construction, SpaceConstructionCtx};
pub use task_extraction::{run as run_task_extraction, TaskExtractionCtx};
