//! Process-wide state shared by every HTTP handler and bus consumer.

use std::sync::Arc;

use ctxmem_agents::DbHandle;
use ctxmem_bus::Bus;
use ctxmem_llm::{EmbeddingClient, LlmClient};
use ctxmem_types::{CoreConfig, ProjectConfig};

/// No table persists `ProjectConfig` anywhere in the corpus this was built
/// against; it is sourced once at startup and shared process-wide rather
/// than looked up per request.
#[derive(Clone)]
pub struct AppState {
    pub db: DbHandle,
    pub llm: Arc<dyn LlmClient>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub bus: Arc<Bus>,
    pub config: Arc<CoreConfig>,
    pub project_config: Arc<ProjectConfig>,
}
