//! HTTP handlers for the seven triggers the core reacts to (spec.md §6);
//! everything else is CRUD pass-through out of scope.

use std::collections::HashSet;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use ctxmem_agents::{
    run_task_extraction, search_agentic, search_content_blocks, search_fast, search_path_blocks,
};
use ctxmem_store::queries::{block, message, project, session, task};
use ctxmem_types::{
    BlockId, BlockType, ExperienceSearchResult, ProjectId, SearchResultBlockItem, SessionId,
    SopData, SpaceId, TaskStatus, ToolRename,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/project/:pid/session/:sid/flush", post(flush))
        .route("/project/:pid/space/:space_id/semantic_glob", get(semantic_glob))
        .route("/project/:pid/space/:space_id/semantic_grep", get(semantic_grep))
        .route("/project/:pid/space/:space_id/experience_search", get(experience_search))
        .route("/project/:pid/space/:space_id/insert_block", post(insert_block))
        .route("/project/:pid/tool/rename", post(rename_tool))
        .route("/project/:pid/session/:sid/get_learning_status", get(get_learning_status))
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    errmsg: String,
}

impl StatusResponse {
    fn ok() -> Self {
        Self { status: "ok", errmsg: String::new() }
    }
}

/// Snapshots task statuses before and after `run_task_extraction`, publishes
/// `NewTaskComplete` for every task that newly transitioned to `success`
/// this flush — the event that kicks off SOP abstraction downstream.
async fn flush(
    State(state): State<AppState>,
    Path((project_id, session_id)): Path<(ProjectId, SessionId)>,
) -> Result<Json<StatusResponse>, ApiError> {
    let messages = {
        let conn = state.db.lock().await;
        message::list_unassigned(conn.conn(), session_id)?
    };
    if messages.is_empty() {
        return Ok(Json(StatusResponse::ok()));
    }

    let before: HashSet<_> = {
        let conn = state.db.lock().await;
        task::list_non_planning(conn.conn(), session_id)?
            .into_iter()
            .filter(|t| t.status == TaskStatus::Success)
            .map(|t| t.id)
            .collect()
    };

    run_task_extraction(
        state.llm.as_ref(),
        state.db.clone(),
        session_id,
        messages,
        state.config.task_agent_max_iterations,
        state.config.task_agent_previous_progress_num,
    )
    .await?;

    let after = {
        let conn = state.db.lock().await;
        task::list_non_planning(conn.conn(), session_id)?
    };

    for completed in after.into_iter().filter(|t| t.status == TaskStatus::Success && !before.contains(&t.id)) {
        let event = ctxmem_types::NewTaskComplete { project_id, session_id, task_id: completed.id };
        state.bus.publish(
            ctxmem_types::exchanges::SPACE_TASK,
            ctxmem_types::routing_keys::SPACE_TASK_COMPLETE,
            &event,
        )?;
    }

    Ok(Json(StatusResponse::ok()))
}

#[derive(Deserialize)]
struct SearchQuery {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    threshold: Option<f32>,
}

fn default_limit() -> usize {
    10
}

const FETCH_RATIO: f32 = 3.0;

async fn semantic_glob(
    State(state): State<AppState>,
    Path((_pid, space_id)): Path<(ProjectId, SpaceId)>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResultBlockItem>>, ApiError> {
    let threshold = q.threshold.unwrap_or(state.config.default_search_threshold);
    let results = search_path_blocks(&state.db, state.embedder.as_ref(), space_id, &q.query, q.limit, threshold, FETCH_RATIO).await?;
    Ok(Json(results))
}

async fn semantic_grep(
    State(state): State<AppState>,
    Path((_pid, space_id)): Path<(ProjectId, SpaceId)>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<SearchResultBlockItem>>, ApiError> {
    let threshold = q.threshold.unwrap_or(state.config.default_search_threshold);
    let results = search_content_blocks(&state.db, state.embedder.as_ref(), space_id, &q.query, q.limit, threshold, FETCH_RATIO).await?;
    Ok(Json(results))
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum SearchMode {
    Fast,
    Agentic,
}

#[derive(Deserialize)]
struct ExperienceSearchQuery {
    query: String,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    mode: Option<SearchMode>,
    semantic_threshold: Option<f32>,
    max_iterations: Option<usize>,
}

async fn experience_search(
    State(state): State<AppState>,
    Path((_pid, space_id)): Path<(ProjectId, SpaceId)>,
    Query(q): Query<ExperienceSearchQuery>,
) -> Result<Json<ExperienceSearchResult>, ApiError> {
    let threshold = q.semantic_threshold.unwrap_or(state.config.default_search_threshold);
    let mode = q.mode.unwrap_or(SearchMode::Fast);
    let result = match mode {
        SearchMode::Fast => search_fast(&state.db, state.embedder.as_ref(), space_id, &q.query, q.limit, threshold).await?,
        SearchMode::Agentic => {
            let max_iterations = q.max_iterations.unwrap_or(state.config.search_agent_max_iterations);
            search_agentic(
                state.llm.as_ref(),
                state.db.clone(),
                state.embedder.clone(),
                space_id,
                &q.query,
                q.limit,
                threshold,
                max_iterations,
            )
            .await?
            .unwrap_or(ExperienceSearchResult { cited_blocks: Vec::new(), final_answer: None })
        }
    };
    Ok(Json(result))
}

#[derive(Deserialize)]
struct InsertBlockRequest {
    #[serde(rename = "type")]
    block_type: BlockType,
    title: String,
    #[serde(default)]
    props: serde_json::Value,
    parent_id: Option<BlockId>,
}

#[derive(Debug, Serialize)]
struct InsertBlockResponse {
    id: BlockId,
}

/// `type=sop` requires `parent_id` pointing at a page and `props` shaped as
/// `SopData`; path types go through `create_path_block`; the remaining
/// content type (`text`) is appended to the end of its page's children.
async fn insert_block(
    State(state): State<AppState>,
    Path((_pid, space_id)): Path<(ProjectId, SpaceId)>,
    Json(body): Json<InsertBlockRequest>,
) -> Result<Json<InsertBlockResponse>, ApiError> {
    let conn = state.db.lock().await;

    let id = match body.block_type {
        BlockType::Sop => {
            let parent_id = body
                .parent_id
                .ok_or_else(|| ctxmem_types::Error::validation("sop block requires parent_id"))?;
            let sop_data: SopData = serde_json::from_value(body.props)?;
            block::write_sop_to_parent(conn.conn(), space_id, parent_id, &sop_data)?
        }
        BlockType::Folder | BlockType::Page => {
            block::create_path_block(conn.conn(), space_id, &body.title, body.props, body.parent_id, body.block_type)?
        }
        BlockType::Text => {
            let page = body
                .parent_id
                .ok_or_else(|| ctxmem_types::Error::validation("text block requires parent_id"))?;
            let after_block_index = block::last_sort(conn.conn(), page)?;
            block::insert_block_to_page(
                conn.conn(),
                space_id,
                page,
                block::NewContentBlock { block_type: BlockType::Text, title: body.title, props: body.props },
                after_block_index,
            )?
        }
    };

    Ok(Json(InsertBlockResponse { id }))
}

#[derive(Deserialize)]
struct RenameToolRequest {
    rename: Vec<ToolRename>,
}

async fn rename_tool(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Json(body): Json<RenameToolRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let conn = state.db.lock().await;
    project::rename_tool(conn.conn(), project_id, &body.rename)?;
    Ok(Json(StatusResponse::ok()))
}

#[derive(Serialize)]
struct LearningStatusResponse {
    space_digested_count: i64,
    not_space_digested_count: i64,
}

async fn get_learning_status(
    State(state): State<AppState>,
    Path((_pid, session_id)): Path<(ProjectId, SessionId)>,
) -> Result<Json<LearningStatusResponse>, ApiError> {
    let conn = state.db.lock().await;
    let (digested, not_digested) = session::get_learning_status(conn.conn(), session_id)?;
    Ok(Json(LearningStatusResponse {
        space_digested_count: digested,
        not_space_digested_count: not_digested,
    }))
}
