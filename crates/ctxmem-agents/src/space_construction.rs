//! Space-Construction Agent (§4.I): places one batch of abstracted SOPs into
//! a space's folder/page tree.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use ctxmem_core::{base_tools, run_agent_loop, CtxBuilder, Tool, ToolPool};
use ctxmem_llm::LlmClient;
use ctxmem_store::queries::block;
use ctxmem_types::{BlockId, BlockType, Error, Result, SopData, SpaceId, TaskId, ToolSchema};
use serde_json::{json, Value};

use crate::handle::DbHandle;

const LS: &str = "ls";
const CREATE_FOLDER: &str = "create_folder";
const CREATE_PAGE: &str = "create_page";
const INSERT_CANDIDATE: &str = "insert_candidate_data_as_content";

const ROOT: &str = "/";

/// Candidate indices a tool call has successfully placed, shared between
/// `InsertCandidateTool` and the caller of `run_agent_loop`: the loop only
/// hands back an `AgentOutcome`, not the ctx it built tools against, so the
/// set of landed candidates has to ride out-of-band the same way
/// `sop_abstraction`'s submitted `SopData` does.
type SharedInserted = Arc<StdMutex<HashSet<usize>>>;

pub struct SpaceConstructionCtx {
    db: DbHandle,
    space_id: SpaceId,
    candidates: Vec<SopData>,
    inserted: SharedInserted,
    /// `/`-joined path (relative to space root) → block id, seeded with the
    /// root entry and grown as `ls` walks the tree.
    paths: HashMap<String, BlockId>,
}

impl SpaceConstructionCtx {
    fn resolve(&self, path: &str) -> Result<Option<BlockId>> {
        if path.is_empty() || path == ROOT {
            return Ok(None);
        }
        self.paths
            .get(path)
            .copied()
            .map(Some)
            .ok_or_else(|| Error::validation(format!("unknown path '{path}', call ls first")))
    }
}

struct SpaceConstructionCtxBuilder {
    db: DbHandle,
    space_id: SpaceId,
    candidates: Vec<SopData>,
    inserted: SharedInserted,
}

#[async_trait]
impl CtxBuilder<SpaceConstructionCtx> for SpaceConstructionCtxBuilder {
    async fn build(&self) -> Result<SpaceConstructionCtx> {
        Ok(SpaceConstructionCtx {
            db: self.db.clone(),
            space_id: self.space_id,
            candidates: self.candidates.clone(),
            inserted: self.inserted.clone(),
            paths: HashMap::new(),
        })
    }
}

struct LsTool;

#[async_trait]
impl Tool<SpaceConstructionCtx> for LsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            LS,
            "List folders and pages under a path, up to a recursion depth. Populates the path map used by the other tools.",
            json!({
                "type": "object",
                "properties": {
                    "folder_path": {"type": "string", "description": "'/' for the space root, or a previously-seen folder path"},
                    "depth": {"type": "integer", "minimum": 0}
                },
                "required": ["folder_path", "depth"]
            }),
        )
    }

    async fn call(&self, ctx: &mut SpaceConstructionCtx, args: Value) -> Result<Value> {
        let folder_path = args.get("folder_path").and_then(|v| v.as_str()).unwrap_or(ROOT).to_string();
        let depth = args.get("depth").and_then(|v| v.as_u64()).unwrap_or(1) as u32;
        let root = ctx.resolve(&folder_path)?;

        let db = ctx.db.lock().await;
        let entries = block::list_paths_under(db.conn(), ctx.space_id, root, depth)?;

        let prefix = if folder_path.is_empty() || folder_path == ROOT {
            String::new()
        } else {
            format!("{folder_path}/")
        };
        let mut listing: Vec<String> = Vec::new();
        for (relative_path, block_id) in &entries {
            let full_path = format!("{prefix}{relative_path}");
            let kind = block::fetch_block(db.conn(), *block_id)?.block_type;
            listing.push(format!("{full_path} [{}]", kind.as_str()));
            ctx.paths.insert(full_path, *block_id);
        }
        listing.sort();

        Ok(json!({"entries": listing}))
    }
}

struct CreateFolderTool;

#[async_trait]
impl Tool<SpaceConstructionCtx> for CreateFolderTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            CREATE_FOLDER,
            "Create a folder under an existing folder path (or the root).",
            json!({
                "type": "object",
                "properties": {
                    "parent_path": {"type": "string"},
                    "title": {"type": "string"}
                },
                "required": ["parent_path", "title"]
            }),
        )
    }

    async fn call(&self, ctx: &mut SpaceConstructionCtx, args: Value) -> Result<Value> {
        let parent_path = args.get("parent_path").and_then(|v| v.as_str()).unwrap_or(ROOT).to_string();
        let title = args
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("title is required"))?
            .to_string();
        let parent_id = ctx.resolve(&parent_path)?;

        let db = ctx.db.lock().await;
        let id = block::create_path_block(db.conn(), ctx.space_id, &title, Value::Null, parent_id, BlockType::Folder)?;

        let full_path = if parent_path.is_empty() || parent_path == ROOT {
            title.clone()
        } else {
            format!("{parent_path}/{title}")
        };
        ctx.paths.insert(full_path.clone(), id);
        Ok(json!({"path": full_path}))
    }
}

struct CreatePageTool;

#[async_trait]
impl Tool<SpaceConstructionCtx> for CreatePageTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            CREATE_PAGE,
            "Create a page under an existing folder path (or the root).",
            json!({
                "type": "object",
                "properties": {
                    "parent_path": {"type": "string"},
                    "title": {"type": "string"}
                },
                "required": ["parent_path", "title"]
            }),
        )
    }

    async fn call(&self, ctx: &mut SpaceConstructionCtx, args: Value) -> Result<Value> {
        let parent_path = args.get("parent_path").and_then(|v| v.as_str()).unwrap_or(ROOT).to_string();
        let title = args
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("title is required"))?
            .to_string();
        let parent_id = ctx.resolve(&parent_path)?;

        let db = ctx.db.lock().await;
        let id = block::create_path_block(db.conn(), ctx.space_id, &title, Value::Null, parent_id, BlockType::Page)?;

        let full_path = if parent_path.is_empty() || parent_path == ROOT {
            title.clone()
        } else {
            format!("{parent_path}/{title}")
        };
        ctx.paths.insert(full_path.clone(), id);
        Ok(json!({"path": full_path}))
    }
}

struct InsertCandidateTool;

#[async_trait]
impl Tool<SpaceConstructionCtx> for InsertCandidateTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            INSERT_CANDIDATE,
            "Insert one pending SOP candidate as content under a page.",
            json!({
                "type": "object",
                "properties": {
                    "page_path": {"type": "string"},
                    "after_block_index": {"type": "integer"},
                    "candidate_index": {"type": "integer"}
                },
                "required": ["page_path", "after_block_index", "candidate_index"]
            }),
        )
    }

    async fn call(&self, ctx: &mut SpaceConstructionCtx, args: Value) -> Result<Value> {
        let page_path = args
            .get("page_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("page_path is required"))?
            .to_string();
        // Every candidate this agent places is a SOP, which always appends
        // via `write_sop_to_parent`; `after_block_index` only matters for
        // non-SOP content blocks inserted through `insert_block_to_page`,
        // which this agent never produces.
        args.get("after_block_index")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::validation("after_block_index is required"))?;
        let candidate_index = args
            .get("candidate_index")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| Error::validation("candidate_index is required"))? as usize;

        if candidate_index >= ctx.candidates.len() {
            return Err(Error::validation(format!("candidate_index {candidate_index} out of range")));
        }
        if ctx.inserted.lock().unwrap().contains(&candidate_index) {
            return Err(Error::validation(format!("candidate {candidate_index} was already inserted")));
        }

        let page_id = ctx
            .resolve(&page_path)?
            .ok_or_else(|| Error::validation("page_path cannot be the root"))?;

        let db = ctx.db.lock().await;
        let sop = &ctx.candidates[candidate_index];
        let block_id = block::write_sop_to_parent(db.conn(), ctx.space_id, page_id, sop)?;

        ctx.inserted.lock().unwrap().insert(candidate_index);
        Ok(json!({"block_id": block_id.to_string()}))
    }
}

fn tool_pool() -> ToolPool<SpaceConstructionCtx> {
    base_tools::<SpaceConstructionCtx>()
        .register(Arc::new(LsTool))
        .register(Arc::new(CreateFolderTool))
        .register(Arc::new(CreatePageTool))
        .register(Arc::new(InsertCandidateTool))
}

fn system_prompt() -> String {
    "You place abstracted SOPs into a folder/page tree. Use ls to explore \
     existing structure before creating new folders or pages; prefer an \
     existing page whose topic matches a candidate over creating a new \
     one. Call insert_candidate_data_as_content once per candidate you \
     place, then finish."
        .to_string()
}

fn user_content(candidates: &[SopData]) -> String {
    let candidates_section = candidates
        .iter()
        .enumerate()
        .map(|(i, sop)| {
            format!(
                "<candidate index={i}>\nuse_when: {}\npreferences: {}\ntool_sops: {}\n</candidate>",
                sop.use_when,
                sop.preferences,
                sop.tool_sops.len()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("# Pending candidates\n{candidates_section}")
}

/// Runs the Space-Construction Agent for one batch of SOPs just abstracted
/// from a space's tasks (`task_ids[i]` is the task `sops[i]` came from).
/// Returns the `task_ids` whose candidate was actually placed this run; per
/// §4.I, only those get marked `space_digested` by the caller — a task
/// whose SOP never landed stays eligible for a future run.
pub async fn run(
    llm: &dyn LlmClient,
    db: DbHandle,
    space_id: SpaceId,
    task_ids: Vec<TaskId>,
    sops: Vec<SopData>,
    max_iterations: usize,
) -> Result<Vec<TaskId>> {
    let system = system_prompt();
    let user = user_content(&sops);
    let pool = tool_pool();
    let inserted: SharedInserted = Arc::new(StdMutex::new(HashSet::new()));
    let ctx_builder = SpaceConstructionCtxBuilder {
        db: db.clone(),
        space_id,
        candidates: sops,
        inserted: inserted.clone(),
    };
    let needs_fresh_ctx = HashSet::new();

    run_agent_loop(llm, &system, &user, &pool, &ctx_builder, &needs_fresh_ctx, max_iterations).await?;

    let landed = inserted.lock().unwrap();
    Ok(task_ids
        .into_iter()
        .enumerate()
        .filter(|(i, _)| landed.contains(i))
        .map(|(_, id)| id)
        .collect())
}
