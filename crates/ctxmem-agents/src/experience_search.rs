//! Experience-Search Agent (§4.J): semantic retrieval over a space, in a
//! `fast` pure-vector mode and an `agentic` mode that iterates with an LLM.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use ctxmem_core::{base_tools, run_agent_loop, CtxBuilder, Tool, ToolPool};
use ctxmem_llm::{EmbeddingClient, LlmClient};
use ctxmem_store::queries::block::{fetch_block, fetch_children_by_types, list_paths_under};
use ctxmem_types::{
    BlockType, Error, ExperienceSearchResult, Result, SearchResultBlockItem, SopData, SpaceId,
    CONTENT_BLOCK_TYPES,
};
use serde_json::{json, Value};

use crate::handle::DbHandle;
use crate::retrieval::{search_content_blocks, search_path_blocks};

const SEMANTIC_GLOB: &str = "semantic_glob";
const SEMANTIC_GREP: &str = "semantic_grep";
const OPEN_PAGE: &str = "open_page";
const ANSWER: &str = "answer";

/// How many candidates the underlying vector search fetches per requested
/// `limit`, before the threshold cut — matches `retrieval.rs`'s own default.
const FETCH_RATIO: f32 = 3.0;

/// `fast` mode: pure vector search over content blocks, ranked by distance
/// up to `threshold`. No LLM call, no `final_answer`.
pub async fn search_fast(
    db: &DbHandle,
    embedder: &dyn EmbeddingClient,
    space_id: SpaceId,
    query: &str,
    limit: usize,
    threshold: f32,
) -> Result<ExperienceSearchResult> {
    let cited_blocks = search_content_blocks(db, embedder, space_id, query, limit, threshold, FETCH_RATIO).await?;
    Ok(ExperienceSearchResult {
        cited_blocks,
        final_answer: None,
    })
}

/// Value an `answer` tool call hands back out-of-band, the same pattern
/// `sop_abstraction::run` uses for its submitted `SopData`: `run_agent_loop`
/// only returns an `AgentOutcome`, never the `Ctx` a tool mutated.
type SharedAnswer = Arc<StdMutex<Option<(String, Vec<ctxmem_types::BlockId>)>>>;

pub struct ExperienceSearchCtx {
    db: DbHandle,
    embedder: Arc<dyn EmbeddingClient>,
    space_id: SpaceId,
}

struct ExperienceSearchCtxBuilder {
    db: DbHandle,
    embedder: Arc<dyn EmbeddingClient>,
    space_id: SpaceId,
}

#[async_trait]
impl CtxBuilder<ExperienceSearchCtx> for ExperienceSearchCtxBuilder {
    async fn build(&self) -> Result<ExperienceSearchCtx> {
        Ok(ExperienceSearchCtx {
            db: self.db.clone(),
            embedder: self.embedder.clone(),
            space_id: self.space_id,
        })
    }
}

fn result_items_json(items: &[SearchResultBlockItem]) -> Value {
    json!({ "results": items })
}

struct SemanticGlobTool;

#[async_trait]
impl Tool<ExperienceSearchCtx> for SemanticGlobTool {
    fn schema(&self) -> ctxmem_types::ToolSchema {
        ctxmem_types::ToolSchema::new(
            SEMANTIC_GLOB,
            "Semantic search over folder/page titles and paths.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1},
                    "threshold": {"type": "number", "minimum": 0.0, "maximum": 2.0},
                },
                "required": ["query", "limit", "threshold"],
            }),
        )
    }

    async fn call(&self, ctx: &mut ExperienceSearchCtx, args: Value) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("semantic_glob requires a string 'query'"))?;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::validation("semantic_glob requires an integer 'limit'"))? as usize;
        let threshold = args
            .get("threshold")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::validation("semantic_glob requires a numeric 'threshold'"))? as f32;

        let items =
            search_path_blocks(&ctx.db, ctx.embedder.as_ref(), ctx.space_id, query, limit, threshold, FETCH_RATIO)
                .await?;
        Ok(result_items_json(&items))
    }
}

struct SemanticGrepTool;

#[async_trait]
impl Tool<ExperienceSearchCtx> for SemanticGrepTool {
    fn schema(&self) -> ctxmem_types::ToolSchema {
        ctxmem_types::ToolSchema::new(
            SEMANTIC_GREP,
            "Semantic search over SOP/text block content.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1},
                    "threshold": {"type": "number", "minimum": 0.0, "maximum": 2.0},
                },
                "required": ["query", "limit", "threshold"],
            }),
        )
    }

    async fn call(&self, ctx: &mut ExperienceSearchCtx, args: Value) -> Result<Value> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("semantic_grep requires a string 'query'"))?;
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::validation("semantic_grep requires an integer 'limit'"))? as usize;
        let threshold = args
            .get("threshold")
            .and_then(Value::as_f64)
            .ok_or_else(|| Error::validation("semantic_grep requires a numeric 'threshold'"))? as f32;

        let items =
            search_content_blocks(&ctx.db, ctx.embedder.as_ref(), ctx.space_id, query, limit, threshold, FETCH_RATIO)
                .await?;
        Ok(result_items_json(&items))
    }
}

/// Renders one content block's body for `open_page`: a SOP block's
/// `use_when`/`preferences`/`tool_sops`, or a text block's raw props.
fn render_content_block(block: &ctxmem_types::Block) -> String {
    match block.block_type {
        BlockType::Sop => match serde_json::from_value::<SopData>(block.props.clone()) {
            Ok(sop) => {
                let mut out = format!("## {}\nUse when: {}\n", block.title, sop.use_when);
                if !sop.preferences.trim().is_empty() {
                    out.push_str(&format!("Preferences: {}\n", sop.preferences));
                }
                for entry in &sop.tool_sops {
                    out.push_str(&format!("- {}: {}\n", entry.tool_name, entry.action));
                }
                out
            }
            Err(_) => format!("## {}\n{}\n", block.title, block.props),
        },
        _ => format!("## {}\n{}\n", block.title, block.props),
    }
}

struct OpenPageTool;

#[async_trait]
impl Tool<ExperienceSearchCtx> for OpenPageTool {
    fn schema(&self) -> ctxmem_types::ToolSchema {
        ctxmem_types::ToolSchema::new(
            OPEN_PAGE,
            "Returns the rendered content of a page's children, by path.",
            json!({
                "type": "object",
                "properties": { "path": {"type": "string"} },
                "required": ["path"],
            }),
        )
    }

    async fn call(&self, ctx: &mut ExperienceSearchCtx, args: Value) -> Result<Value> {
        let path = args
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("open_page requires a string 'path'"))?;

        let conn = ctx.db.lock().await;
        let paths = list_paths_under(conn.conn(), ctx.space_id, None, u32::MAX)?;
        let page_id = *paths
            .get(path)
            .ok_or_else(|| Error::validation(format!("no page at path '{path}'")))?;
        let page = fetch_block(conn.conn(), page_id)?;
        if page.block_type != BlockType::Page {
            return Err(Error::validation(format!("'{path}' is not a page")));
        }

        let children = fetch_children_by_types(conn.conn(), ctx.space_id, Some(page_id), &CONTENT_BLOCK_TYPES)?;
        let rendered: String = children.iter().map(render_content_block).collect();
        Ok(json!({ "path": path, "content": rendered }))
    }
}

struct AnswerTool {
    answer: SharedAnswer,
}

#[async_trait]
impl Tool<ExperienceSearchCtx> for AnswerTool {
    fn schema(&self) -> ctxmem_types::ToolSchema {
        ctxmem_types::ToolSchema::new(
            ANSWER,
            "Terminal: submits the final answer plus the block ids it cites.",
            json!({
                "type": "object",
                "properties": {
                    "final_answer": {"type": "string"},
                    "cited_block_ids": {"type": "array", "items": {"type": "string"}},
                },
                "required": ["final_answer", "cited_block_ids"],
            }),
        )
    }

    async fn call(&self, _ctx: &mut ExperienceSearchCtx, args: Value) -> Result<Value> {
        let final_answer = args
            .get("final_answer")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::validation("answer requires a string 'final_answer'"))?
            .to_string();
        let cited_raw = args
            .get("cited_block_ids")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::validation("answer requires an array 'cited_block_ids'"))?;
        let mut cited = Vec::with_capacity(cited_raw.len());
        for item in cited_raw {
            let s = item
                .as_str()
                .ok_or_else(|| Error::validation("cited_block_ids entries must be strings"))?;
            let id: ctxmem_types::BlockId = s
                .parse()
                .map_err(|_| Error::validation(format!("'{s}' is not a valid block id")))?;
            cited.push(id);
        }

        *self.answer.lock().unwrap() = Some((final_answer, cited));
        Ok(json!({ "acknowledged": true }))
    }
}

fn tool_pool(answer: SharedAnswer) -> ToolPool<ExperienceSearchCtx> {
    base_tools::<ExperienceSearchCtx>()
        .register(Arc::new(SemanticGlobTool))
        .register(Arc::new(SemanticGrepTool))
        .register(Arc::new(OpenPageTool))
        .register(Arc::new(AnswerTool { answer }))
}

fn system_prompt(limit: usize, threshold: f32) -> String {
    format!(
        "You are searching a knowledge space. Use semantic_glob to locate \
         relevant pages by title, semantic_grep to search SOP/text content \
         directly, and open_page to read a page's full content once you've \
         located it by path.\n\
         Default each search call's limit to {limit} and threshold to {threshold}, \
         narrowing only if you need more precision.\n\
         When you have enough information, call answer with a final_answer and \
         the block ids of everything you cited. Call finish once answer has been \
         submitted."
    )
}

fn user_content(query: &str) -> String {
    format!("Search for: \"{query}\"")
}

/// `agentic` mode: runs the agent loop and resolves the submitted answer's
/// cited ids to full `SearchResultBlockItem`s. Returns `None` if the agent
/// exhausted its iterations without calling `answer`.
#[allow(clippy::too_many_arguments)]
pub async fn search_agentic(
    llm: &dyn LlmClient,
    db: DbHandle,
    embedder: Arc<dyn EmbeddingClient>,
    space_id: SpaceId,
    query: &str,
    limit: usize,
    threshold: f32,
    max_iterations: usize,
) -> Result<Option<ExperienceSearchResult>> {
    let max_iterations = max_iterations.clamp(1, 100);
    let system = system_prompt(limit, threshold);
    let user = user_content(query);
    let answer: SharedAnswer = Arc::new(StdMutex::new(None));
    let pool = tool_pool(answer.clone());
    let ctx_builder = ExperienceSearchCtxBuilder {
        db: db.clone(),
        embedder,
        space_id,
    };
    let needs_fresh_ctx = std::collections::HashSet::new();

    run_agent_loop(llm, &system, &user, &pool, &ctx_builder, &needs_fresh_ctx, max_iterations).await?;

    let submitted = answer.lock().unwrap().take();
    let Some((final_answer, cited_ids)) = submitted else {
        return Ok(None);
    };

    let conn = db.lock().await;
    let mut cited_blocks = Vec::with_capacity(cited_ids.len());
    for id in cited_ids {
        let block = fetch_block(conn.conn(), id)?;
        let path = crate::retrieval::block_path(conn.conn(), &block)?;
        cited_blocks.push(SearchResultBlockItem {
            block_id: block.id,
            title: block.title,
            block_type: block.block_type,
            path,
            distance: None,
        });
    }

    Ok(Some(ExperienceSearchResult {
        cited_blocks,
        final_answer: Some(final_answer),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxmem_store::queries::block::create_path_block;
    use ctxmem_testing::{seeded_world, FakeEmbeddingClient, FakeLlmClient};
    use ctxmem_types::{AssistantMessage, ToolCall, ToolCallFunction};

    fn tool_call(name: &str, args: Value) -> AssistantMessage {
        AssistantMessage {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call-1".to_string(),
                function: ToolCallFunction {
                    name: name.to_string(),
                    arguments: args.to_string(),
                },
            }],
        }
    }

    fn finish_call() -> AssistantMessage {
        tool_call("finish", json!({"summary": "done"}))
    }

    #[tokio::test]
    async fn fast_mode_finds_seeded_sop_without_an_llm_call() {
        let world = seeded_world().unwrap();
        let page = create_path_block(world.db.conn(), world.space_id, "Auth", Value::Null, None, BlockType::Page).unwrap();
        let sop_id = ctxmem_store::queries::block::write_sop_to_parent(
            world.db.conn(),
            world.space_id,
            page,
            &SopData {
                use_when: "validate a jwt".into(),
                preferences: "use hs256 with rotating secret".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let db: DbHandle = Arc::new(tokio::sync::Mutex::new(world.db));
        let embedder = FakeEmbeddingClient;
        {
            let vectors = embedder.embed(&["validate a jwt".to_string()], ctxmem_llm::EmbeddingPhase::Document).await.unwrap();
            let conn = db.lock().await;
            ctxmem_store::queries::embedding::insert(conn.conn(), sop_id, ctxmem_types::EmbeddingPhase::Document, "title", &vectors[0]).unwrap();
        }

        let result = search_fast(&db, &embedder, world.space_id, "jwt validation", 5, 1.5).await.unwrap();
        assert!(result.final_answer.is_none());
        assert_eq!(result.cited_blocks.len(), 1);
        assert_eq!(result.cited_blocks[0].block_id, sop_id);
    }

    #[tokio::test]
    async fn agentic_mode_resolves_cited_blocks() {
        let world = seeded_world().unwrap();
        let page = create_path_block(world.db.conn(), world.space_id, "Auth", Value::Null, None, BlockType::Page).unwrap();
        let sop_id = ctxmem_store::queries::block::write_sop_to_parent(
            world.db.conn(),
            world.space_id,
            page,
            &SopData {
                use_when: "validate a jwt".into(),
                preferences: "use hs256 with rotating secret".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let db: DbHandle = Arc::new(tokio::sync::Mutex::new(world.db));
        let embedder: Arc<dyn EmbeddingClient> = Arc::new(FakeEmbeddingClient);

        let answer_call = tool_call(
            ANSWER,
            json!({"final_answer": "use hs256", "cited_block_ids": [sop_id.to_string()]}),
        );
        let llm = FakeLlmClient::new(vec![answer_call, finish_call()]);

        let result = search_agentic(&llm, db, embedder, world.space_id, "jwt validation", 5, 1.5, 16)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.final_answer.as_deref(), Some("use hs256"));
        assert_eq!(result.cited_blocks.len(), 1);
        assert_eq!(result.cited_blocks[0].block_id, sop_id);
        assert_eq!(result.cited_blocks[0].path.as_deref(), Some("Auth"));
    }
}
