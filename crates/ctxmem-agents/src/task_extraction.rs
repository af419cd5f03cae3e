//! Task-Extraction Agent (§4.G): segments a flushed batch of messages into
//! tasks, linking each message to the task it advances.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use ctxmem_core::{base_tools, run_agent_loop, CtxBuilder, Tool, ToolPool};
use ctxmem_llm::LlmClient;
use ctxmem_store::queries::task;
use ctxmem_types::{Error, Message, Result, SessionId, TaskData, TaskStatus, ToolSchema};
use serde_json::{json, Value};

use crate::handle::DbHandle;

const INSERT_TASK: &str = "insert_task";
const UPDATE_TASK: &str = "update_task";
const APPEND_MESSAGES_TO_TASK: &str = "append_messages_to_task";
const APPEND_MESSAGES_TO_PLANNING_SECTION: &str = "append_messages_to_planning_section";

pub struct TaskExtractionCtx {
    db: DbHandle,
    session_id: SessionId,
    /// The flushed batch, indexed by position for `<message id=i>` prompt
    /// references and `message_indices[]` tool arguments.
    messages: Vec<Message>,
}

struct TaskExtractionCtxBuilder {
    db: DbHandle,
    session_id: SessionId,
    messages: Vec<Message>,
}

#[async_trait]
impl CtxBuilder<TaskExtractionCtx> for TaskExtractionCtxBuilder {
    async fn build(&self) -> Result<TaskExtractionCtx> {
        Ok(TaskExtractionCtx {
            db: self.db.clone(),
            session_id: self.session_id,
            messages: self.messages.clone(),
        })
    }
}

fn resolve_indices(ctx: &TaskExtractionCtx, indices: &[usize]) -> Result<Vec<ctxmem_types::MessageId>> {
    indices
        .iter()
        .map(|i| {
            ctx.messages
                .get(*i)
                .map(|m| m.id)
                .ok_or_else(|| Error::validation(format!("message index {i} out of range")))
        })
        .collect()
}

struct InsertTaskTool;

#[async_trait]
impl Tool<TaskExtractionCtx> for InsertTaskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            INSERT_TASK,
            "Insert a new task immediately after an existing order, shifting later tasks.",
            json!({
                "type": "object",
                "properties": {
                    "after_order": {"type": "integer"},
                    "task_description": {"type": "string"}
                },
                "required": ["after_order", "task_description"]
            }),
        )
    }

    async fn call(&self, ctx: &mut TaskExtractionCtx, args: Value) -> Result<Value> {
        let after_order = args
            .get("after_order")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::validation("after_order is required"))?;
        let task_description = args
            .get("task_description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("task_description is required"))?
            .to_string();

        let db = ctx.db.lock().await;
        let task_id = task::insert_after(db.conn(), ctx.session_id, after_order, task_description)?;
        Ok(json!({"task_id": task_id.to_string(), "order": after_order + 1}))
    }
}

struct UpdateTaskTool;

#[async_trait]
impl Tool<TaskExtractionCtx> for UpdateTaskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            UPDATE_TASK,
            "Update a task's description, status, or data. success -> anything is rejected.",
            json!({
                "type": "object",
                "properties": {
                    "task_order": {"type": "integer"},
                    "task_description": {"type": "string"},
                    "status": {"type": "string", "enum": ["pending", "running", "success", "failed"]},
                    "data_patch": {
                        "type": "object",
                        "properties": {
                            "progresses": {"type": "array", "items": {"type": "string"}},
                            "user_preferences": {"type": "array", "items": {"type": "string"}},
                            "sop_thinking": {"type": "string"}
                        }
                    }
                },
                "required": ["task_order"]
            }),
        )
    }

    async fn call(&self, ctx: &mut TaskExtractionCtx, args: Value) -> Result<Value> {
        let task_order = args
            .get("task_order")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::validation("task_order is required"))?;
        let task_description = args
            .get("task_description")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let status = match args.get("status").and_then(|v| v.as_str()) {
            Some(s) => Some(
                TaskStatus::parse(s).ok_or_else(|| Error::validation(format!("unknown status '{s}'")))?,
            ),
            None => None,
        };
        let data_patch = args.get("data_patch").map(|patch| TaskData {
            task_description: String::new(),
            progresses: patch
                .get("progresses")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            user_preferences: patch
                .get("user_preferences")
                .and_then(|v| v.as_array())
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
            sop_thinking: patch.get("sop_thinking").and_then(|v| v.as_str()).map(str::to_string),
        });

        let db = ctx.db.lock().await;
        task::update_task(db.conn(), ctx.session_id, task_order, task_description, status, data_patch)?;
        Ok(json!({"updated": task_order}))
    }
}

struct AppendMessagesToTaskTool;

#[async_trait]
impl Tool<TaskExtractionCtx> for AppendMessagesToTaskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            APPEND_MESSAGES_TO_TASK,
            "Link messages (by index into the current batch) to a task and append a progress note.",
            json!({
                "type": "object",
                "properties": {
                    "task_order": {"type": "integer"},
                    "message_indices": {"type": "array", "items": {"type": "integer"}},
                    "progress_summary": {"type": "string"},
                    "user_preference": {"type": "string"}
                },
                "required": ["task_order", "message_indices", "progress_summary"]
            }),
        )
    }

    async fn call(&self, ctx: &mut TaskExtractionCtx, args: Value) -> Result<Value> {
        let task_order = args
            .get("task_order")
            .and_then(|v| v.as_i64())
            .ok_or_else(|| Error::validation("task_order is required"))?;
        let indices: Vec<usize> = args
            .get("message_indices")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::validation("message_indices is required"))?
            .iter()
            .filter_map(|v| v.as_u64().map(|n| n as usize))
            .collect();
        let progress_summary = args
            .get("progress_summary")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::validation("progress_summary is required"))?
            .to_string();
        let user_preference = args.get("user_preference").and_then(|v| v.as_str()).map(str::to_string);

        let message_ids = resolve_indices(ctx, &indices)?;
        let db = ctx.db.lock().await;
        task::append_messages_to_task(db.conn(), ctx.session_id, task_order, &message_ids, progress_summary, user_preference)?;
        Ok(json!({"linked": message_ids.len()}))
    }
}

struct AppendMessagesToPlanningSectionTool;

#[async_trait]
impl Tool<TaskExtractionCtx> for AppendMessagesToPlanningSectionTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            APPEND_MESSAGES_TO_PLANNING_SECTION,
            "Link messages (by index into the current batch) to the session's planning task, creating it if needed.",
            json!({
                "type": "object",
                "properties": {
                    "message_indices": {"type": "array", "items": {"type": "integer"}}
                },
                "required": ["message_indices"]
            }),
        )
    }

    async fn call(&self, ctx: &mut TaskExtractionCtx, args: Value) -> Result<Value> {
        let indices: Vec<usize> = args
            .get("message_indices")
            .and_then(|v| v.as_array())
            .ok_or_else(|| Error::validation("message_indices is required"))?
            .iter()
            .filter_map(|v| v.as_u64().map(|n| n as usize))
            .collect();

        let message_ids = resolve_indices(ctx, &indices)?;
        let db = ctx.db.lock().await;
        task::append_messages_to_planning_section(db.conn(), ctx.session_id, &message_ids)?;
        Ok(json!({"linked": message_ids.len()}))
    }
}

fn tool_pool() -> ToolPool<TaskExtractionCtx> {
    base_tools::<TaskExtractionCtx>()
        .register(Arc::new(InsertTaskTool))
        .register(Arc::new(UpdateTaskTool))
        .register(Arc::new(AppendMessagesToTaskTool))
        .register(Arc::new(AppendMessagesToPlanningSectionTool))
}

fn system_prompt() -> String {
    "You segment a conversation into tasks. Use insert_task to start a new \
     task, update_task to change its description/status, and \
     append_messages_to_task / append_messages_to_planning_section to link \
     messages. Call finish when the batch has been fully triaged."
        .to_string()
}

fn user_content(current_tasks: &[ctxmem_types::Task], previous_progress: &[String], messages: &[Message]) -> String {
    let tasks_section = if current_tasks.is_empty() {
        "(no tasks yet)".to_string()
    } else {
        current_tasks.iter().map(|t| t.to_prompt_line()).collect::<Vec<_>>().join("\n")
    };
    let progress_section = if previous_progress.is_empty() {
        "(none)".to_string()
    } else {
        previous_progress.join("\n")
    };
    let messages_section = messages
        .iter()
        .enumerate()
        .map(|(i, m)| format!("<message id={i}>{}</message>", m.to_prompt_string(1024)))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "# Current tasks\n{tasks_section}\n\n\
         # Previous progress\n{progress_section}\n\n\
         # Current messages\n{messages_section}"
    )
}

/// Runs the Task-Extraction Agent for a newly flushed batch of messages.
/// Per spec.md §4.G, this returns `Ok(())` regardless of whether `finish`
/// was ever called — only a non-validation tool error (propagated out of
/// `run_agent_loop`) or an LLM failure is surfaced as an error.
pub async fn run(
    llm: &dyn LlmClient,
    db: DbHandle,
    session_id: SessionId,
    messages: Vec<Message>,
    max_iterations: usize,
    previous_progress_num: usize,
) -> Result<()> {
    let (current_tasks, previous_progress) = {
        let conn = db.lock().await;
        let tasks = task::list_non_planning(conn.conn(), session_id)?;
        let progress = task::recent_progress_lines(conn.conn(), session_id, previous_progress_num)?;
        (tasks, progress)
    };

    let system = system_prompt();
    let user = user_content(&current_tasks, &previous_progress, &messages);
    let pool = tool_pool();
    let ctx_builder = TaskExtractionCtxBuilder {
        db,
        session_id,
        messages,
    };

    let mut needs_fresh_ctx = HashSet::new();
    needs_fresh_ctx.insert(INSERT_TASK);
    needs_fresh_ctx.insert(UPDATE_TASK);
    needs_fresh_ctx.insert(APPEND_MESSAGES_TO_TASK);
    needs_fresh_ctx.insert(APPEND_MESSAGES_TO_PLANNING_SECTION);

    run_agent_loop(llm, &system, &user, &pool, &ctx_builder, &needs_fresh_ctx, max_iterations).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxmem_testing::{seeded_world, FakeLlmClient};
    use ctxmem_types::{MessageId, MessageRole};
    use tokio::sync::Mutex;

    #[tokio::test]
    async fn insert_task_then_finish_shifts_order_and_succeeds() {
        let world = seeded_world().unwrap();
        let database = world.db;
        let session_id = world.session_id;
        task::insert_at(database.conn(), session_id, 1, false, TaskData {
            task_description: "A".into(),
            ..Default::default()
        })
        .unwrap();
        task::set_status(database.conn(), task::fetch(database.conn(), session_id, 1).unwrap().id, TaskStatus::Running).unwrap();
        task::insert_at(database.conn(), session_id, 2, false, TaskData {
            task_description: "B".into(),
            ..Default::default()
        })
        .unwrap();

        let db: DbHandle = std::sync::Arc::new(Mutex::new(database));
        let message = ctxmem_types::Message {
            id: MessageId::new(),
            session_id,
            role: MessageRole::User,
            parts: serde_json::json!("plan: do C after B"),
            task_id: None,
        };

        let insert_call = ctxmem_types::AssistantMessage {
            content: None,
            tool_calls: vec![ctxmem_types::ToolCall {
                id: "c1".into(),
                function: ctxmem_types::ToolCallFunction {
                    name: INSERT_TASK.into(),
                    arguments: json!({"after_order": 2, "task_description": "C"}).to_string(),
                },
            }],
        };
        let finish_call = ctxmem_types::AssistantMessage {
            content: None,
            tool_calls: vec![ctxmem_types::ToolCall {
                id: "c2".into(),
                function: ctxmem_types::ToolCallFunction {
                    name: "finish".into(),
                    arguments: json!({}).to_string(),
                },
            }],
        };
        let llm = FakeLlmClient::new(vec![insert_call, finish_call]);

        run(&llm, db.clone(), session_id, vec![message], 3, 6).await.unwrap();

        let conn_guard = db.lock().await;
        let tasks = task::list_non_planning(conn_guard.conn(), session_id).unwrap();
        let orders: Vec<i64> = tasks.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(tasks[2].data.task_description, "C");
    }
}
