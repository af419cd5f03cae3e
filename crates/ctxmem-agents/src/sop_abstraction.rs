//! SOP-Abstraction Agent (§4.H): abstracts one just-succeeded task into a
//! reusable SOP, or judges it too easy to be worth distilling.

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use ctxmem_core::{base_tools, run_agent_loop, CtxBuilder, Tool, ToolPool, REPORT_THINKING_TOOL};
use ctxmem_llm::LlmClient;
use ctxmem_store::queries::{message, task};
use ctxmem_types::{Error, Result, SessionId, SopData, TaskData, TaskId, ToolSchema};
use serde_json::{json, Value};

use crate::handle::DbHandle;

const SUBMIT_SOP: &str = "submit_sop";

/// Carries extra scoring criteria a project appends to the complexity-scoring
/// rule in the system prompt (spec.md §4.H, §9 "customization object").
#[derive(Debug, Clone, Default)]
pub struct SopPromptCustomization {
    pub custom_scoring_rules: Vec<String>,
}

type SharedSubmission = Arc<StdMutex<Option<SopData>>>;

pub struct SopAbstractionCtx {
    db: DbHandle,
    task_id: TaskId,
}

struct SopAbstractionCtxBuilder {
    db: DbHandle,
    task_id: TaskId,
}

#[async_trait]
impl CtxBuilder<SopAbstractionCtx> for SopAbstractionCtxBuilder {
    async fn build(&self) -> Result<SopAbstractionCtx> {
        Ok(SopAbstractionCtx {
            db: self.db.clone(),
            task_id: self.task_id,
        })
    }
}

struct SubmitSopTool {
    submission: SharedSubmission,
}

#[async_trait]
impl Tool<SopAbstractionCtx> for SubmitSopTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            SUBMIT_SOP,
            "Submit the SOP abstracted from this task, or mark it as too easy to distill.",
            json!({
                "type": "object",
                "properties": {
                    "is_easy_task": {"type": "boolean"},
                    "sop": {
                        "type": "object",
                        "properties": {
                            "use_when": {"type": "string"},
                            "preferences": {"type": "string"},
                            "tool_sops": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": {
                                        "tool_name": {"type": "string"},
                                        "action": {"type": "string"}
                                    },
                                    "required": ["tool_name", "action"]
                                }
                            }
                        }
                    }
                },
                "required": ["is_easy_task"]
            }),
        )
    }

    async fn call(&self, _ctx: &mut SopAbstractionCtx, args: Value) -> Result<Value> {
        let is_easy_task = args
            .get("is_easy_task")
            .and_then(|v| v.as_bool())
            .ok_or_else(|| Error::validation("is_easy_task is required"))?;

        if is_easy_task {
            return Ok(json!({"acknowledged": true, "easy": true}));
        }

        let sop: SopData = serde_json::from_value(
            args.get("sop")
                .cloned()
                .ok_or_else(|| Error::validation("sop is required when is_easy_task is false"))?,
        )
        .map_err(|e| Error::validation(format!("invalid sop payload: {e}")))?;
        sop.validate()?;

        *self.submission.lock().unwrap() = Some(sop);
        Ok(json!({"acknowledged": true, "easy": false}))
    }
}

struct ReportThinkingPersistTool;

#[async_trait]
impl Tool<SopAbstractionCtx> for ReportThinkingPersistTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            REPORT_THINKING_TOOL,
            "Record a short note of intermediate reasoning; persisted into the task's sop_thinking.",
            json!({
                "type": "object",
                "properties": {"thought": {"type": "string"}},
                "required": ["thought"]
            }),
        )
    }

    async fn call(&self, ctx: &mut SopAbstractionCtx, args: Value) -> Result<Value> {
        let thought = args.get("thought").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let db = ctx.db.lock().await;
        let existing = task::fetch_by_id(db.conn(), ctx.task_id)?;
        task::update_task(
            db.conn(),
            existing.session_id,
            existing.order,
            None,
            None,
            Some(TaskData {
                sop_thinking: Some(thought),
                ..Default::default()
            }),
        )?;
        Ok(json!({"acknowledged": true}))
    }
}

fn tool_pool(submission: SharedSubmission) -> ToolPool<SopAbstractionCtx> {
    // base_tools' generic `report_thinking` isn't used here: this agent
    // persists it into the task's sop_thinking (§4.H) instead of only
    // logging it, so it registers its own in place of the base one.
    base_tools::<SopAbstractionCtx>()
        .register(Arc::new(SubmitSopTool { submission }))
        .register(Arc::new(ReportThinkingPersistTool))
}

/// Four built-in 1-2 point criteria (spec.md §4.H); a task scores "easy"
/// when the total is below 2.
const BUILTIN_SCORING_RULES: &[&str] = &[
    "Single tool call with no branching (+2) or multiple steps/branches (+0)",
    "Required non-obvious user preference or constraint (+2) or none (+0)",
    "Touched more than one distinct tool (+1) or a single tool (+0)",
    "Took more than one attempt to succeed (+1) or succeeded immediately (+0)",
];

fn system_prompt(customization: &SopPromptCustomization) -> String {
    let mut rules: Vec<String> = BUILTIN_SCORING_RULES.iter().map(|s| s.to_string()).collect();
    rules.extend(customization.custom_scoring_rules.iter().cloned());
    let rules_section = rules.join("\n");

    format!(
        "You abstract one completed task into a reusable Standard Operating \
         Procedure, or judge it too easy to be worth distilling. Score the \
         task against these criteria (total < 2 means easy):\n{rules_section}\n\n\
         Call submit_sop(is_easy_task, sop) exactly once. If not easy, `sop` \
         must have non-blank preferences or at least one tool_sop entry. \
         Call finish once submit_sop has been called."
    )
}

fn user_content(
    previous_tasks: &[ctxmem_types::Task],
    task_description: &str,
    user_preferences: &[String],
    raw_history: &[ctxmem_types::Message],
) -> String {
    let previous_section = if previous_tasks.is_empty() {
        "(none)".to_string()
    } else {
        previous_tasks
            .iter()
            .map(|t| format!("<task id={}>{}</task>", t.order, t.data.task_description))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let preferences_section = if user_preferences.is_empty() {
        "(none)".to_string()
    } else {
        user_preferences.join("; ")
    };
    let history_section = raw_history
        .iter()
        .map(|m| m.to_prompt_string(1024))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "# Previous tasks\n{previous_section}\n\n\
         # Current task\n{task_description}\n\n\
         # User preferences\n{preferences_section}\n\n\
         # Raw history\n{history_section}"
    )
}

/// Runs the SOP-Abstraction Agent for one task that has just transitioned
/// to `success`. Returns `Some(SopData)` when a SOP was submitted (the
/// caller is responsible for emitting `sop.complete` on the bus), or `None`
/// when the task was judged easy or the agent exited without submitting.
pub async fn run(
    llm: &dyn LlmClient,
    db: DbHandle,
    session_id: SessionId,
    task_id: TaskId,
    max_iterations: usize,
    previous_tasks_limit: usize,
    customization: &SopPromptCustomization,
) -> Result<Option<SopData>> {
    let (previous_tasks, task_description, user_preferences, raw_history) = {
        let conn = db.lock().await;
        let task = task::fetch_by_id(conn.conn(), task_id)?;
        let mut siblings: Vec<_> = task::list_non_planning(conn.conn(), session_id)?
            .into_iter()
            .filter(|t| t.order < task.order)
            .collect();
        if siblings.len() > previous_tasks_limit {
            siblings = siblings.split_off(siblings.len() - previous_tasks_limit);
        }
        let raw_history = message::list_for_task(conn.conn(), task_id)?;
        (
            siblings,
            task.data.task_description.clone(),
            task.data.user_preferences.clone(),
            raw_history,
        )
    };

    let system = system_prompt(customization);
    let user = user_content(&previous_tasks, &task_description, &user_preferences, &raw_history);
    let submission: SharedSubmission = Arc::new(StdMutex::new(None));
    let pool = tool_pool(submission.clone());
    let ctx_builder = SopAbstractionCtxBuilder { db, task_id };
    let needs_fresh_ctx = HashSet::new();

    run_agent_loop(llm, &system, &user, &pool, &ctx_builder, &needs_fresh_ctx, max_iterations).await?;

    let result = submission.lock().unwrap().take();
    Ok(result)
}
