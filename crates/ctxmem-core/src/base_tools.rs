//! `finish` and `report_thinking` (§4.C): every agent's pool includes these
//! two instead of redefining them per agent.

use async_trait::async_trait;
use ctxmem_types::{Result, ToolSchema};
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolPool};

pub const FINISH_TOOL: &str = "finish";
pub const REPORT_THINKING_TOOL: &str = "report_thinking";

struct FinishTool;

#[async_trait]
impl<Ctx: Send + Sync> Tool<Ctx> for FinishTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            FINISH_TOOL,
            "Signal that this turn's work is complete and no further tool calls are needed.",
            json!({
                "type": "object",
                "properties": {
                    "summary": {
                        "type": "string",
                        "description": "Short summary of what was done this turn."
                    }
                },
                "required": []
            }),
        )
    }

    async fn call(&self, _ctx: &mut Ctx, args: Value) -> Result<Value> {
        Ok(json!({"acknowledged": true, "summary": args.get("summary")}))
    }
}

struct ReportThinkingTool;

#[async_trait]
impl<Ctx: Send + Sync> Tool<Ctx> for ReportThinkingTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            REPORT_THINKING_TOOL,
            "Record a short note of intermediate reasoning before acting.",
            json!({
                "type": "object",
                "properties": {
                    "thought": {"type": "string"}
                },
                "required": ["thought"]
            }),
        )
    }

    async fn call(&self, _ctx: &mut Ctx, args: Value) -> Result<Value> {
        let thought = args.get("thought").and_then(|v| v.as_str()).unwrap_or("");
        debug!(thought, "agent reported thinking");
        Ok(json!({"acknowledged": true}))
    }
}

/// A fresh `ToolPool` seeded with `finish` and `report_thinking`. Callers
/// chain `.register(...)` for the agent-specific tools.
pub fn base_tools<Ctx: Send + Sync + 'static>() -> ToolPool<Ctx> {
    ToolPool::new()
        .register(std::sync::Arc::new(FinishTool))
        .register(std::sync::Arc::new(ReportThinkingTool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn base_tools_include_finish_and_report_thinking() {
        let pool = base_tools::<()>();
        assert!(pool.contains(FINISH_TOOL));
        assert!(pool.contains(REPORT_THINKING_TOOL));
    }

    #[tokio::test]
    async fn report_thinking_acknowledges() {
        let pool = base_tools::<()>();
        let mut ctx = ();
        let result = pool
            .execute(REPORT_THINKING_TOOL, &mut ctx, json!({"thought": "considering options"}))
            .await
            .unwrap();
        assert_eq!(result["acknowledged"], true);
    }
}
