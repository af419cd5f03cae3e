//! Tool trait and pool (§4.C). Mirrors the OpenAI function-tool JSON shape
//! exactly, so a `ToolPool`'s `schemas()` can be handed straight to
//! `ctxmem_llm::LlmClient::complete`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ctxmem_types::{Result, ToolSchema};
use serde_json::{json, Value};

/// One callable tool, parameterized over the per-agent context type it
/// mutates (`Ctx` is e.g. the Task-Extraction agent's session/task handle).
#[async_trait]
pub trait Tool<Ctx>: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn call(&self, ctx: &mut Ctx, args: Value) -> Result<Value>;
}

/// Registry of tools available to one agent invocation, keyed by name.
pub struct ToolPool<Ctx> {
    tools: HashMap<String, Arc<dyn Tool<Ctx>>>,
}

impl<Ctx> ToolPool<Ctx> {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(mut self, tool: Arc<dyn Tool<Ctx>>) -> Self {
        let name = tool.schema().name().to_string();
        self.tools.insert(name, tool);
        self
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut entries: Vec<(String, ToolSchema)> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.schema()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, schema)| schema).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Per §4.C, an unknown tool name is not fatal: the registry hands back a
    /// tool-not-found response for the agent loop to append and continue on.
    pub async fn execute(&self, name: &str, ctx: &mut Ctx, args: Value) -> Result<Value> {
        let Some(tool) = self.tools.get(name).cloned() else {
            return Ok(json!({"error": format!("tool '{name}' not found")}));
        };
        tool.call(ctx, args).await
    }
}

impl<Ctx> Default for ToolPool<Ctx> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Tool<()> for Echo {
        fn schema(&self) -> ToolSchema {
            ToolSchema::new("echo", "echoes input back", json!({"type": "object"}))
        }

        async fn call(&self, _ctx: &mut (), args: Value) -> Result<Value> {
            Ok(args)
        }
    }

    #[tokio::test]
    async fn execute_dispatches_by_schema_name() {
        let pool = ToolPool::<()>::new().register(Arc::new(Echo));
        let mut ctx = ();
        let result = pool.execute("echo", &mut ctx, json!({"x": 1})).await.unwrap();
        assert_eq!(result, json!({"x": 1}));
    }

    #[tokio::test]
    async fn execute_unknown_tool_returns_not_found_response_instead_of_erroring() {
        let pool = ToolPool::<()>::new();
        let mut ctx = ();
        let result = pool.execute("missing", &mut ctx, json!({})).await.unwrap();
        assert!(result["error"].as_str().unwrap().contains("missing"));
    }

    #[test]
    fn schemas_sorted_by_name() {
        struct Zed;
        #[async_trait]
        impl Tool<()> for Zed {
            fn schema(&self) -> ToolSchema {
                ToolSchema::new("zed", "z", json!({"type": "object"}))
            }
            async fn call(&self, _ctx: &mut (), _args: Value) -> Result<Value> {
                Ok(Value::Null)
            }
        }

        let pool = ToolPool::<()>::new()
            .register(Arc::new(Zed))
            .register(Arc::new(Echo));
        let names: Vec<String> = pool.schemas().into_iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["echo".to_string(), "zed".to_string()]);
    }
}
