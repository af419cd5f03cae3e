//! Generic tool-calling loop (§4.F): one shared skeleton parameterized over
//! a `ToolPool<Ctx>` and a `CtxBuilder<Ctx>`, instead of duplicating the
//! loop body in each agent.

use std::collections::HashSet;

use async_trait::async_trait;
use ctxmem_llm::LlmClient;
use ctxmem_types::{ChatMessage, Result};
use serde_json::json;
use tracing::{debug, warn};

use crate::base_tools::FINISH_TOOL;
use crate::tool::ToolPool;

/// Builds (or rebuilds) the mutable context a tool call operates on. Kept
/// as a trait rather than a plain closure so it can hold async resources
/// (a DB connection, in-flight query state) the way each agent's own ctx
/// type requires.
#[async_trait]
pub trait CtxBuilder<Ctx>: Send + Sync {
    async fn build(&self) -> Result<Ctx>;
}

/// Outcome of one `run_agent_loop` call.
#[derive(Debug)]
pub enum AgentOutcome {
    /// The model called `finish`.
    Finished { summary: Option<String> },
    /// The model stopped emitting tool calls and returned plain content.
    NoToolCall { content: Option<String> },
}

/// Run the tool-calling loop: call the LLM, execute any tool calls it
/// requests, append results, and repeat until `finish` is called, the
/// model stops requesting tools, or `max_iterations` is exhausted.
///
/// `needs_fresh_ctx` names the tools whose side effects require a fresh
/// `Ctx` before the next LLM turn (only Task-Extraction uses this; other
/// agents pass an empty set and rebuild only when `ctx_builder` is invoked
/// for the first time).
pub async fn run_agent_loop<Ctx: Send + Sync>(
    llm: &dyn LlmClient,
    system: &str,
    user_content: &str,
    pool: &ToolPool<Ctx>,
    ctx_builder: &dyn CtxBuilder<Ctx>,
    needs_fresh_ctx: &HashSet<&'static str>,
    max_iterations: usize,
) -> Result<AgentOutcome> {
    let tools = pool.schemas();
    let mut history: Vec<ChatMessage> = vec![ChatMessage::user(user_content)];
    let mut ctx = ctx_builder.build().await?;

    for iteration in 0..max_iterations {
        let assistant = llm
            .complete(system, &history, &tools)
            .await
            .map_err(ctxmem_types::Error::from)?;
        history.push(ChatMessage::from_assistant(&assistant));

        if assistant.tool_calls.is_empty() {
            debug!(iteration, "agent loop: no tool calls, returning text");
            return Ok(AgentOutcome::NoToolCall {
                content: assistant.content,
            });
        }

        let mut ctx_stale = false;
        let mut finish: Option<Option<String>> = None;
        for call in &assistant.tool_calls {
            let args = serde_json::from_str(&call.function.arguments).unwrap_or(serde_json::Value::Null);

            if call.function.name == FINISH_TOOL {
                let summary = args
                    .get("summary")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                let content = pool.execute(FINISH_TOOL, &mut ctx, args).await?.to_string();
                history.push(ChatMessage::tool(call.id.clone(), content));
                finish = Some(summary);
                continue;
            }

            let result = pool.execute(&call.function.name, &mut ctx, args).await;
            let content = match result {
                Ok(value) => value.to_string(),
                Err(err) if err.is_validation() => {
                    debug!(tool = %call.function.name, error = %err, "tool call rejected, letting model self-correct");
                    json!({"error": err.message}).to_string()
                }
                Err(err) => {
                    warn!(tool = %call.function.name, error = %err, "tool call failed, aborting agent");
                    return Err(err);
                }
            };
            history.push(ChatMessage::tool(call.id.clone(), content));

            if needs_fresh_ctx.contains(call.function.name.as_str()) {
                ctx_stale = true;
            }
        }

        if let Some(summary) = finish {
            return Ok(AgentOutcome::Finished { summary });
        }

        if ctx_stale {
            ctx = ctx_builder.build().await?;
        }
    }

    Err(ctxmem_types::Error::internal(format!(
        "agent loop exceeded max_iterations ({max_iterations})"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_tools::{base_tools, REPORT_THINKING_TOOL};
    use async_trait::async_trait;
    use ctxmem_types::{AssistantMessage, ToolCall, ToolCallFunction, ToolSchema};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct UnitCtxBuilder;

    #[async_trait]
    impl CtxBuilder<()> for UnitCtxBuilder {
        async fn build(&self) -> Result<()> {
            Ok(())
        }
    }

    struct ScriptedLlm {
        responses: Mutex<Vec<AssistantMessage>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _system: &str,
            _history: &[ChatMessage],
            _tools: &[ToolSchema],
        ) -> ctxmem_llm::Result<AssistantMessage> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            Ok(responses.remove(0))
        }
    }

    fn finish_call(summary: &str) -> AssistantMessage {
        AssistantMessage {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call-1".to_string(),
                function: ToolCallFunction {
                    name: FINISH_TOOL.to_string(),
                    arguments: json!({"summary": summary}).to_string(),
                },
            }],
        }
    }

    #[tokio::test]
    async fn stops_on_finish_call() {
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![finish_call("done")]),
            calls: AtomicUsize::new(0),
        };
        let pool = base_tools::<()>();
        let outcome = run_agent_loop(&llm, "system", "user", &pool, &UnitCtxBuilder, &HashSet::new(), 3)
            .await
            .unwrap();
        match outcome {
            AgentOutcome::Finished { summary } => assert_eq!(summary.as_deref(), Some("done")),
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    struct SpyTool {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl crate::tool::Tool<()> for SpyTool {
        fn schema(&self) -> ctxmem_types::ToolSchema {
            ctxmem_types::ToolSchema::new("spy", "records that it was called", json!({"type": "object"}))
        }

        async fn call(&self, _ctx: &mut (), _args: serde_json::Value) -> Result<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"acknowledged": true}))
        }
    }

    #[tokio::test]
    async fn finish_processes_sibling_tool_calls_in_the_same_turn_before_exiting() {
        let spy = Arc::new(SpyTool { calls: AtomicUsize::new(0) });
        let turn = AssistantMessage {
            content: None,
            tool_calls: vec![
                ToolCall {
                    id: "call-spy".to_string(),
                    function: ToolCallFunction {
                        name: "spy".to_string(),
                        arguments: "{}".to_string(),
                    },
                },
                ToolCall {
                    id: "call-finish".to_string(),
                    function: ToolCallFunction {
                        name: FINISH_TOOL.to_string(),
                        arguments: json!({"summary": "done"}).to_string(),
                    },
                },
            ],
        };
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![turn]),
            calls: AtomicUsize::new(0),
        };
        let pool = base_tools::<()>().register(spy.clone());
        let outcome = run_agent_loop(&llm, "system", "user", &pool, &UnitCtxBuilder, &HashSet::new(), 3)
            .await
            .unwrap();
        assert!(matches!(outcome, AgentOutcome::Finished { .. }));
        assert_eq!(spy.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_on_plain_text_response() {
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![AssistantMessage {
                content: Some("all done".to_string()),
                tool_calls: vec![],
            }]),
            calls: AtomicUsize::new(0),
        };
        let pool = base_tools::<()>();
        let outcome = run_agent_loop(&llm, "system", "user", &pool, &UnitCtxBuilder, &HashSet::new(), 3)
            .await
            .unwrap();
        match outcome {
            AgentOutcome::NoToolCall { content } => assert_eq!(content.as_deref(), Some("all done")),
            other => panic!("expected NoToolCall, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausting_max_iterations_is_an_error() {
        let looping_call = AssistantMessage {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call-n".to_string(),
                function: ToolCallFunction {
                    name: REPORT_THINKING_TOOL.to_string(),
                    arguments: json!({"thought": "still working"}).to_string(),
                },
            }],
        };
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![looping_call.clone(), looping_call.clone(), looping_call]),
            calls: AtomicUsize::new(0),
        };
        let pool = base_tools::<()>();
        let result = run_agent_loop(&llm, "system", "user", &pool, &UnitCtxBuilder, &HashSet::new(), 3).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mutating_tool_triggers_ctx_rebuild() {
        struct CountingCtxBuilder {
            builds: AtomicUsize,
        }

        #[async_trait]
        impl CtxBuilder<usize> for CountingCtxBuilder {
            async fn build(&self) -> Result<usize> {
                Ok(self.builds.fetch_add(1, Ordering::SeqCst))
            }
        }

        let mutating_call = AssistantMessage {
            content: None,
            tool_calls: vec![ToolCall {
                id: "call-m".to_string(),
                function: ToolCallFunction {
                    name: REPORT_THINKING_TOOL.to_string(),
                    arguments: json!({"thought": "mutating"}).to_string(),
                },
            }],
        };
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![mutating_call, finish_call("done")]),
            calls: AtomicUsize::new(0),
        };
        let pool = base_tools::<usize>();
        let builder = CountingCtxBuilder {
            builds: AtomicUsize::new(0),
        };
        let mut needs_fresh = HashSet::new();
        needs_fresh.insert(REPORT_THINKING_TOOL);

        run_agent_loop(&llm, "system", "user", &pool, &builder, &needs_fresh, 3)
            .await
            .unwrap();

        assert_eq!(builder.builds.load(Ordering::SeqCst), 2);
    }

    struct FailingTool;

    #[async_trait]
    impl crate::tool::Tool<()> for FailingTool {
        fn schema(&self) -> ctxmem_types::ToolSchema {
            ctxmem_types::ToolSchema::new("fail", "always fails", json!({"type": "object"}))
        }

        async fn call(&self, _ctx: &mut (), args: serde_json::Value) -> Result<serde_json::Value> {
            let kind = args.get("kind").and_then(|v| v.as_str()).unwrap_or("");
            if kind == "validation" {
                Err(ctxmem_types::Error::validation("bad input, try again"))
            } else {
                Err(ctxmem_types::Error::not_found("dependency missing"))
            }
        }
    }

    fn tool_call(name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call-f".to_string(),
            function: ToolCallFunction {
                name: name.to_string(),
                arguments: args.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn validation_error_self_corrects_instead_of_aborting() {
        let failing_call = AssistantMessage {
            content: None,
            tool_calls: vec![tool_call("fail", json!({"kind": "validation"}))],
        };
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![failing_call, finish_call("done")]),
            calls: AtomicUsize::new(0),
        };
        let pool = base_tools::<()>().register(std::sync::Arc::new(FailingTool));
        let outcome = run_agent_loop(&llm, "system", "user", &pool, &UnitCtxBuilder, &HashSet::new(), 3)
            .await
            .unwrap();
        assert!(matches!(outcome, AgentOutcome::Finished { .. }));
    }

    #[tokio::test]
    async fn non_validation_error_aborts_the_agent() {
        let failing_call = AssistantMessage {
            content: None,
            tool_calls: vec![tool_call("fail", json!({"kind": "not_found"}))],
        };
        let llm = ScriptedLlm {
            responses: Mutex::new(vec![failing_call]),
            calls: AtomicUsize::new(0),
        };
        let pool = base_tools::<()>().register(std::sync::Arc::new(FailingTool));
        let result = run_agent_loop(&llm, "system", "user", &pool, &UnitCtxBuilder, &HashSet::new(), 3).await;
        assert_eq!(result.unwrap_err().kind, ctxmem_types::ErrorKind::NotFound);
    }
}
