//! A scripted `LlmClient` that replays a fixed sequence of assistant turns,
//! so agent tests can drive `run_agent_loop` deterministically without a
//! network call.

use std::sync::Mutex;

use async_trait::async_trait;
use ctxmem_llm::{Error, LlmClient, Result};
use ctxmem_types::{AssistantMessage, ChatMessage, ToolSchema};

pub struct FakeLlmClient {
    responses: Mutex<Vec<AssistantMessage>>,
}

impl FakeLlmClient {
    pub fn new(responses: Vec<AssistantMessage>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(&self, _system: &str, _history: &[ChatMessage], _tools: &[ToolSchema]) -> Result<AssistantMessage> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(Error::api("FakeLlmClient: no more scripted responses"));
        }
        Ok(responses.remove(0))
    }
}
