//! Chat-completion client (§4.E): a single non-streaming call per turn.
//! The agent loop (ctxmem-core) drives the multi-turn tool-call exchange;
//! this crate only speaks one request/response pair at a time.

use std::time::Duration;

use async_trait::async_trait;
use ctxmem_types::{AssistantMessage, ChatMessage, ToolSchema};

use crate::retry::{with_backoff, RetryConfig};
use crate::types::{ApiErrorBody, ChatRequest, ChatResponse, WireMessage};
use crate::{Error, Result};

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<AssistantMessage>;
}

pub struct HttpLlmClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl HttpLlmClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            retry: RetryConfig::default(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    async fn send(&self, request: &ChatRequest) -> Result<AssistantMessage> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| if e.is_timeout() { Error::Timeout } else { Error::Http(e) })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .map(|e| e.message)
                .filter(|m| !m.is_empty())
                .unwrap_or(body);
            return Err(Error::api(format!("{status}: {message}")));
        }

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::api("empty choices in response"))?;
        Ok(choice.message.into())
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[ToolSchema],
    ) -> Result<AssistantMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage {
            role: "system".to_string(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
        messages.extend(history.iter().map(WireMessage::from));

        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            stream: false,
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.to_vec())
            },
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        with_backoff(&self.retry, || self.send(&request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trims_trailing_slash() {
        let client = HttpLlmClient::new("https://api.example.com/v1/", "key", "gpt-4o-mini");
        assert_eq!(client.base_url.trim_end_matches('/'), "https://api.example.com/v1");
    }
}
