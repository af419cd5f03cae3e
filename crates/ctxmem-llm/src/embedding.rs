//! Batch embedding client (§4.D): `embed(texts, phase) -> vector[]`. Callers
//! treat the result as opaque and fixed-dim; the phase may select a
//! different model or prompt prefix on the provider side, which is why it
//! is passed through rather than folded into `texts`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::retry::{with_backoff, RetryConfig};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingPhase {
    Query,
    Document,
}

impl EmbeddingPhase {
    fn as_str(self) -> &'static str {
        match self {
            EmbeddingPhase::Query => "query",
            EmbeddingPhase::Document => "document",
        }
    }
}

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String], phase: EmbeddingPhase) -> Result<Vec<Vec<f32>>>;
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

pub struct HttpEmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    retry: RetryConfig,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            retry: RetryConfig::default(),
        }
    }

    async fn send(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| if e.is_timeout() { Error::Timeout } else { Error::Http(e) })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(format!("{status}: {body}")));
        }

        let mut parsed: EmbeddingResponse = response.json().await?;
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, texts: &[String], phase: EmbeddingPhase) -> Result<Vec<Vec<f32>>> {
        // `phase` is presently a provider-side hint only (some providers key
        // a distinct prompt prefix off it); OpenAI-compatible embeddings
        // endpoints take no such parameter, so it does not reach the wire.
        let _ = phase.as_str();
        with_backoff(&self.retry, || self.send(texts)).await
    }
}
