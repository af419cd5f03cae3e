mod client;
mod embedding;
mod error;
mod retry;
mod types;

pub use client::{HttpLlmClient, LlmClient};
pub use embedding::{EmbeddingClient, EmbeddingPhase, HttpEmbeddingClient};
pub use error::{Error, Result};
pub use retry::RetryConfig;
