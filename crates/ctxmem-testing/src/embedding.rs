//! A deterministic `EmbeddingClient`: a fixed-dimension bag-of-words hash so
//! overlapping vocabulary between a query and a document lands close in
//! cosine distance without depending on a real embedding provider.

use async_trait::async_trait;
use ctxmem_llm::{EmbeddingClient, EmbeddingPhase, Result};

const DIM: usize = 32;

fn hash_word(word: &str) -> usize {
    let mut h: u64 = 1469598103934665603;
    for byte in word.as_bytes() {
        h ^= *byte as u64;
        h = h.wrapping_mul(1099511628211);
    }
    (h % DIM as u64) as usize
}

fn embed_one(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIM];
    for word in text.to_lowercase().split_whitespace() {
        vector[hash_word(word)] += 1.0;
    }
    vector
}

pub struct FakeEmbeddingClient;

#[async_trait]
impl EmbeddingClient for FakeEmbeddingClient {
    async fn embed(&self, texts: &[String], _phase: EmbeddingPhase) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_embeds_identically() {
        let client = FakeEmbeddingClient;
        let vectors = client
            .embed(&["jwt validation".to_string(), "jwt validation".to_string()], EmbeddingPhase::Document)
            .await
            .unwrap();
        assert_eq!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn shared_vocabulary_is_closer_than_disjoint() {
        let client = FakeEmbeddingClient;
        let vectors = client
            .embed(
                &[
                    "jwt validation with rotating secret".to_string(),
                    "jwt validation using hs256".to_string(),
                    "invoice payment processing".to_string(),
                ],
                EmbeddingPhase::Document,
            )
            .await
            .unwrap();

        let close = ctxmem_store::queries::embedding::cosine_distance(&vectors[0], &vectors[1]);
        let far = ctxmem_store::queries::embedding::cosine_distance(&vectors[0], &vectors[2]);
        assert!(close < far);
    }
}
