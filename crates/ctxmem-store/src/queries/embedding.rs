use rusqlite::params;
use rusqlite::Connection;

use ctxmem_types::{Block, BlockType, EmbeddingPhase, SpaceId};

use crate::queries::block::row_to_block;
use crate::Result;

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Cosine distance = `1 - cosine_similarity`, range `[0, 2]` (§3 glossary).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 2.0;
    }
    1.0 - (dot / (norm_a * norm_b))
}

pub fn insert(
    conn: &Connection,
    id: ctxmem_types::BlockId,
    phase: EmbeddingPhase,
    tag: &str,
    vector: &[f32],
) -> Result<()> {
    conn.execute(
        "INSERT INTO block_embeddings (id, block_id, phase, tag, vector) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            uuid::Uuid::new_v4().to_string(),
            id.to_string(),
            phase.as_str(),
            tag,
            encode_vector(vector),
        ],
    )?;
    Ok(())
}

/// Scans every non-archived embedding for `block_type in block_types` under
/// `space_id`, computes cosine distance against `query_vector`, and returns
/// `(block, distance)` pairs sorted ascending by distance, capped at
/// `fetch_limit` (the Retrieval Engine's `ceil(topk * fetch_ratio)`). The
/// caller is responsible for dedup-by-lowest-distance and the final
/// `threshold` cut (§4.L) — this is the storage-layer primitive, not the
/// full `search_blocks` algorithm.
pub fn nearest(
    conn: &Connection,
    space_id: SpaceId,
    block_types: &[BlockType],
    query_vector: &[f32],
    fetch_limit: usize,
) -> Result<Vec<(Block, f32)>> {
    let placeholders: Vec<String> = block_types.iter().map(|t| format!("'{}'", t.as_str())).collect();
    let type_filter = placeholders.join(", ");

    let query = format!(
        "SELECT b.id, b.space_id, b.parent_id, b.block_type, b.title, b.props, b.sort, b.is_archived, e.vector
         FROM block_embeddings e
         JOIN blocks b ON b.id = e.block_id
         WHERE b.space_id = ?1 AND b.is_archived = 0 AND b.block_type IN ({type_filter})"
    );

    let mut stmt = conn.prepare(&query)?;
    let mut rows = stmt.query(params![space_id.to_string()])?;

    let mut scored: Vec<(Block, f32)> = Vec::new();
    while let Some(row) = rows.next()? {
        let block = row_to_block(row)?;
        let vector_bytes: Vec<u8> = row.get(8)?;
        let vector = decode_vector(&vector_bytes);
        let distance = cosine_distance(query_vector, &vector);
        scored.push((block, distance));
    }

    scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(fetch_limit);
    Ok(scored)
}
