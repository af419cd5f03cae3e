//! Retrieval Engine (§4.L): embed a query, fetch the nearest content/path
//! blocks from storage, dedupe, and cut to `topk`.

use std::collections::HashSet;

use ctxmem_llm::{EmbeddingClient, EmbeddingPhase};
use ctxmem_store::queries::block::fetch_block;
use ctxmem_store::queries::embedding::nearest;
use ctxmem_types::{Block, BlockType, Result, SearchResultBlockItem, SpaceId, PATH_BLOCK_TYPES};
use rusqlite::Connection;

use crate::handle::DbHandle;

/// Reconstructs the `/`-joined path of path-block ancestors leading to
/// `block` (inclusive of `block` itself when it is a path block). Content
/// blocks (sop/text) always live under a page, so their path is their
/// parent chain with their own title omitted.
pub(crate) fn block_path(conn: &Connection, block: &Block) -> Result<Option<String>> {
    let mut titles = Vec::new();
    if block.block_type.is_path_block() {
        titles.push(block.title.clone());
    }

    let mut parent_id = block.parent_id;
    while let Some(id) = parent_id {
        let parent = fetch_block(conn, id)?;
        titles.push(parent.title.clone());
        parent_id = parent.parent_id;
    }

    if titles.is_empty() {
        return Ok(None);
    }
    titles.reverse();
    Ok(Some(titles.join("/")))
}

/// `search_blocks(space, query_text, block_types, topk, threshold,
/// fetch_ratio)`: embed → fetch `ceil(topk * fetch_ratio)` nearest pairs →
/// cut by `threshold` → dedupe by lowest distance → truncate to `topk`.
pub async fn search_blocks(
    db: &DbHandle,
    embedder: &dyn EmbeddingClient,
    space_id: SpaceId,
    query_text: &str,
    block_types: &[BlockType],
    topk: usize,
    threshold: f32,
    fetch_ratio: f32,
) -> Result<Vec<SearchResultBlockItem>> {
    let vectors = embedder
        .embed(&[query_text.to_string()], EmbeddingPhase::Query)
        .await
        .map_err(ctxmem_types::Error::from)?;
    let query_vector = vectors
        .into_iter()
        .next()
        .ok_or_else(|| ctxmem_types::Error::internal("embedding client returned no vectors"))?;

    let fetch_limit = ((topk as f32) * fetch_ratio).ceil().max(topk as f32) as usize;

    let conn = db.lock().await;
    let pairs = nearest(conn.conn(), space_id, block_types, &query_vector, fetch_limit)?;

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for (block, distance) in pairs {
        if distance > threshold {
            continue;
        }
        if !seen.insert(block.id) {
            continue;
        }
        let path = block_path(conn.conn(), &block)?;
        out.push(SearchResultBlockItem {
            block_id: block.id,
            title: block.title.clone(),
            block_type: block.block_type,
            path,
            distance: Some(distance),
        });
        if out.len() >= topk {
            break;
        }
    }
    Ok(out)
}

/// `semantic_glob`: search over path blocks (folder/page titles).
pub async fn search_path_blocks(
    db: &DbHandle,
    embedder: &dyn EmbeddingClient,
    space_id: SpaceId,
    query_text: &str,
    topk: usize,
    threshold: f32,
    fetch_ratio: f32,
) -> Result<Vec<SearchResultBlockItem>> {
    search_blocks(db, embedder, space_id, query_text, &PATH_BLOCK_TYPES, topk, threshold, fetch_ratio).await
}

/// `semantic_grep`: search over content blocks (sop/text bodies).
pub async fn search_content_blocks(
    db: &DbHandle,
    embedder: &dyn EmbeddingClient,
    space_id: SpaceId,
    query_text: &str,
    topk: usize,
    threshold: f32,
    fetch_ratio: f32,
) -> Result<Vec<SearchResultBlockItem>> {
    search_blocks(
        db,
        embedder,
        space_id,
        query_text,
        &ctxmem_types::CONTENT_BLOCK_TYPES,
        topk,
        threshold,
        fetch_ratio,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctxmem_store::queries::block::create_path_block;
    use ctxmem_testing::{seeded_world, FakeEmbeddingClient};
    use serde_json::Value;

    async fn embed_and_store(db: &DbHandle, embedder: &FakeEmbeddingClient, block_id: ctxmem_types::BlockId, text: &str) {
        let vectors = embedder.embed(&[text.to_string()], EmbeddingPhase::Document).await.unwrap();
        let conn = db.lock().await;
        ctxmem_store::queries::embedding::insert(conn.conn(), block_id, ctxmem_types::EmbeddingPhase::Document, "title", &vectors[0]).unwrap();
    }

    #[tokio::test]
    async fn dedupes_and_cuts_to_topk() {
        let world = seeded_world().unwrap();
        let page = create_path_block(world.db.conn(), world.space_id, "Github", Value::Null, None, BlockType::Page).unwrap();
        let sop_a = ctxmem_store::queries::block::write_sop_to_parent(
            world.db.conn(),
            world.space_id,
            page,
            &ctxmem_types::SopData {
                use_when: "star a repo on github".into(),
                preferences: "confirm before starring".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let sop_b = ctxmem_store::queries::block::write_sop_to_parent(
            world.db.conn(),
            world.space_id,
            page,
            &ctxmem_types::SopData {
                use_when: "rotate a database password".into(),
                preferences: "stage new password first".into(),
                ..Default::default()
            },
        )
        .unwrap();

        let db: DbHandle = std::sync::Arc::new(tokio::sync::Mutex::new(world.db));
        let embedder = FakeEmbeddingClient;
        embed_and_store(&db, &embedder, sop_a, "star a repo on github").await;
        embed_and_store(&db, &embedder, sop_b, "rotate a database password").await;

        let results = search_content_blocks(&db, &embedder, world.space_id, "star a github repo", 1, 1.5, 4.0)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].block_id, sop_a);
        assert_eq!(results[0].path.as_deref(), Some("Github"));
    }
}
