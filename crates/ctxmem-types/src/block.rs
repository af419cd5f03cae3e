use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{BlockId, SpaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    Folder,
    Page,
    Sop,
    Text,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Folder => "folder",
            BlockType::Page => "page",
            BlockType::Sop => "sop",
            BlockType::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "folder" => Some(BlockType::Folder),
            "page" => Some(BlockType::Page),
            "sop" => Some(BlockType::Sop),
            "text" => Some(BlockType::Text),
            _ => None,
        }
    }

    /// Path blocks = {folder, page}; content blocks = {sop, text}.
    pub fn is_path_block(&self) -> bool {
        matches!(self, BlockType::Folder | BlockType::Page)
    }

    pub fn is_content_block(&self) -> bool {
        matches!(self, BlockType::Sop | BlockType::Text)
    }

    /// Validates the §3 parent-type table. `parent` is `None` for a
    /// top-level block.
    pub fn parent_allowed(&self, parent: Option<BlockType>) -> bool {
        match self {
            BlockType::Folder => matches!(parent, None | Some(BlockType::Folder)),
            BlockType::Page => matches!(parent, None | Some(BlockType::Folder)),
            BlockType::Sop => matches!(parent, Some(BlockType::Page)),
            BlockType::Text => matches!(parent, Some(BlockType::Page)),
        }
    }
}

pub const PATH_BLOCK_TYPES: [BlockType; 2] = [BlockType::Folder, BlockType::Page];
pub const CONTENT_BLOCK_TYPES: [BlockType; 2] = [BlockType::Sop, BlockType::Text];

/// Node of the space tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub space_id: SpaceId,
    pub parent_id: Option<BlockId>,
    pub block_type: BlockType,
    pub title: String,
    pub props: Value,
    pub sort: i64,
    pub is_archived: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingPhase {
    Query,
    Document,
}

impl EmbeddingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingPhase::Query => "query",
            EmbeddingPhase::Document => "document",
        }
    }
}

/// Many-to-one against a block; a block may carry several embeddings (e.g.
/// title, content).
#[derive(Debug, Clone)]
pub struct BlockEmbedding {
    pub block_id: BlockId,
    pub phase: EmbeddingPhase,
    pub tag: String,
    pub vector: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_allows_null_or_folder_parent() {
        assert!(BlockType::Folder.parent_allowed(None));
        assert!(BlockType::Folder.parent_allowed(Some(BlockType::Folder)));
        assert!(!BlockType::Folder.parent_allowed(Some(BlockType::Page)));
    }

    #[test]
    fn page_allows_null_or_folder_parent() {
        assert!(BlockType::Page.parent_allowed(None));
        assert!(BlockType::Page.parent_allowed(Some(BlockType::Folder)));
        assert!(!BlockType::Page.parent_allowed(Some(BlockType::Page)));
    }

    #[test]
    fn sop_and_text_require_page_parent() {
        assert!(BlockType::Sop.parent_allowed(Some(BlockType::Page)));
        assert!(!BlockType::Sop.parent_allowed(Some(BlockType::Folder)));
        assert!(!BlockType::Sop.parent_allowed(None));
        assert!(BlockType::Text.parent_allowed(Some(BlockType::Page)));
        assert!(!BlockType::Text.parent_allowed(None));
    }
}

/// A block plus the cosine distance it matched a query at, returned by the
/// retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultBlockItem {
    pub block_id: BlockId,
    pub title: String,
    pub block_type: BlockType,
    pub path: Option<String>,
    pub distance: Option<f32>,
}

/// Result of an experience-search query (§4.J): the blocks the search
/// considered relevant, plus the agentic mode's synthesized answer. `fast`
/// mode always leaves `final_answer` `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceSearchResult {
    pub cited_blocks: Vec<SearchResultBlockItem>,
    pub final_answer: Option<String>,
}
