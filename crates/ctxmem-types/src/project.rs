use serde::{Deserialize, Serialize};

use crate::ids::ProjectId;

/// Tenant root. Owns tool-name rewrites, configuration, and spaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
}

/// Per-project named tool, referenced by `ToolSOP` rows. Name is normalized
/// to lowercase and unique per `(project_id, name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolReference {
    pub id: crate::ids::ToolReferenceId,
    pub project_id: ProjectId,
    pub name: String,
}

impl ToolReference {
    /// Normalize a raw tool name the way `write_sop_to_parent` requires:
    /// lowercased and trimmed. An empty result is the caller's signal to
    /// reject with `validation`.
    pub fn normalize_name(raw: &str) -> String {
        raw.trim().to_lowercase()
    }
}

/// A single tool-name rewrite requested via `POST /tool/rename`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRename {
    pub old_name: String,
    pub new_name: String,
}
