use rusqlite::{params, Connection, OptionalExtension};

use ctxmem_types::{Project, ProjectId, ToolReference, ToolReferenceId, ToolRename};

use crate::{Error, Result};

pub fn insert(conn: &Connection, project: &Project) -> Result<()> {
    conn.execute(
        "INSERT INTO projects (id, name) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET name = ?2",
        params![project.id.to_string(), &project.name],
    )?;
    Ok(())
}

pub fn fetch(conn: &Connection, id: ProjectId) -> Result<Project> {
    conn.query_row(
        "SELECT id, name FROM projects WHERE id = ?1",
        params![id.to_string()],
        row_to_project,
    )
    .optional()?
    .ok_or_else(|| Error::not_found(format!("project {id} not found")))
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let id: String = row.get(0)?;
    Ok(Project {
        id: id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        name: row.get(1)?,
    })
}

/// Upserts a `ToolReference` under `project_id`, normalizing the name per
/// `ToolReference::normalize_name`. Returns the (possibly pre-existing) id.
/// An empty normalized name is a `validation` error (§4.B).
pub fn upsert_tool_reference(
    conn: &Connection,
    project_id: ProjectId,
    raw_name: &str,
) -> Result<ToolReferenceId> {
    let name = ToolReference::normalize_name(raw_name);
    if name.is_empty() {
        return Err(ctxmem_types::Error::validation("tool name must not be blank").into());
    }

    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM tool_references WHERE project_id = ?1 AND name = ?2",
            params![project_id.to_string(), &name],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?);
    }

    let id = ToolReferenceId::new();
    conn.execute(
        "INSERT INTO tool_references (id, project_id, name) VALUES (?1, ?2, ?3)",
        params![id.to_string(), project_id.to_string(), &name],
    )?;
    Ok(id)
}

/// Applies a batch of `{old_name, new_name}` rewrites. A rename that lands
/// on a name not already in use retargets the existing `ToolReference` row
/// in place (the id, and therefore every `ToolSOP` that references it, is
/// untouched). A rename that collides with another tool already registered
/// under the same project collapses into that pre-existing `ToolReference`
/// instead: every `ToolSOP` pointing at the old row is re-pointed to the
/// pre-existing one, and the old row is dropped.
pub fn rename_tool(
    conn: &Connection,
    project_id: ProjectId,
    renames: &[ToolRename],
) -> Result<()> {
    for rename in renames {
        let old = ToolReference::normalize_name(&rename.old_name);
        let new = ToolReference::normalize_name(&rename.new_name);
        if new.is_empty() {
            return Err(ctxmem_types::Error::validation("new_name must not be blank").into());
        }

        let old_id: String = conn
            .query_row(
                "SELECT id FROM tool_references WHERE project_id = ?1 AND name = ?2",
                params![project_id.to_string(), &old],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| Error::not_found(format!("tool '{old}' not found")))?;

        let collision: Option<String> = conn
            .query_row(
                "SELECT id FROM tool_references WHERE project_id = ?1 AND name = ?2",
                params![project_id.to_string(), &new],
                |row| row.get(0),
            )
            .optional()?;

        match collision {
            Some(existing_id) if existing_id != old_id => {
                conn.execute(
                    "UPDATE tool_sops SET tool_ref_id = ?1 WHERE tool_ref_id = ?2",
                    params![&existing_id, &old_id],
                )?;
                conn.execute("DELETE FROM tool_references WHERE id = ?1", params![&old_id])?;
            }
            _ => {
                conn.execute(
                    "UPDATE tool_references SET name = ?1 WHERE id = ?2",
                    params![&new, &old_id],
                )?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    #[test]
    fn upsert_is_idempotent_and_normalizes() -> Result<()> {
        let db = Database::open_in_memory()?;
        let project = Project {
            id: ProjectId::new(),
            name: "acme".into(),
        };
        insert(db.conn(), &project)?;

        let a = upsert_tool_reference(db.conn(), project.id, "  Click ")?;
        let b = upsert_tool_reference(db.conn(), project.id, "click")?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn rejects_blank_tool_name() -> Result<()> {
        let db = Database::open_in_memory()?;
        let project = Project {
            id: ProjectId::new(),
            name: "acme".into(),
        };
        insert(db.conn(), &project)?;
        assert!(upsert_tool_reference(db.conn(), project.id, "   ").is_err());
        Ok(())
    }

    #[test]
    fn rename_onto_existing_tool_collapses_and_repoints_tool_sops() -> Result<()> {
        let db = Database::open_in_memory()?;
        let project = Project {
            id: ProjectId::new(),
            name: "acme".into(),
        };
        insert(db.conn(), &project)?;
        let space_id = ctxmem_types::SpaceId::new();
        crate::queries::space::insert(db.conn(), space_id, project.id)?;
        db.conn().execute(
            "INSERT INTO blocks (id, space_id, parent_id, block_type, title, props, sort) \
             VALUES ('block-1', ?1, NULL, 'page', 'p', '{}', 0)",
            rusqlite::params![space_id.to_string()],
        )?;
        let click_id = upsert_tool_reference(db.conn(), project.id, "click")?;
        let scroll_id = upsert_tool_reference(db.conn(), project.id, "scroll")?;
        db.conn().execute(
            "INSERT INTO tool_sops (id, block_id, tool_ref_id, action) VALUES ('sop-1', 'block-1', ?1, 'click it')",
            rusqlite::params![click_id.to_string()],
        )?;

        rename_tool(
            db.conn(),
            project.id,
            &[ToolRename {
                old_name: "click".into(),
                new_name: "scroll".into(),
            }],
        )?;

        let remaining: i64 = db.conn().query_row(
            "SELECT COUNT(*) FROM tool_references WHERE id = ?1",
            rusqlite::params![click_id.to_string()],
            |row| row.get(0),
        )?;
        assert_eq!(remaining, 0);

        let repointed: String = db.conn().query_row(
            "SELECT tool_ref_id FROM tool_sops WHERE id = 'sop-1'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(repointed, scroll_id.to_string());
        Ok(())
    }

    #[test]
    fn rename_onto_a_free_name_retargets_in_place() -> Result<()> {
        let db = Database::open_in_memory()?;
        let project = Project {
            id: ProjectId::new(),
            name: "acme".into(),
        };
        insert(db.conn(), &project)?;
        let click_id = upsert_tool_reference(db.conn(), project.id, "click")?;

        rename_tool(
            db.conn(),
            project.id,
            &[ToolRename {
                old_name: "click".into(),
                new_name: "tap".into(),
            }],
        )?;

        let renamed_id = upsert_tool_reference(db.conn(), project.id, "tap")?;
        assert_eq!(renamed_id, click_id);
        Ok(())
    }
}
