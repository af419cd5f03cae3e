use rusqlite::{params, Connection, OptionalExtension};

use ctxmem_types::{ProjectId, SpaceId};

use crate::{Error, Result};

pub fn insert(conn: &Connection, id: SpaceId, project_id: ProjectId) -> Result<()> {
    conn.execute(
        "INSERT INTO spaces (id, project_id) VALUES (?1, ?2)",
        params![id.to_string(), project_id.to_string()],
    )?;
    Ok(())
}

pub fn fetch_project_id(conn: &Connection, space_id: SpaceId) -> Result<ProjectId> {
    conn.query_row(
        "SELECT project_id FROM spaces WHERE id = ?1",
        params![space_id.to_string()],
        |row| row.get::<_, String>(0),
    )
    .optional()?
    .ok_or_else(|| Error::not_found(format!("space {space_id} not found")))?
    .parse()
    .map_err(|_| Error::Database(rusqlite::Error::InvalidQuery))
}
