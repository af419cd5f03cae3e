use rusqlite::{params, Connection, OptionalExtension};

use ctxmem_types::{SessionId, SpaceId};

use crate::{Error, Result};

pub fn insert(conn: &Connection, id: SessionId, space_id: Option<SpaceId>) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (id, space_id) VALUES (?1, ?2)",
        params![id.to_string(), space_id.map(|s| s.to_string())],
    )?;
    Ok(())
}

pub fn fetch_space_id(conn: &Connection, session_id: SessionId) -> Result<Option<SpaceId>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT space_id FROM sessions WHERE id = ?1",
            params![session_id.to_string()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::not_found(format!("session {session_id} not found")))?;

    Ok(match raw {
        Some(s) => Some(s.parse().map_err(|_| rusqlite::Error::InvalidQuery)?),
        None => None,
    })
}

/// Links a session to a space. Per §3 this is a one-way, one-time
/// assignment: attempting to relink an already-linked session to a
/// *different* space is a `conflict`; relinking to the same space is a no-op.
pub fn link_space(conn: &Connection, session_id: SessionId, space_id: SpaceId) -> Result<()> {
    match fetch_space_id(conn, session_id)? {
        Some(existing) if existing == space_id => Ok(()),
        Some(existing) => Err(Error::conflict(format!(
            "session {session_id} is already linked to space {existing}"
        ))),
        None => {
            conn.execute(
                "UPDATE sessions SET space_id = ?1 WHERE id = ?2",
                params![space_id.to_string(), session_id.to_string()],
            )?;
            Ok(())
        }
    }
}

/// `{space_digested_count, not_space_digested_count}` over non-planning
/// `success` tasks; `(0, 0)` if the session has no linked space (§6).
pub fn get_learning_status(conn: &Connection, session_id: SessionId) -> Result<(i64, i64)> {
    if fetch_space_id(conn, session_id)?.is_none() {
        return Ok((0, 0));
    }

    let digested: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks
         WHERE session_id = ?1 AND is_planning_task = 0 AND task_status = 'success'
           AND space_digested = 1",
        params![session_id.to_string()],
        |row| row.get(0),
    )?;
    let not_digested: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks
         WHERE session_id = ?1 AND is_planning_task = 0 AND task_status = 'success'
           AND space_digested = 0",
        params![session_id.to_string()],
        |row| row.get(0),
    )?;

    Ok((digested, not_digested))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::task;
    use crate::Database;
    use ctxmem_types::TaskData;

    #[test]
    fn relink_to_different_space_is_conflict() -> Result<()> {
        let db = Database::open_in_memory()?;
        let session_id = SessionId::new();
        insert(db.conn(), session_id, None)?;

        let project = ctxmem_types::Project {
            id: ctxmem_types::ProjectId::new(),
            name: "acme".into(),
        };
        crate::queries::project::insert(db.conn(), &project)?;

        let space_a = SpaceId::new();
        crate::queries::space::insert(db.conn(), space_a, project.id)?;
        link_space(db.conn(), session_id, space_a)?;

        let space_b = SpaceId::new();
        crate::queries::space::insert(db.conn(), space_b, project.id)?;
        assert!(link_space(db.conn(), session_id, space_b).is_err());
        Ok(())
    }

    #[test]
    fn learning_status_zero_when_unlinked() -> Result<()> {
        let db = Database::open_in_memory()?;
        let session_id = SessionId::new();
        insert(db.conn(), session_id, None)?;
        assert_eq!(get_learning_status(db.conn(), session_id)?, (0, 0));
        Ok(())
    }

    #[test]
    fn learning_status_counts_digested_success_tasks() -> Result<()> {
        let db = Database::open_in_memory()?;
        let project = ctxmem_types::Project {
            id: ctxmem_types::ProjectId::new(),
            name: "acme".into(),
        };
        crate::queries::project::insert(db.conn(), &project)?;
        let space_id = SpaceId::new();
        crate::queries::space::insert(db.conn(), space_id, project.id)?;
        let session_id = SessionId::new();
        insert(db.conn(), session_id, Some(space_id))?;

        let t1 = task::insert_at(db.conn(), session_id, 1, false, TaskData::default())?;
        task::set_status(db.conn(), t1, ctxmem_types::TaskStatus::Success)?;
        task::set_space_digested(db.conn(), t1, true)?;

        let t2 = task::insert_at(db.conn(), session_id, 2, false, TaskData::default())?;
        task::set_status(db.conn(), t2, ctxmem_types::TaskStatus::Success)?;

        assert_eq!(get_learning_status(db.conn(), session_id)?, (1, 1));
        Ok(())
    }
}
