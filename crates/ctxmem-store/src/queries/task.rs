use rusqlite::{params, Connection, OptionalExtension};

use ctxmem_types::{Error as TypesError, SessionId, Task, TaskData, TaskId, TaskStatus};

use crate::{Error, Result};

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let id: String = row.get(0)?;
    let session_id: String = row.get(1)?;
    let order: i64 = row.get(2)?;
    let status: String = row.get(3)?;
    let is_planning: bool = row.get(4)?;
    let space_digested: bool = row.get(5)?;
    let data: String = row.get(6)?;

    let data: TaskData = serde_json::from_str(&data).unwrap_or_default();

    Ok(Task {
        id: id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        session_id: session_id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        order,
        status: TaskStatus::parse(&status).ok_or(rusqlite::Error::InvalidQuery)?,
        is_planning,
        space_digested,
        data,
        raw_message_ids: Vec::new(),
    })
}

const TASK_COLUMNS: &str =
    "id, session_id, task_order, task_status, is_planning_task, space_digested, task_data";

/// Inserts a task at an exact `order`, with no shifting of siblings. Used by
/// `insert_after` once the slot has been vacated, and directly by callers
/// that already know the order is free (e.g. the planning task, which always
/// takes `order = 0`).
pub fn insert_at(
    conn: &Connection,
    session_id: SessionId,
    order: i64,
    is_planning: bool,
    data: TaskData,
) -> Result<TaskId> {
    let id = TaskId::new();
    conn.execute(
        &format!(
            "INSERT INTO tasks ({TASK_COLUMNS}) VALUES (?1, ?2, ?3, 'pending', ?4, 0, ?5)"
        ),
        params![
            id.to_string(),
            session_id.to_string(),
            order,
            is_planning,
            serde_json::to_string(&data)?,
        ],
    )?;
    Ok(id)
}

/// `insert_task(after_order, task_description)` from §4.G: allocates
/// `after_order + 1`, shifting every task whose order is `> after_order` up
/// by one via the two-phase negative-range resort (§4.B, §9).
pub fn insert_after(
    conn: &Connection,
    session_id: SessionId,
    after_order: i64,
    task_description: String,
) -> Result<TaskId> {
    let sid = session_id.to_string();

    conn.execute(
        "UPDATE tasks SET task_order = -(task_order) - 1
         WHERE session_id = ?1 AND task_order > ?2",
        params![sid, after_order],
    )?;
    conn.execute(
        "UPDATE tasks SET task_order = -task_order WHERE session_id = ?1 AND task_order < 0",
        params![sid],
    )?;

    insert_at(
        conn,
        session_id,
        after_order + 1,
        false,
        TaskData {
            task_description,
            ..Default::default()
        },
    )
}

pub fn fetch(conn: &Connection, session_id: SessionId, order: i64) -> Result<Task> {
    conn.query_row(
        &format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE session_id = ?1 AND task_order = ?2"
        ),
        params![session_id.to_string(), order],
        row_to_task,
    )
    .optional()?
    .ok_or_else(|| Error::not_found(format!("task order {order} not found in session {session_id}")))
}

pub fn fetch_by_id(conn: &Connection, task_id: TaskId) -> Result<Task> {
    conn.query_row(
        &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
        params![task_id.to_string()],
        row_to_task,
    )
    .optional()?
    .ok_or_else(|| Error::not_found(format!("task {task_id} not found")))
}

/// Non-planning tasks in a session, ordered oldest-first.
pub fn list_non_planning(conn: &Connection, session_id: SessionId) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TASK_COLUMNS} FROM tasks
         WHERE session_id = ?1 AND is_planning_task = 0
         ORDER BY task_order ASC"
    ))?;
    let rows = stmt
        .query_map(params![session_id.to_string()], row_to_task)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Finds (or lazily creates) the session's planning task (`order = 0`,
/// `is_planning = true`). §4.G: `append_messages_to_planning_section`.
pub fn ensure_planning_task(conn: &Connection, session_id: SessionId) -> Result<TaskId> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT id FROM tasks WHERE session_id = ?1 AND is_planning_task = 1",
            params![session_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?);
    }

    insert_at(conn, session_id, 0, true, TaskData::default())
}

pub fn set_status(conn: &Connection, task_id: TaskId, next: TaskStatus) -> Result<()> {
    let task = fetch_by_id(conn, task_id)?;
    if !task.status.can_transition_to(next) {
        return Err(TypesError::validation(format!(
            "task {task_id} cannot transition from {:?} to {:?}",
            task.status, next
        ))
        .into());
    }
    conn.execute(
        "UPDATE tasks SET task_status = ?1 WHERE id = ?2",
        params![next.as_str(), task_id.to_string()],
    )?;
    Ok(())
}

pub fn set_space_digested(conn: &Connection, task_id: TaskId, digested: bool) -> Result<()> {
    conn.execute(
        "UPDATE tasks SET space_digested = ?1 WHERE id = ?2",
        params![digested, task_id.to_string()],
    )?;
    Ok(())
}

/// `update_task(task_order, ?task_description, ?status, ?data_patch)` from
/// §4.G.
pub fn update_task(
    conn: &Connection,
    session_id: SessionId,
    order: i64,
    task_description: Option<String>,
    status: Option<TaskStatus>,
    data_patch: Option<TaskData>,
) -> Result<()> {
    let mut task = fetch(conn, session_id, order)?;

    if let Some(next) = status {
        if !task.status.can_transition_to(next) {
            return Err(TypesError::validation(format!(
                "task {order} cannot transition from {:?} to {:?}",
                task.status, next
            ))
            .into());
        }
        task.status = next;
    }
    if let Some(desc) = task_description {
        task.data.task_description = desc;
    }
    if let Some(patch) = data_patch {
        if !patch.progresses.is_empty() {
            task.data.progresses.extend(patch.progresses);
        }
        if !patch.user_preferences.is_empty() {
            task.data.user_preferences.extend(patch.user_preferences);
        }
        if patch.sop_thinking.is_some() {
            task.data.sop_thinking = patch.sop_thinking;
        }
    }

    conn.execute(
        "UPDATE tasks SET task_status = ?1, task_data = ?2 WHERE id = ?3",
        params![
            task.status.as_str(),
            serde_json::to_string(&task.data)?,
            task.id.to_string()
        ],
    )?;
    Ok(())
}

/// `append_messages_to_task(task_order, message_indices, progress_summary,
/// ?user_preference)`: the agent resolves indices to message ids before
/// calling down into the store. Rejects a `success` task.
pub fn append_messages_to_task(
    conn: &Connection,
    session_id: SessionId,
    order: i64,
    message_ids: &[ctxmem_types::MessageId],
    progress_summary: String,
    user_preference: Option<String>,
) -> Result<()> {
    let task = fetch(conn, session_id, order)?;
    if task.status == TaskStatus::Success {
        return Err(TypesError::validation(format!(
            "task {order} is already success and cannot accept new messages"
        ))
        .into());
    }

    for message_id in message_ids {
        conn.execute(
            "UPDATE messages SET task_id = ?1 WHERE id = ?2",
            params![task.id.to_string(), message_id.to_string()],
        )?;
    }

    let mut data = task.data;
    data.progresses.push(progress_summary);
    if let Some(pref) = user_preference {
        data.user_preferences.push(pref);
    }

    conn.execute(
        "UPDATE tasks SET task_data = ?1 WHERE id = ?2",
        params![serde_json::to_string(&data)?, task.id.to_string()],
    )?;
    Ok(())
}

pub fn append_messages_to_planning_section(
    conn: &Connection,
    session_id: SessionId,
    message_ids: &[ctxmem_types::MessageId],
) -> Result<()> {
    let planning_id = ensure_planning_task(conn, session_id)?;
    for message_id in message_ids {
        conn.execute(
            "UPDATE messages SET task_id = ?1 WHERE id = ?2",
            params![planning_id.to_string(), message_id.to_string()],
        )?;
    }
    Ok(())
}

/// Last `limit` progress lines across the most recent non-planning tasks,
/// newest-last, for the Task-Extraction "previous progress" prompt section
/// (§4.G; default `limit` is `CoreConfig::task_agent_previous_progress_num`).
pub fn recent_progress_lines(
    conn: &Connection,
    session_id: SessionId,
    limit: usize,
) -> Result<Vec<String>> {
    let tasks = list_non_planning(conn, session_id)?;
    let mut lines: Vec<String> = tasks
        .iter()
        .flat_map(|t| t.data.progresses.iter().cloned())
        .collect();
    if lines.len() > limit {
        lines = lines.split_off(lines.len() - limit);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{session, space};
    use crate::Database;
    use ctxmem_types::{ProjectId, SpaceId};

    fn seeded_session(db: &Database) -> SessionId {
        let project = ctxmem_types::Project {
            id: ProjectId::new(),
            name: "acme".into(),
        };
        crate::queries::project::insert(db.conn(), &project).unwrap();
        let space_id = SpaceId::new();
        space::insert(db.conn(), space_id, project.id).unwrap();
        let session_id = SessionId::new();
        session::insert(db.conn(), session_id, Some(space_id)).unwrap();
        session_id
    }

    #[test]
    fn insert_after_shifts_successors_without_gaps() -> Result<()> {
        let db = Database::open_in_memory()?;
        let session_id = seeded_session(&db);

        insert_at(db.conn(), session_id, 1, false, TaskData {
            task_description: "A".into(),
            ..Default::default()
        })?;
        insert_at(db.conn(), session_id, 2, false, TaskData {
            task_description: "B".into(),
            ..Default::default()
        })?;
        set_status(db.conn(), fetch(db.conn(), session_id, 1)?.id, TaskStatus::Running)?;
        set_status(db.conn(), fetch(db.conn(), session_id, 1)?.id, TaskStatus::Success)?;

        insert_after(db.conn(), session_id, 2, "C".into())?;

        let tasks = list_non_planning(db.conn(), session_id)?;
        let orders: Vec<i64> = tasks.iter().map(|t| t.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(tasks[2].data.task_description, "C");
        assert_eq!(tasks[0].status, TaskStatus::Success);
        Ok(())
    }

    #[test]
    fn success_task_rejects_new_messages() -> Result<()> {
        let db = Database::open_in_memory()?;
        let session_id = seeded_session(&db);
        let task_id = insert_at(db.conn(), session_id, 1, false, TaskData::default())?;
        set_status(db.conn(), task_id, TaskStatus::Success)?;

        let result = append_messages_to_task(
            db.conn(),
            session_id,
            1,
            &[],
            "progress".into(),
            None,
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn planning_task_created_lazily_once() -> Result<()> {
        let db = Database::open_in_memory()?;
        let session_id = seeded_session(&db);
        let first = ensure_planning_task(db.conn(), session_id)?;
        let second = ensure_planning_task(db.conn(), session_id)?;
        assert_eq!(first, second);
        Ok(())
    }
}
