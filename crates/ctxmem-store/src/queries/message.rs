use rusqlite::{params, Connection, OptionalExtension};

use ctxmem_types::{Message, MessageId, MessageRole, SessionId, TaskId};

use crate::{Error, Result};

const MESSAGE_COLUMNS: &str = "id, session_id, role, parts, task_id";

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let session_id: String = row.get(1)?;
    let role: String = row.get(2)?;
    let parts: String = row.get(3)?;
    let task_id: Option<String> = row.get(4)?;

    Ok(Message {
        id: id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        session_id: session_id.parse().map_err(|_| rusqlite::Error::InvalidQuery)?,
        role: MessageRole::parse(&role).ok_or(rusqlite::Error::InvalidQuery)?,
        parts: serde_json::from_str(&parts).unwrap_or(serde_json::Value::Null),
        task_id: task_id
            .map(|s| s.parse())
            .transpose()
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
    })
}

pub fn insert(conn: &Connection, message: &Message) -> Result<()> {
    conn.execute(
        &format!("INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
        params![
            message.id.to_string(),
            message.session_id.to_string(),
            message.role.as_str(),
            serde_json::to_string(&message.parts)?,
            message.task_id.map(|t| t.to_string()),
        ],
    )?;
    Ok(())
}

pub fn fetch(conn: &Connection, id: MessageId) -> Result<Message> {
    conn.query_row(
        &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
        params![id.to_string()],
        row_to_message,
    )
    .optional()?
    .ok_or_else(|| Error::not_found(format!("message {id} not found")))
}

/// Resolves the message ids a `NewTaskComplete`/`InsertNewMessage` batch
/// names, in the order given, for the Task-Extraction "current messages"
/// prompt section (§4.G).
pub fn fetch_many(conn: &Connection, ids: &[MessageId]) -> Result<Vec<Message>> {
    ids.iter().map(|id| fetch(conn, *id)).collect()
}

pub fn list_for_task(conn: &Connection, task_id: TaskId) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE task_id = ?1"))?;
    let rows = stmt
        .query_map(params![task_id.to_string()], row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The batch a session "flush" hands to the Task-Extraction Agent: every
/// message for this session not yet linked to a task, oldest first.
pub fn list_unassigned(conn: &Connection, session_id: SessionId) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1 AND task_id IS NULL ORDER BY rowid"
    ))?;
    let rows = stmt
        .query_map(params![session_id.to_string()], row_to_message)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::session;
    use crate::Database;
    use ctxmem_types::{MessageRole, SessionId};

    #[test]
    fn insert_and_fetch_round_trips() -> Result<()> {
        let db = Database::open_in_memory()?;
        let session_id = SessionId::new();
        session::insert(db.conn(), session_id, None)?;
        let message = Message {
            id: MessageId::new(),
            session_id,
            role: MessageRole::User,
            parts: serde_json::json!("hello"),
            task_id: None,
        };
        insert(db.conn(), &message)?;
        let fetched = fetch(db.conn(), message.id)?;
        assert_eq!(fetched.role, MessageRole::User);
        assert_eq!(fetched.parts, serde_json::json!("hello"));
        Ok(())
    }
}
