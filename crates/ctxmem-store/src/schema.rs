use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions)
pub const SCHEMA_VERSION: i32 = 1;

// Persisted state layout per spec §6. SQLite stands in for the Postgres
// store named there; `block_embeddings.vector` is a BLOB of little-endian
// f32s and cosine distance is computed in Rust rather than via a `<=>`
// operator (see queries::embedding).

pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS spaces (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            FOREIGN KEY (project_id) REFERENCES projects(id)
        );

        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            space_id TEXT,
            FOREIGN KEY (space_id) REFERENCES spaces(id)
        );

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            task_order INTEGER NOT NULL,
            task_status TEXT NOT NULL DEFAULT 'pending'
                CHECK (task_status IN ('success', 'failed', 'running', 'pending')),
            is_planning_task BOOLEAN NOT NULL DEFAULT 0,
            space_digested BOOLEAN NOT NULL DEFAULT 0,
            task_data TEXT NOT NULL,
            UNIQUE (session_id, task_order),
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );

        CREATE INDEX IF NOT EXISTS ix_tasks_session ON tasks(session_id);
        CREATE INDEX IF NOT EXISTS ix_tasks_session_status ON tasks(session_id, task_status);

        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'tool')),
            parts TEXT NOT NULL,
            task_id TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id),
            FOREIGN KEY (task_id) REFERENCES tasks(id)
        );

        CREATE INDEX IF NOT EXISTS ix_messages_session ON messages(session_id);
        CREATE INDEX IF NOT EXISTS ix_messages_task ON messages(task_id);

        CREATE TABLE IF NOT EXISTS blocks (
            id TEXT PRIMARY KEY,
            space_id TEXT NOT NULL,
            parent_id TEXT,
            block_type TEXT NOT NULL CHECK (block_type IN ('folder', 'page', 'sop', 'text')),
            title TEXT NOT NULL,
            props TEXT NOT NULL,
            sort INTEGER NOT NULL,
            is_archived BOOLEAN NOT NULL DEFAULT 0,
            UNIQUE (parent_id, sort),
            FOREIGN KEY (space_id) REFERENCES spaces(id),
            FOREIGN KEY (parent_id) REFERENCES blocks(id)
        );

        CREATE INDEX IF NOT EXISTS ix_blocks_space_type_archived
            ON blocks(space_id, block_type, is_archived);
        CREATE INDEX IF NOT EXISTS ix_blocks_parent ON blocks(parent_id);

        CREATE TABLE IF NOT EXISTS block_embeddings (
            id TEXT PRIMARY KEY,
            block_id TEXT NOT NULL,
            phase TEXT NOT NULL CHECK (phase IN ('query', 'document')),
            tag TEXT NOT NULL,
            vector BLOB NOT NULL,
            FOREIGN KEY (block_id) REFERENCES blocks(id)
        );

        CREATE INDEX IF NOT EXISTS ix_embeddings_block ON block_embeddings(block_id);

        CREATE TABLE IF NOT EXISTS tool_references (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            name TEXT NOT NULL,
            UNIQUE (project_id, name),
            FOREIGN KEY (project_id) REFERENCES projects(id)
        );

        CREATE TABLE IF NOT EXISTS tool_sops (
            id TEXT PRIMARY KEY,
            block_id TEXT NOT NULL,
            tool_ref_id TEXT NOT NULL,
            action TEXT NOT NULL,
            FOREIGN KEY (block_id) REFERENCES blocks(id),
            FOREIGN KEY (tool_ref_id) REFERENCES tool_references(id)
        );

        CREATE INDEX IF NOT EXISTS ix_tool_sops_block ON tool_sops(block_id);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {}", SCHEMA_VERSION), [])?;

    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS tool_sops;
        DROP TABLE IF EXISTS tool_references;
        DROP TABLE IF EXISTS block_embeddings;
        DROP TABLE IF EXISTS blocks;
        DROP TABLE IF EXISTS messages;
        DROP TABLE IF EXISTS tasks;
        DROP TABLE IF EXISTS sessions;
        DROP TABLE IF EXISTS spaces;
        DROP TABLE IF EXISTS projects;
        "#,
    )?;
    Ok(())
}
