use std::path::Path;

use rusqlite::Connection;

use crate::schema;
use crate::Result;

/// Owns the single SQLite connection backing the block tree store. One
/// `Database` is created per process (or per test); all query modules take
/// `&Connection` so they can be exercised against an in-memory handle.
pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
