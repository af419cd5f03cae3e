//! Block tree store: SQLite-backed persistence for projects, spaces,
//! sessions, tasks, messages, blocks, embeddings, and tool references
//! (§3, §4.B, §6).

mod db;
mod error;
pub mod queries;
mod schema;

pub use db::Database;
pub use error::{Error, Result};
pub use schema::SCHEMA_VERSION;
