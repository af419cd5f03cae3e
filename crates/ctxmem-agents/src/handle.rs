//! Shared DB handle type. Wrapping `Database` in `Arc<tokio::sync::Mutex<_>>`
//! gives every agent ctx a cloneable, `Send + Sync` handle onto the single
//! process-wide connection (§5: "message-bus connection: one per process,
//! shared" applies equally to the one SQLite connection this process holds).

use std::sync::Arc;

use ctxmem_store::Database;
use tokio::sync::Mutex;

pub type DbHandle = Arc<Mutex<Database>>;
