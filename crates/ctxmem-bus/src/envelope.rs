//! Wire-level message envelope: the framework carries schema-tagged JSON
//! plus delivery bookkeeping; the typed payload is recovered at dispatch
//! time via `serde_json::from_value`.

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct RawMessage {
    pub schema_name: String,
    pub payload: serde_json::Value,
    pub retry_count: u32,
    pub published_at: Instant,
}

/// Read-only delivery metadata handed to a consumer alongside its typed
/// body — the broker's "raw message handle" (§4.K). Ack/nack is decided by
/// the handler's returned `Result`, not called explicitly on this handle.
#[derive(Debug, Clone, Copy)]
pub struct MessageHandle {
    pub retry_count: u32,
    pub redelivered: bool,
}
