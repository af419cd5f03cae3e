//! Dead-letter store: messages that exhaust `max_retries` land here with an
//! expiry derived from `dlx_ttl_days`, standing in for a real broker's
//! dead-letter exchange and its queue TTL.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::envelope::RawMessage;

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
    pub message: RawMessage,
    pub expires_at: Instant,
}

#[derive(Default)]
pub struct DeadLetterStore {
    entries: Mutex<Vec<DeadLetter>>,
}

impl DeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, exchange: &str, routing_key: &str, queue: &str, message: RawMessage, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.lock().unwrap().push(DeadLetter {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            queue: queue.to_string(),
            message,
            expires_at,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops entries past their `dlx_ttl_days` expiry. A real broker's
    /// dead-letter queue does this on its own; nothing sweeps this store
    /// automatically, so a long-running process should call this
    /// periodically.
    pub fn expire_stale(&self) {
        let now = Instant::now();
        self.entries.lock().unwrap().retain(|entry| entry.expires_at > now);
    }

    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.entries.lock().unwrap().clone()
    }
}
