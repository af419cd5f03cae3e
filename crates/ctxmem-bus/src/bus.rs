//! The bus registry: declares exchange/routing-key/queue bindings,
//! publishes typed payloads onto them, and spawns one consume loop per
//! registered handler (§4.K).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use ctxmem_types::{BusPayload, Result};
use tokio::sync::{mpsc, Semaphore};
use tracing::debug;

use crate::config::BusConfig;
use crate::dlx::DeadLetterStore;
use crate::envelope::RawMessage;
use crate::handler::Handler;
use crate::queue::spawn_consumer;

/// `(exchange_name, routing_key, queue_name)` — one consumer registration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub exchange: String,
    pub routing_key: String,
    pub queue: String,
}

impl ConsumerConfig {
    pub fn new(exchange: impl Into<String>, routing_key: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            routing_key: routing_key.into(),
            queue: queue.into(),
        }
    }
}

struct QueueBinding {
    sender: mpsc::UnboundedSender<RawMessage>,
}

/// An in-process substitute for a durable AMQP broker: the same
/// exchange/routing-key/queue/retry/dead-letter contract a RabbitMQ
/// deployment would give this system, backed by `tokio::sync::mpsc`
/// channels instead of a network connection.
pub struct Bus {
    config: BusConfig,
    qos: Arc<Semaphore>,
    bindings: Mutex<HashMap<(String, String), Vec<String>>>,
    queues: Mutex<HashMap<String, QueueBinding>>,
    dead_letters: Arc<DeadLetterStore>,
}

impl Bus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            qos: Arc::new(Semaphore::new(config.global_qos)),
            config,
            bindings: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
            dead_letters: Arc::new(DeadLetterStore::new()),
        }
    }

    pub fn dead_letters(&self) -> &DeadLetterStore {
        &self.dead_letters
    }

    /// Registers `handler` for one `(exchange, routing_key, queue)` binding
    /// and spawns its consume loop. The payload type `T` is fixed by
    /// `handler`'s own signature, so a mismatched schema is a compile error
    /// rather than the runtime registration rejection spec.md describes.
    pub fn register<T, H>(&self, consumer: ConsumerConfig, handler: H)
    where
        T: BusPayload,
        H: Handler<T>,
    {
        let (sender, receiver) = mpsc::unbounded_channel::<RawMessage>();
        let resend = sender.clone();

        self.bindings
            .lock()
            .unwrap()
            .entry((consumer.exchange.clone(), consumer.routing_key.clone()))
            .or_default()
            .push(consumer.queue.clone());
        self.queues
            .lock()
            .unwrap()
            .insert(consumer.queue.clone(), QueueBinding { sender });

        spawn_consumer(
            consumer.exchange,
            consumer.routing_key,
            consumer.queue,
            receiver,
            resend,
            handler,
            self.config.clone(),
            self.qos.clone(),
            self.dead_letters.clone(),
        );
    }

    /// `publish(exchange, routing_key, body)`: serializes `body` and fans it
    /// out to every queue bound to that `(exchange, routing_key)` pair. A
    /// pair with no bound queue is a no-op, not an error — mirrors a broker
    /// publishing into an exchange nobody has bound a queue to yet.
    pub fn publish<T: BusPayload>(&self, exchange: &str, routing_key: &str, body: &T) -> Result<()> {
        let payload = serde_json::to_value(body)?;
        let key = (exchange.to_string(), routing_key.to_string());
        let queues = self.bindings.lock().unwrap().get(&key).cloned().unwrap_or_default();

        let senders = self.queues.lock().unwrap();
        for queue in queues {
            let Some(binding) = senders.get(&queue) else {
                continue;
            };
            let message = RawMessage {
                schema_name: T::schema_name().to_string(),
                payload: payload.clone(),
                retry_count: 0,
                published_at: Instant::now(),
            };
            if binding.sender.send(message).is_err() {
                debug!(queue = %queue, "consumer for queue has shut down, dropping publish");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use ctxmem_types::{InsertNewMessage, MessageId, ProjectId, SessionId};

    use super::*;

    fn sample_payload() -> InsertNewMessage {
        InsertNewMessage {
            project_id: ProjectId::new(),
            session_id: SessionId::new(),
            message_id: MessageId::new(),
        }
    }

    #[tokio::test]
    async fn dispatches_published_message_to_registered_handler() {
        let bus = Bus::new(BusConfig::default());
        let received: Arc<StdMutex<Vec<InsertNewMessage>>> = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();

        bus.register(
            ConsumerConfig::new("session", "new_message", "q1"),
            move |body: InsertNewMessage, _msg: crate::MessageHandle| {
                let received = received_clone.clone();
                async move {
                    received.lock().unwrap().push(body);
                    Ok(())
                }
            },
        );

        let payload = sample_payload();
        bus.publish("session", "new_message", &payload).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let got = received.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].message_id, payload.message_id);
    }

    #[tokio::test]
    async fn internal_error_retries_then_dead_letters() {
        let mut config = BusConfig::default();
        config.default_max_retries = 1;
        config.retry_delay_unit = Duration::from_millis(1);
        let bus = Bus::new(config);
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        bus.register(
            ConsumerConfig::new("session", "new_message", "q2"),
            move |_body: InsertNewMessage, _msg: crate::MessageHandle| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Err(ctxmem_types::Error::internal("boom"))
                }
            },
        );

        bus.publish("session", "new_message", &sample_payload()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(bus.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn non_internal_error_acks_without_retry() {
        let bus = Bus::new(BusConfig::default());
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        bus.register(
            ConsumerConfig::new("session", "new_message", "q3"),
            move |_body: InsertNewMessage, _msg: crate::MessageHandle| {
                let attempts = attempts_clone.clone();
                async move {
                    attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Err(ctxmem_types::Error::validation("bad payload"))
                }
            },
        );

        bus.publish("session", "new_message", &sample_payload()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(bus.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn publish_with_no_bound_queue_is_a_no_op() {
        let bus = Bus::new(BusConfig::default());
        bus.publish("session", "new_message", &sample_payload()).unwrap();
    }
}
