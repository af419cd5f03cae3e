//! The per-queue consume loop: TTL expiry, per-handler timeout,
//! retry-with-backoff, and dead-lettering around one registered handler
//! (§4.K).

use std::sync::Arc;

use ctxmem_types::{BusPayload, ErrorKind};
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::config::BusConfig;
use crate::dlx::DeadLetterStore;
use crate::envelope::{MessageHandle, RawMessage};
use crate::handler::Handler;

#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_consumer<T, H>(
    exchange: String,
    routing_key: String,
    queue: String,
    mut receiver: mpsc::UnboundedReceiver<RawMessage>,
    resend: mpsc::UnboundedSender<RawMessage>,
    handler: H,
    config: BusConfig,
    qos: Arc<Semaphore>,
    dead_letters: Arc<DeadLetterStore>,
) where
    T: BusPayload,
    H: Handler<T>,
{
    tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            if message.published_at.elapsed() > config.default_message_ttl {
                warn!(queue = %queue, "message expired before delivery, dropping");
                continue;
            }

            let permit = qos.clone().acquire_owned().await.expect("semaphore never closes");
            let body: T = match serde_json::from_value(message.payload.clone()) {
                Ok(body) => body,
                Err(err) => {
                    warn!(queue = %queue, %err, "payload failed schema validation, dropping");
                    drop(permit);
                    continue;
                }
            };

            let handle = MessageHandle {
                retry_count: message.retry_count,
                redelivered: message.retry_count > 0,
            };

            let outcome = tokio::time::timeout(config.handler_timeout, handler.handle(body, handle)).await;
            drop(permit);

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) if err.kind == ErrorKind::Internal => {
                    requeue_or_dead_letter(&exchange, &routing_key, &queue, message, &resend, &config, &dead_letters)
                        .await;
                }
                Ok(Err(err)) => {
                    info!(queue = %queue, %err, "handler returned a non-internal error, acking without retry");
                }
                Err(_elapsed) => {
                    warn!(queue = %queue, "handler timed out");
                    requeue_or_dead_letter(&exchange, &routing_key, &queue, message, &resend, &config, &dead_letters)
                        .await;
                }
            }
        }
    });
}

async fn requeue_or_dead_letter(
    exchange: &str,
    routing_key: &str,
    queue: &str,
    mut message: RawMessage,
    resend: &mpsc::UnboundedSender<RawMessage>,
    config: &BusConfig,
    dead_letters: &Arc<DeadLetterStore>,
) {
    if message.retry_count >= config.default_max_retries {
        warn!(queue = %queue, retries = message.retry_count, "exhausted retries, dead-lettering");
        dead_letters.record(exchange, routing_key, queue, message, config.default_dlx_ttl);
        return;
    }

    let delay = config.retry_delay_unit * 2u32.pow(message.retry_count);
    message.retry_count += 1;
    let resend = resend.clone();
    let queue = queue.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if resend.send(message).is_err() {
            warn!(queue = %queue, "queue closed, dropping retried message");
        }
    });
}
