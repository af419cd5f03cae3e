//! Typed message-bus consumer framework (§4.K): an in-process stand-in for
//! a durable AMQP broker, giving the rest of the workspace the same
//! exchange/routing-key/queue/retry/dead-letter contract without a network
//! dependency.

mod bus;
mod config;
mod dlx;
mod envelope;
mod handler;
mod queue;

pub use bus::{Bus, ConsumerConfig};
pub use config::BusConfig;
pub use dlx::{DeadLetter, DeadLetterStore};
pub use envelope::{MessageHandle, RawMessage};
pub use handler::Handler;
