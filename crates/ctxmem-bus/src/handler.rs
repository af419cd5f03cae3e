//! A consumer handler for one payload schema (§4.K): `fn(body: T, message:
//! MessageHandle) -> Result<()>`. spec.md's registration check ("the
//! handler's first parameter must be named `body`, second `message`") is a
//! runtime reflection check in a dynamically-typed host; here the same
//! contract is enforced at compile time by `T`'s type parameter, so there is
//! no equivalent runtime rejection path to port.

use std::future::Future;

use async_trait::async_trait;
use ctxmem_types::{BusPayload, Result};

use crate::envelope::MessageHandle;

#[async_trait]
pub trait Handler<T: BusPayload>: Send + Sync + 'static {
    async fn handle(&self, body: T, message: MessageHandle) -> Result<()>;
}

#[async_trait]
impl<T, F, Fut> Handler<T> for F
where
    T: BusPayload,
    F: Fn(T, MessageHandle) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, body: T, message: MessageHandle) -> Result<()> {
        (self)(body, message).await
    }
}
