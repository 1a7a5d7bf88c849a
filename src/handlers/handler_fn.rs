use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::handles::Message;
use crate::handlers::Handler;

/// Adapter turning an async closure into a [`Handler`].
///
/// # Example
/// ```no_run
/// use courier::{Broker, HandlerFn};
///
/// # async fn demo(broker: Broker) {
/// let handler = HandlerFn::new(|msg| async move {
///     let _ = msg.ack().wait().await;
/// });
/// let sub = broker.subscribe_handler("orders", handler).await;
/// # let _ = sub;
/// # }
/// ```
pub struct HandlerFn<F> {
    f: F,
}

impl<F, Fut> HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    /// Wraps an async closure.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Wraps an async closure and returns it ready for shared use.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle(&self, message: Message) {
        (self.f)(message).await;
    }
}
