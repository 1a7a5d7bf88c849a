use async_trait::async_trait;

use crate::handles::Message;

/// Consumer callback driven by [`Broker::subscribe_handler`](crate::Broker::subscribe_handler).
///
/// Invoked once per delivered message, sequentially per subscription. The
/// handler owns the full acknowledgment decision: call
/// [`Message::ack`](crate::Message::ack) /
/// [`Message::nack`](crate::Message::nack) itself, or drop the message to
/// leave it unacknowledged.
///
/// A panicking handler is isolated: the panic is caught and logged, the
/// consumption loop keeps running.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Processes one delivered message.
    async fn handle(&self, message: Message);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for std::sync::Arc<H> {
    async fn handle(&self, message: Message) {
        (**self).handle(message).await;
    }
}
