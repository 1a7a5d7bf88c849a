//! # BrokerRegistry: an explicit process-wide access point.
//!
//! Libraries that cannot thread a [`Broker`] reference through their call
//! graph can share one through a [`BrokerRegistry`] instead. The registry is
//! an ordinary value the host constructs and owns (typically wrapped in an
//! `Arc` or a `static`): there is no hidden global, and swapping or clearing
//! the registered broker is explicit.
//!
//! Forwarding calls made while no broker is registered answer
//! [`BrokerError::NotInitialized`] through the usual completion/handle
//! shapes; nothing panics and nothing hangs.

use std::sync::{Arc, RwLock};

use crate::core::{Broker, Topic};
use crate::error::BrokerError;
use crate::handles::{Completion, Subscription};
use crate::handlers::Handler;
use crate::payload::Payload;

/// Shared access point for one registered [`Broker`].
#[derive(Default)]
pub struct BrokerRegistry {
    current: RwLock<Option<Arc<Broker>>>,
}

impl BrokerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a broker, replacing any previous one.
    ///
    /// The previous broker is not closed; the host owns its lifecycle.
    pub fn register(&self, broker: Arc<Broker>) {
        *self.write_guard() = Some(broker);
    }

    /// Removes the registered broker, if any.
    pub fn clear(&self) {
        *self.write_guard() = None;
    }

    /// Currently registered broker, if any.
    pub fn current(&self) -> Option<Arc<Broker>> {
        self.read_guard().clone()
    }

    /// Forwards to [`Broker::publish`]; resolves
    /// [`BrokerError::NotInitialized`] when nothing is registered.
    pub fn publish(&self, topic: impl Into<Topic>, payload: impl Into<Payload>) -> Completion {
        match self.current() {
            Some(broker) => broker.publish(topic, payload),
            None => Completion::ready(Err(BrokerError::NotInitialized)),
        }
    }

    /// Forwards to [`Broker::subscribe`]; yields an error handle when
    /// nothing is registered.
    pub async fn subscribe(&self, topic: impl Into<Topic>) -> Subscription {
        match self.current() {
            Some(broker) => broker.subscribe(topic).await,
            None => Subscription::failed(None, BrokerError::NotInitialized),
        }
    }

    /// Forwards to [`Broker::subscribe_handler`]; yields an error handle
    /// when nothing is registered.
    pub async fn subscribe_handler<H: Handler>(
        &self,
        topic: impl Into<Topic>,
        handler: H,
    ) -> Subscription {
        match self.current() {
            Some(broker) => broker.subscribe_handler(topic, handler).await,
            None => Subscription::failed(None, BrokerError::NotInitialized),
        }
    }

    fn read_guard(&self) -> std::sync::RwLockReadGuard<'_, Option<Arc<Broker>>> {
        match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_guard(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<Broker>>> {
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl std::fmt::Debug for BrokerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerRegistry")
            .field("registered", &self.read_guard().is_some())
            .finish()
    }
}
