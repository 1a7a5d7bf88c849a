//! # Subscription: one registered subscriber's handle.
//!
//! Returned by `Broker::subscribe`. Exposes:
//! - [`Subscription::recv`] — the bounded delivery stream;
//! - [`Subscription::done`] — fires exactly once when the subscription is
//!   explicitly closed or the broker enters its draining phase;
//! - [`Subscription::close`] — round-trips an unsubscribe through the
//!   command loop (second call yields `AlreadyClosed`);
//! - [`Subscription::error`] — sticky error captured at subscribe time
//!   (e.g. broker already stopped); `None` on success.
//!
//! ## Rules
//! - Messages already buffered when the subscription closes are dropped,
//!   not redelivered.
//! - Subscribe never fails the caller: a failed subscribe yields a handle
//!   whose `error()` is set and whose done signal has already fired, so
//!   consumption loops exit instead of hanging.
//! - Dropping a handle that still owns its delivery stream issues an
//!   unsubscribe automatically; explicit `close()` is optional. Control-only
//!   handles (stream taken by a handler worker) unregister nothing on drop.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::core::command::{Command, CommandSender, SubscriberId, Topic, UnsubscribeCommand};
use crate::error::BrokerError;
use crate::handles::Message;

/// Handle to one registered subscriber.
pub struct Subscription {
    id: SubscriberId,
    topic: Topic,
    err: Option<BrokerError>,
    token: CancellationToken,
    commands: Option<CommandSender>,
    rx: Option<mpsc::Receiver<Message>>,
}

impl Subscription {
    /// A live, registered subscription.
    pub(crate) fn live(
        id: SubscriberId,
        topic: Topic,
        token: CancellationToken,
        commands: CommandSender,
        rx: mpsc::Receiver<Message>,
    ) -> Self {
        Self {
            id,
            topic,
            err: None,
            token,
            commands: Some(commands),
            rx: Some(rx),
        }
    }

    /// An error handle: nothing registered, sticky error set, done already
    /// fired so consumers never hang on it.
    pub(crate) fn failed(commands: Option<CommandSender>, err: BrokerError) -> Self {
        let token = CancellationToken::new();
        token.cancel();
        Self {
            id: SubscriberId(0),
            topic: Topic::from(""),
            err: Some(err),
            token,
            commands,
            rx: None,
        }
    }

    /// Subscriber id (zero for error handles).
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Topic this subscription is registered under.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sticky error captured at subscribe time; `None` on success.
    pub fn error(&self) -> Option<&BrokerError> {
        self.err.as_ref()
    }

    /// Receives the next delivered message.
    ///
    /// Suspends until a message arrives or the done signal fires; returns
    /// `None` once the subscription is finished. Messages still buffered
    /// when done fires are dropped.
    pub async fn recv(&mut self) -> Option<Message> {
        let rx = self.rx.as_mut()?;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            msg = rx.recv() => msg,
        }
    }

    /// Suspends until the subscription is closed or the broker drains.
    ///
    /// Fires exactly once; already fired for error handles.
    pub async fn done(&self) {
        self.token.cancelled().await;
    }

    /// Whether the done signal has already fired.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Unsubscribes through the command loop.
    ///
    /// A second close (or closing an error handle) yields
    /// [`BrokerError::AlreadyClosed`]; a stopped broker yields
    /// [`BrokerError::Stopped`].
    pub async fn close(&self) -> Result<(), BrokerError> {
        let Some(commands) = &self.commands else {
            return Err(BrokerError::AlreadyClosed);
        };

        let (done, rx) = oneshot::channel();
        commands.try_send(Command::Unsubscribe(UnsubscribeCommand { id: self.id, done }))?;
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Stopped),
        }
    }

    /// Takes the delivery stream out of the handle, leaving a control-only
    /// handle behind. Used by the handler consumption loop.
    pub(crate) fn take_receiver(&mut self) -> Option<mpsc::Receiver<Message>> {
        self.rx.take()
    }

    /// Cancellation token observed by the done signal.
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Subscription {
    /// Unsubscribes an abandoned handle.
    ///
    /// Only fires for handles that still own their delivery stream and are
    /// not already done; control-only handles may be dropped freely while a
    /// handler worker keeps consuming. Best-effort: if the command queue is
    /// full the registration is reclaimed lazily by the loop instead, the
    /// moment a fan-out hits the closed delivery queue.
    fn drop(&mut self) {
        if self.rx.is_none() || self.token.is_cancelled() {
            return;
        }
        let Some(commands) = &self.commands else {
            return;
        };

        let (done, _) = oneshot::channel();
        let _ = commands.try_send(Command::Unsubscribe(UnsubscribeCommand { id: self.id, done }));
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("err", &self.err)
            .field("done", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}
