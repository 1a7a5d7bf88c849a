//! # Command protocol for the broker's command loop.
//!
//! Every operation on the broker travels as one [`Command`] variant carrying
//! its inputs and exactly one completion/reply channel, resolved exactly once
//! by the loop. The set is closed: adding an operation is a compile-time
//! checked change at every `match` site.
//!
//! [`CommandSender`] is the narrow capability handed to subscriptions and
//! messages so they can route control commands back to the loop without
//! holding a reference to the broker itself.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{BrokerError, QueueKind};
use crate::handles::Subscription;
use crate::payload::Payload;

/// Opaque topic identifier.
pub type Topic = Arc<str>;

/// Identifier of one in-flight message copy.
///
/// Minted from a single monotonically increasing counter; never reused
/// within a broker's lifetime. Every subscriber of a topic receives its own
/// message copy with a distinct id even though the payload is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(pub(crate) u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one registered subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Single-use channel resolving a command with the loop's verdict.
pub(crate) type Verdict = oneshot::Sender<Result<(), BrokerError>>;

/// Closed set of operations serviced by the command loop.
pub(crate) enum Command {
    Publish(PublishCommand),
    Subscribe(SubscribeCommand),
    Unsubscribe(UnsubscribeCommand),
    Ack(AckCommand),
    Nack(NackCommand),
    Progress(ProgressCommand),
}

pub(crate) struct PublishCommand {
    pub topic: Topic,
    pub payload: Arc<Payload>,
    pub done: Verdict,
}

pub(crate) struct SubscribeCommand {
    pub topic: Topic,
    pub reply: oneshot::Sender<Subscription>,
}

pub(crate) struct UnsubscribeCommand {
    pub id: SubscriberId,
    pub done: Verdict,
}

pub(crate) struct AckCommand {
    pub id: MessageId,
    pub token: CancellationToken,
    pub done: Verdict,
}

pub(crate) struct NackCommand {
    pub id: MessageId,
    pub subscriber: SubscriberId,
    pub token: CancellationToken,
    pub done: Verdict,
}

pub(crate) struct ProgressCommand {
    pub done: Verdict,
}

/// Narrow capability for submitting commands to the loop.
///
/// Cloneable and cheap; the only thing handles keep of the broker.
#[derive(Clone)]
pub(crate) struct CommandSender {
    tx: mpsc::Sender<Command>,
}

impl CommandSender {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Submits without blocking; a full queue is a backpressure error,
    /// a closed queue means the broker stopped.
    pub(crate) fn try_send(&self, cmd: Command) -> Result<(), BrokerError> {
        self.tx.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => BrokerError::Backpressure {
                queue: QueueKind::Command,
            },
            mpsc::error::TrySendError::Closed(_) => BrokerError::Stopped,
        })
    }

    /// Submits, suspending the caller while the queue is full.
    ///
    /// Used by the synchronous-handshake paths (subscribe).
    pub(crate) async fn send(&self, cmd: Command) -> Result<(), BrokerError> {
        self.tx.send(cmd).await.map_err(|_| BrokerError::Stopped)
    }
}
