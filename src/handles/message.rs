//! # Message: one delivered message copy.
//!
//! A [`Message`] is minted per (publish, subscriber) pair at fan-out time:
//! every subscriber of a topic receives its own instance with a distinct id
//! even though the payload is shared.
//!
//! The handle exposes payload decoding plus the acknowledgment protocol:
//! - [`Message::ack`] — acknowledge and release the message;
//! - [`Message::nack`] — reschedule the identical message for the same
//!   subscriber, immediately, with no retry limit (at-least-once,
//!   unbounded-redelivery by design);
//! - [`Message::progress`] — reserve the message for additional time
//!   (currently a no-op, reserved for a visibility-timeout feature).
//!
//! All three round-trip through the command loop via a narrow command-sender
//! capability; the handle holds no reference to the broker itself.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::command::{
    AckCommand, Command, CommandSender, MessageId, NackCommand, ProgressCommand, SubscriberId,
};
use crate::error::ScanError;
use crate::handles::Completion;
use crate::payload::{EventDescriptor, Payload, ScanOptions};

/// One delivered (or in-flight) message copy addressed to one subscriber.
#[derive(Clone)]
pub struct Message {
    id: MessageId,
    subscriber: SubscriberId,
    payload: Arc<Payload>,
    /// Subscription token; doubles as the per-call cancellation observed
    /// by ack/nack.
    token: CancellationToken,
    commands: CommandSender,
}

impl Message {
    pub(crate) fn new(
        id: MessageId,
        subscriber: SubscriberId,
        payload: Arc<Payload>,
        token: CancellationToken,
        commands: CommandSender,
    ) -> Self {
        Self {
            id,
            subscriber,
            payload,
            token,
            commands,
        }
    }

    /// Unique id of this message copy.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Id of the subscriber this copy is addressed to.
    pub fn subscriber(&self) -> SubscriberId {
        self.subscriber
    }

    /// Raw payload of the message.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Decodes a text payload. See [`Payload::scan_text`].
    pub fn scan_text(&self) -> Result<String, ScanError> {
        self.payload.scan_text()
    }

    /// Decodes an event payload, strict by default. See [`Payload::scan_event`].
    pub fn scan_event<T>(&self) -> Result<T, ScanError>
    where
        T: EventDescriptor + serde::de::DeserializeOwned,
    {
        self.payload.scan_event()
    }

    /// Decodes an event payload with explicit [`ScanOptions`].
    pub fn scan_event_with<T>(&self, opts: ScanOptions) -> Result<T, ScanError>
    where
        T: EventDescriptor + serde::de::DeserializeOwned,
    {
        self.payload.scan_event_with(opts)
    }

    /// Acknowledges the message, removing it from the in-flight table.
    pub fn ack(&self) -> Completion {
        let (done, completion) = Completion::channel();
        let cmd = Command::Ack(AckCommand {
            id: self.id,
            token: self.token.clone(),
            done,
        });
        match self.commands.try_send(cmd) {
            Ok(()) => completion,
            Err(e) => Completion::ready(Err(e)),
        }
    }

    /// Reschedules the identical message id to the same subscriber.
    ///
    /// No delay, no retry counter: callers that nack in a tight loop without
    /// draining their queue will eventually see a subscriber-buffer
    /// backpressure error rather than unbounded growth.
    pub fn nack(&self) -> Completion {
        let (done, completion) = Completion::channel();
        let cmd = Command::Nack(NackCommand {
            id: self.id,
            subscriber: self.subscriber,
            token: self.token.clone(),
            done,
        });
        match self.commands.try_send(cmd) {
            Ok(()) => completion,
            Err(e) => Completion::ready(Err(e)),
        }
    }

    /// Reserves the message for additional processing time.
    ///
    /// Currently always succeeds and enforces no timeout.
    pub fn progress(&self) -> Completion {
        let (done, completion) = Completion::channel();
        let cmd = Command::Progress(ProgressCommand { done });
        match self.commands.try_send(cmd) {
            Ok(()) => completion,
            Err(e) => Completion::ready(Err(e)),
        }
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("subscriber", &self.subscriber)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}
