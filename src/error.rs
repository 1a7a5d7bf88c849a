//! Error types used by the courier broker and payload codec.
//!
//! This module defines two main error enums:
//!
//! - [`BrokerError`] — errors raised by broker operations (publish, subscribe,
//!   ack/nack, lifecycle).
//! - [`ScanError`] — errors raised while decoding a message payload.
//!
//! Both types provide an `as_label` helper returning a short stable string
//! for logging/metrics.

use thiserror::Error;

/// Identifies which bounded buffer rejected an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// The broker-wide command queue.
    Command,
    /// The broker-wide publish queue.
    Publish,
    /// A per-subscriber delivery queue.
    Subscriber,
}

impl std::fmt::Display for QueueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueKind::Command => "command",
            QueueKind::Publish => "publish",
            QueueKind::Subscriber => "subscriber",
        };
        f.write_str(s)
    }
}

/// # Errors produced by broker operations.
///
/// Every error is delivered to the originating caller through the same
/// completion/reply path used for success; the command loop itself never
/// panics or exits because of a bad command.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// One of the bounded buffers is full; nothing was enqueued.
    #[error("can't handle anymore {queue} operations, buffer exceeded")]
    Backpressure {
        /// Which buffer rejected the operation.
        queue: QueueKind,
    },

    /// The operation targets a subscriber that is unknown or already removed,
    /// or a subscription that was closed twice.
    #[error("subscription already closed")]
    AlreadyClosed,

    /// A per-call or subscription cancellation fired before the command loop
    /// serviced the operation.
    #[error("operation canceled")]
    Canceled,

    /// The broker is stopped (or stopping) and no longer services commands.
    #[error("broker stopped")]
    Stopped,

    /// The operation targets a broker that was never started, or a registry
    /// with no broker registered.
    #[error("broker not initialized")]
    NotInitialized,

    /// The broker configuration section failed to load.
    #[error("invalid broker configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use courier::{BrokerError, QueueKind};
    ///
    /// let err = BrokerError::Backpressure { queue: QueueKind::Publish };
    /// assert_eq!(err.as_label(), "backpressure_publish");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Backpressure {
                queue: QueueKind::Command,
            } => "backpressure_command",
            BrokerError::Backpressure {
                queue: QueueKind::Publish,
            } => "backpressure_publish",
            BrokerError::Backpressure {
                queue: QueueKind::Subscriber,
            } => "backpressure_subscriber",
            BrokerError::AlreadyClosed => "already_closed",
            BrokerError::Canceled => "canceled",
            BrokerError::Stopped => "stopped",
            BrokerError::NotInitialized => "not_initialized",
            BrokerError::Config(_) => "config",
        }
    }

    /// Indicates whether the operation is safe to retry later.
    ///
    /// Returns `true` only for [`BrokerError::Backpressure`]: the buffers may
    /// drain, everything else is a terminal answer for that call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::Backpressure { .. })
    }
}

/// # Errors produced by payload decoding.
///
/// Returned by `scan_text` / `scan_event` on [`Message`](crate::Message)
/// and [`Payload`](crate::Payload).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ScanError {
    /// The payload is structured; only a text payload decodes into a string.
    #[error("invalid scan target: payload is not a text payload")]
    NotText,

    /// The payload is plain text; only an event payload decodes into a descriptor.
    #[error("invalid scan target: payload is not an event payload")]
    NotEvent,

    /// Strict mode: the descriptor's declared name does not match the payload.
    #[error("event name mismatch: expected {expected:?}, got {actual:?}")]
    NameMismatch {
        /// Name declared by the target descriptor.
        expected: &'static str,
        /// Name recorded in the payload.
        actual: String,
    },

    /// The merged event fields did not deserialize into the target.
    #[error("failed to decode event payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ScanError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ScanError::NotText => "scan_not_text",
            ScanError::NotEvent => "scan_not_event",
            ScanError::NameMismatch { .. } => "scan_name_mismatch",
            ScanError::Decode(_) => "scan_decode",
        }
    }
}
