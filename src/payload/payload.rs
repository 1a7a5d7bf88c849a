//! # Payload: typed envelope around an opaque message value.
//!
//! [`Payload`] is a closed enum: either plain text or a structured
//! [`EventPayload`]. Decoding ("scanning") is kind-checked — a text payload
//! only decodes into a string, an event payload only into an
//! [`EventDescriptor`] target.

use crate::error::ScanError;

use super::event::{EventDescriptor, EventPayload};

/// Options controlling event decoding.
#[derive(Clone, Copy, Debug)]
pub struct ScanOptions {
    /// Fail when the descriptor's declared name differs from the payload's
    /// recorded name. On by default.
    pub strict: bool,
}

impl ScanOptions {
    /// Options with strict name matching disabled.
    pub fn lenient() -> Self {
        Self { strict: false }
    }
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { strict: true }
    }
}

/// Typed envelope around an opaque message value.
#[derive(Clone, Debug)]
pub enum Payload {
    /// Plain string payload.
    Text(String),
    /// Structured event payload.
    Event(EventPayload),
}

impl Payload {
    /// Creates a plain text payload.
    pub fn text(value: impl Into<String>) -> Self {
        Payload::Text(value.into())
    }

    /// Creates an event payload from a descriptor.
    pub fn event<T: EventDescriptor>(descriptor: &T) -> Self {
        Payload::Event(descriptor.to_event())
    }

    /// Decodes a text payload into a string.
    ///
    /// Fails with [`ScanError::NotText`] for event payloads.
    pub fn scan_text(&self) -> Result<String, ScanError> {
        match self {
            Payload::Text(s) => Ok(s.clone()),
            Payload::Event(_) => Err(ScanError::NotText),
        }
    }

    /// Decodes an event payload into a descriptor type, strict by default.
    ///
    /// Fails with [`ScanError::NotEvent`] for text payloads.
    pub fn scan_event<T>(&self) -> Result<T, ScanError>
    where
        T: EventDescriptor + serde::de::DeserializeOwned,
    {
        self.scan_event_with(ScanOptions::default())
    }

    /// Decodes an event payload with explicit [`ScanOptions`].
    pub fn scan_event_with<T>(&self, opts: ScanOptions) -> Result<T, ScanError>
    where
        T: EventDescriptor + serde::de::DeserializeOwned,
    {
        match self {
            Payload::Event(ev) => ev.decode(opts),
            Payload::Text(_) => Err(ScanError::NotEvent),
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<EventPayload> for Payload {
    fn from(value: EventPayload) -> Self {
        Payload::Event(value)
    }
}
