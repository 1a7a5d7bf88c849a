//! # Structured event payload.
//!
//! [`EventPayload`] is the envelope for "something happened" messages: an
//! event name, the time it occurred, free-form supportive data, and metadata
//! that distinguishes the event from its peers (user, tenant, host, ...).
//!
//! Decoding merges everything into a single flat object before
//! deserializing into the target descriptor:
//! ```text
//! x-name        ← event name
//! x-at          ← event timestamp (RFC 3339)
//! x-meta-<key>  ← every metadata entry
//! <key>         ← every data entry
//! ```
//! Reserved `x-` keys never collide with data keys by convention; data
//! entries are merged last and win on a clash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::payload::ScanOptions;
use crate::error::ScanError;

/// Capability for types that describe a concrete event.
///
/// Implementors declare the event name they stand for and know how to turn
/// themselves into the wire envelope. Decoding goes the other way through
/// `serde::Deserialize`.
///
/// ## Example
/// ```
/// use courier::{EventDescriptor, EventPayload};
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct NetworkStatus {
///     up: bool,
/// }
///
/// impl EventDescriptor for NetworkStatus {
///     fn event_name() -> &'static str {
///         "network-status"
///     }
///
///     fn to_event(&self) -> EventPayload {
///         EventPayload::new(Self::event_name()).with_data("up", self.up)
///     }
/// }
/// ```
pub trait EventDescriptor {
    /// The event name this descriptor declares.
    ///
    /// Strict-mode decoding fails when the payload's recorded name differs.
    fn event_name() -> &'static str
    where
        Self: Sized;

    /// Builds the wire envelope for this descriptor.
    fn to_event(&self) -> EventPayload;
}

/// Structured event payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventPayload {
    /// What actually happened.
    pub name: String,
    /// When the event occurred.
    pub at: DateTime<Utc>,
    /// Supportive data for the event.
    pub data: Map<String, Value>,
    /// Data that helps describe/distinguish the event from others,
    /// e.g. user, tenant.
    pub meta: Map<String, Value>,
}

impl EventPayload {
    /// Creates an empty event with the given name, stamped now.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            at: Utc::now(),
            data: Map::new(),
            meta: Map::new(),
        }
    }

    /// Attaches a data entry.
    #[inline]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Attaches a metadata entry.
    #[inline]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Overrides the event timestamp.
    #[inline]
    pub fn with_at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }

    /// Decodes the event into a descriptor type.
    ///
    /// Unless `opts` disables strict mode, fails with
    /// [`ScanError::NameMismatch`] when `T::event_name()` differs from the
    /// recorded name. Metadata is exposed under the `x-meta-` prefix and the
    /// name/timestamp under `x-name`/`x-at`; descriptors that want them can
    /// capture those fields with `#[serde(rename = "...")]`.
    pub fn decode<T>(&self, opts: ScanOptions) -> Result<T, ScanError>
    where
        T: EventDescriptor + serde::de::DeserializeOwned,
    {
        if opts.strict && T::event_name() != self.name {
            return Err(ScanError::NameMismatch {
                expected: T::event_name(),
                actual: self.name.clone(),
            });
        }

        let mut merged = Map::new();
        merged.insert("x-name".to_string(), Value::String(self.name.clone()));
        merged.insert(
            "x-at".to_string(),
            serde_json::to_value(self.at).map_err(ScanError::Decode)?,
        );
        for (k, v) in &self.meta {
            merged.insert(format!("x-meta-{k}"), v.clone());
        }
        for (k, v) in &self.data {
            merged.insert(k.clone(), v.clone());
        }

        serde_json::from_value(Value::Object(merged)).map_err(ScanError::Decode)
    }
}
