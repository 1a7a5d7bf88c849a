//! Message payloads and the scan (decode) protocol.
//!
//! Two payload kinds exist:
//! - a plain text payload, decodable only into a string;
//! - a structured event payload ([`EventPayload`]) carrying a name,
//!   a timestamp, and free-form data/metadata maps, decodable into any
//!   type implementing [`EventDescriptor`].
//!
//! Internal modules:
//! - [`event`]: the structured event envelope and descriptor trait;
//! - [`payload`]: the [`Payload`] enum and scan entry points.

mod event;
mod payload;

pub use event::{EventDescriptor, EventPayload};
pub use payload::{Payload, ScanOptions};
