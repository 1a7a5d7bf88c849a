//! # courier
//!
//! **In-process publish/subscribe message broker for tokio applications.**
//!
//! Decouples event producers from consumers inside one process: a producer
//! publishes a payload on a topic and every current subscriber of that topic
//! receives its own copy, with an explicit ack/nack protocol, bounded
//! buffering everywhere, and a graceful shutdown path.
//!
//! ## Architecture
//! ```text
//! Broker (façade)           BrokerActor (single-owner command loop)
//!   publish ──────────────► [command queue] ─► [publish queue] ─► fan-out
//!   subscribe ────────────►       │                                  │
//!   close ──► close signals ──────┘                                  ▼
//!                                                      [delivery queue per subscriber]
//! Subscription.recv / Handler ◄───────────────────────────────────────┘
//!   Message.ack / nack / progress ─► [command queue] (round-trip verdicts)
//! ```
//!
//! All broker state lives in one task; every operation travels to it as a
//! command and is answered through a single-use completion. No locks guard
//! message state, and no queue is unbounded.
//!
//! ## Features
//! - **Topic fan-out**: each subscriber gets its own message copy with its
//!   own id; payloads are shared, never cloned.
//! - **Explicit acknowledgment**: [`Message::ack`], [`Message::nack`]
//!   (immediate redelivery, no retry cap), [`Message::progress`] (reserved).
//! - **Backpressure by refusal**: full buffers reject with a typed
//!   [`BrokerError::Backpressure`] naming the buffer, never by blocking.
//! - **Graceful or immediate shutdown**: `wait_on_close` decides whether the
//!   accepted backlog drains before the loop stops.
//! - **Typed payloads**: plain text or structured events with a
//!   name/timestamp envelope, decoded through [`EventDescriptor`].
//!
//! ## Quick start
//! ```no_run
//! use courier::{Broker, BrokerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let broker = Broker::new(BrokerConfig::default());
//!     broker.start();
//!
//!     let mut sub = broker.subscribe("greetings").await;
//!
//!     broker.publish("greetings", "hello");
//!
//!     if let Some(msg) = sub.recv().await {
//!         println!("got: {:?}", msg.scan_text());
//!         let _ = msg.ack().wait().await;
//!     }
//!
//!     broker.close().await.ok();
//! }
//! ```

mod config;
mod core;
mod error;
mod handles;
mod handlers;
mod module;
mod payload;
mod registry;

pub use crate::config::BrokerConfig;
pub use crate::core::{Broker, MessageId, SubscriberId, Topic};
pub use crate::error::{BrokerError, QueueKind, ScanError};
pub use crate::handles::{Completion, Message, Subscription};
pub use crate::handlers::{Handler, HandlerFn};
pub use crate::module::{Hook, Module};
pub use crate::payload::{EventDescriptor, EventPayload, Payload, ScanOptions};
pub use crate::registry::BrokerRegistry;
