//! # Core: command loop and broker façade.
//!
//! - [`command`] — the closed command protocol and the sender capability;
//! - [`actor`] — the single-owner command loop;
//! - [`broker`] — the public façade that spawns and talks to the loop.

mod actor;
mod broker;
pub(crate) mod command;

pub use broker::Broker;
pub use command::{MessageId, SubscriberId, Topic};
