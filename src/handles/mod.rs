//! Client-visible handles returned by broker operations.
//!
//! Internal modules:
//! - [`completion`]: single-shot promise for asynchronous verdicts;
//! - [`message`]: one delivered message copy with ack/nack/progress and scan;
//! - [`subscription`]: one registered subscriber's control handle and
//!   delivery stream.

mod completion;
mod message;
mod subscription;

pub use completion::Completion;
pub use message::Message;
pub use subscription::Subscription;
