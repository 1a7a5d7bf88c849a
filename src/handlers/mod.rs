//! # Handlers: consumer callbacks.
//!
//! - [`Handler`] — trait invoked once per delivered message;
//! - [`HandlerFn`] — adapter turning an async closure into a handler.

mod handler;
mod handler_fn;

pub use handler::Handler;
pub use handler_fn::HandlerFn;
