//! # Broker configuration.
//!
//! Provides [`BrokerConfig`] — the buffer sizes and shutdown policy for one
//! [`Broker`](crate::Broker) instance.
//!
//! The struct deserializes from the `broker` section of an application
//! configuration source (see [`BrokerConfig::from_source`]); absent keys fall
//! back to the defaults below.
//!
//! ## Field semantics
//! - `wait_on_close`: graceful (`true`) vs immediate (`false`) shutdown
//! - `cmd_buffer_size`: command queue capacity
//! - `pub_buffer_size`: publish queue capacity
//! - `sub_buffer_size`: per-subscriber delivery queue capacity
//! - `start_on_init`: start the command loop during `Module::init` (`true`)
//!   or defer it to `Hook::run` (`false`)
//!
//! All capacities are clamped to a minimum of 1 when the queues are built.

use serde::Deserialize;

use crate::error::BrokerError;

/// Configuration for a single broker instance.
///
/// All fields are public for flexibility; prefer the `*_clamped` accessors
/// when sizing queues to avoid sprinkling `.max(1)` across the codebase.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Whether `close()` lets already-accepted commands drain before stopping.
    ///
    /// - `true`: the close signal is serviced only once the queued backlog
    ///   has been handled (graceful).
    /// - `false`: the close signal is serviced ahead of ordinary commands;
    ///   anything still queued is rejected with `BrokerError::Stopped`.
    pub wait_on_close: bool,

    /// Capacity of the bounded command queue.
    ///
    /// `publish`, ack/nack/progress, and unsubscribe all submit here without
    /// blocking; a full queue yields a command-buffer backpressure error.
    pub cmd_buffer_size: usize,

    /// Capacity of the bounded publish queue.
    ///
    /// Publishes are forwarded here from the command queue; a full queue
    /// yields a publish-buffer backpressure error for that publish.
    pub pub_buffer_size: usize,

    /// Capacity of each subscriber's bounded delivery queue.
    ///
    /// A publish is admitted only if every target subscriber can accept it;
    /// otherwise the whole publish is rejected with a subscriber-buffer
    /// backpressure error and nothing is enqueued.
    pub sub_buffer_size: usize,

    /// Whether `Module::init` starts the command loop immediately.
    ///
    /// When `false`, the loop starts only when `Hook::run` is invoked.
    pub start_on_init: bool,
}

impl BrokerConfig {
    /// Loads the `broker` section from an application configuration source.
    ///
    /// A missing section yields the defaults; a malformed section yields
    /// [`BrokerError::Config`].
    ///
    /// # Example
    /// ```
    /// use courier::BrokerConfig;
    ///
    /// let source = config::Config::builder()
    ///     .set_override("broker.sub_buffer_size", 32).unwrap()
    ///     .build().unwrap();
    ///
    /// let cfg = BrokerConfig::from_source(&source).unwrap();
    /// assert_eq!(cfg.sub_buffer_size, 32);
    /// assert!(cfg.wait_on_close); // default kept
    /// ```
    pub fn from_source(source: &config::Config) -> Result<Self, BrokerError> {
        match source.get::<BrokerConfig>("broker") {
            Ok(cfg) => Ok(cfg),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(BrokerError::Config(e)),
        }
    }

    /// Command queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn cmd_buffer_clamped(&self) -> usize {
        self.cmd_buffer_size.max(1)
    }

    /// Publish queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn pub_buffer_clamped(&self) -> usize {
        self.pub_buffer_size.max(1)
    }

    /// Per-subscriber delivery queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn sub_buffer_clamped(&self) -> usize {
        self.sub_buffer_size.max(1)
    }
}

impl Default for BrokerConfig {
    /// Default configuration:
    ///
    /// - `wait_on_close = true` (graceful shutdown)
    /// - `cmd_buffer_size = 256`
    /// - `pub_buffer_size = 256`
    /// - `sub_buffer_size = 16`
    /// - `start_on_init = true`
    fn default() -> Self {
        Self {
            wait_on_close: true,
            cmd_buffer_size: 256,
            pub_buffer_size: 256,
            sub_buffer_size: 16,
            start_on_init: true,
        }
    }
}
