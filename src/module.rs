//! # Application lifecycle integration.
//!
//! Hosts embedding the broker in a larger application drive it through two
//! small traits instead of calling [`Broker`] methods directly:
//!
//! - [`Module`] — configured at startup (`init`), torn down at shutdown
//!   (`close`);
//! - [`Hook`] — a module with a `run` phase, invoked once the host is ready
//!   to serve.
//!
//! [`Broker`] implements both: `init` loads the `broker` configuration
//! section and (by default) starts the command loop, `run` starts it if
//! `start_on_init` deferred that, and `close` performs a graceful stop.

use async_trait::async_trait;

use crate::config::BrokerConfig;
use crate::core::Broker;
use crate::error::BrokerError;

/// A component with a configured init phase and a shutdown phase.
#[async_trait]
pub trait Module: Send + Sync {
    /// Configures the component from an application configuration source.
    async fn init(&mut self, source: &config::Config) -> Result<(), BrokerError>;

    /// Tears the component down, surfacing the failure to the host.
    async fn close(&mut self) -> Result<(), BrokerError>;
}

/// A [`Module`] with a run phase, invoked once the host is ready.
#[async_trait]
pub trait Hook: Module {
    /// Starts the component's background work.
    async fn run(&mut self) -> Result<(), BrokerError>;
}

#[async_trait]
impl Module for Broker {
    /// Loads the `broker` section and, when `start_on_init` is set (the
    /// default), starts the command loop immediately.
    async fn init(&mut self, source: &config::Config) -> Result<(), BrokerError> {
        let cfg = BrokerConfig::from_source(source)?;
        let start = cfg.start_on_init;
        self.set_config(cfg);
        if start {
            self.start();
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        Broker::close(self).await
    }
}

#[async_trait]
impl Hook for Broker {
    /// Starts the command loop; no-op when `init` already did.
    async fn run(&mut self) -> Result<(), BrokerError> {
        self.start();
        Ok(())
    }
}
