//! # Broker: the public façade over the command loop.
//!
//! A [`Broker`] owns the configuration and a handle to one running
//! [`BrokerActor`](super::actor::BrokerActor) generation. The façade itself
//! holds no message state; every operation is turned into a command and
//! submitted to the loop.
//!
//! ## Lifecycle
//! ```text
//! new() ──► start() ──► publish()/subscribe() ... ──► close() ──► Stopped
//!              ▲                                                     │
//!              └────────────────── start() again ────────────────────┘
//! ```
//!
//! ## Rules
//! - `publish` never blocks: it returns a [`Completion`] resolved later by
//!   the loop (drop it for fire-and-forget).
//! - `subscribe` never fails the caller: errors come back as a handle with
//!   a sticky error and an already-fired done signal.
//! - `close` honors `wait_on_close`: graceful close lets the accepted
//!   backlog drain first, immediate close rejects it with `Stopped`.
//! - After `close` resolves the broker can be started again; handles from
//!   the previous generation stay dead.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};

use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

use crate::config::BrokerConfig;
use crate::core::actor::BrokerActor;
use crate::core::command::{Command, CommandSender, PublishCommand, SubscribeCommand, Topic};
use crate::error::BrokerError;
use crate::handles::{Completion, Subscription};
use crate::handlers::Handler;
use crate::payload::Payload;

/// Channels into one running command-loop generation.
struct Core {
    commands: CommandSender,
    close_direct: mpsc::Sender<()>,
    close_wait: mpsc::Sender<()>,
    token: CancellationToken,
    stopped: CancellationToken,
}

/// In-process publish/subscribe broker.
///
/// Cheap to share behind an [`Arc`]; all methods take `&self`.
pub struct Broker {
    config: BrokerConfig,
    core: RwLock<Option<Arc<Core>>>,
}

impl Broker {
    /// Creates a broker with the given configuration. The command loop does
    /// not run until [`Broker::start`] is called.
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            core: RwLock::new(None),
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Replaces the configuration. Takes effect at the next [`Broker::start`];
    /// a loop that is already live keeps the sizes it was built with.
    pub fn set_config(&mut self, config: BrokerConfig) {
        self.config = config;
    }

    /// Whether a command loop is currently live.
    pub fn is_running(&self) -> bool {
        self.live_core().is_ok()
    }

    /// Spawns the command loop.
    ///
    /// No-op while a loop is already live; after a close, starts a fresh
    /// generation (handles from the previous one stay dead).
    pub fn start(&self) {
        let mut guard = match self.core.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(core) = guard.as_ref() {
            if !core.token.is_cancelled() {
                return;
            }
        }

        let token = CancellationToken::new();
        let stopped = CancellationToken::new();

        let (cmd_tx, cmd_rx) = mpsc::channel(self.config.cmd_buffer_clamped());
        let (close_direct_tx, close_direct_rx) = mpsc::channel(1);
        let (close_wait_tx, close_wait_rx) = mpsc::channel(1);
        let commands = CommandSender::new(cmd_tx);

        let actor = BrokerActor::new(
            self.config.clone(),
            token.clone(),
            stopped.clone(),
            commands.clone(),
            cmd_rx,
            close_direct_rx,
            close_wait_rx,
        );
        tokio::spawn(actor.run());
        trace!("broker started");

        *guard = Some(Arc::new(Core {
            commands,
            close_direct: close_direct_tx,
            close_wait: close_wait_tx,
            token,
            stopped,
        }));
    }

    /// Publishes a payload to every current subscriber of `topic`.
    ///
    /// Never blocks: the returned [`Completion`] resolves once the loop has
    /// fanned the message out (or rejected it). Publishing to a topic with
    /// no subscribers resolves `Ok` without queuing anything.
    pub fn publish(&self, topic: impl Into<Topic>, payload: impl Into<Payload>) -> Completion {
        let core = match self.live_core() {
            Ok(core) => core,
            Err(e) => return Completion::ready(Err(e)),
        };

        let (done, completion) = Completion::channel();
        let cmd = Command::Publish(PublishCommand {
            topic: topic.into(),
            payload: Arc::new(payload.into()),
            done,
        });
        match core.commands.try_send(cmd) {
            Ok(()) => completion,
            Err(e) => Completion::ready(Err(e)),
        }
    }

    /// Registers a subscriber on `topic`.
    ///
    /// Always returns a handle. On an unstarted or stopped broker the handle
    /// carries a sticky [`Subscription::error`] and its done signal has
    /// already fired, so consumption loops exit instead of hanging.
    pub async fn subscribe(&self, topic: impl Into<Topic>) -> Subscription {
        let core = match self.live_core() {
            Ok(core) => core,
            Err(e) => return Subscription::failed(None, e),
        };

        let (reply, rx) = oneshot::channel();
        let cmd = Command::Subscribe(SubscribeCommand {
            topic: topic.into(),
            reply,
        });
        // subscribe is a handshake, not a hot-path operation; waiting out a
        // momentarily full command queue beats bouncing backpressure errors
        if core.commands.send(cmd).await.is_err() {
            return Subscription::failed(None, BrokerError::Stopped);
        }
        match rx.await {
            Ok(sub) => sub,
            Err(_) => Subscription::failed(None, BrokerError::Stopped),
        }
    }

    /// Registers a subscriber on `topic` and drives `handler` for every
    /// delivered message on a background task.
    ///
    /// The returned handle is control-only (its delivery stream is owned by
    /// the background task): use it to `close()` or await `done()`. A panic
    /// inside the handler is caught and logged; the loop keeps consuming.
    pub async fn subscribe_handler<H: Handler>(
        &self,
        topic: impl Into<Topic>,
        handler: H,
    ) -> Subscription {
        let mut sub = self.subscribe(topic).await;
        let Some(mut rx) = sub.take_receiver() else {
            return sub;
        };

        let token = sub.token();
        let topic = Arc::<str>::from(sub.topic());
        tokio::spawn(async move {
            loop {
                let msg = tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };

                let fut = AssertUnwindSafe(handler.handle(msg)).catch_unwind();
                if let Err(panic) = fut.await {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(topic = %topic, reason = %reason, "handler panicked");
                }
            }
            trace!(topic = %topic, "handler loop exited");
        });

        sub
    }

    /// Stops the command loop and waits until it has fully drained.
    ///
    /// With `wait_on_close = true` the already-accepted backlog is handled
    /// first; with `false` the loop stops ahead of it and rejects the
    /// backlog with [`BrokerError::Stopped`]. Closing an unstarted or
    /// already-closed broker yields [`BrokerError::Stopped`].
    ///
    /// Concurrent closers all block until the loop has fully stopped; only
    /// the one whose signal landed resolves `Ok`.
    pub async fn close(&self) -> Result<(), BrokerError> {
        let Ok(core) = self.live_core() else {
            return Err(BrokerError::Stopped);
        };

        let signal = if self.config.wait_on_close {
            &core.close_wait
        } else {
            &core.close_direct
        };
        if signal.try_send(()).is_err() {
            // a close is already in flight or the loop is gone; every close
            // caller still blocks until the loop has fully stopped
            core.stopped.cancelled().await;
            return Err(BrokerError::Stopped);
        }

        core.stopped.cancelled().await;
        trace!("broker stopped");
        Ok(())
    }

    /// Live (started, not yet cancelled) core.
    ///
    /// Distinguishes never-started ([`BrokerError::NotInitialized`]) from
    /// started-then-closed ([`BrokerError::Stopped`]).
    fn live_core(&self) -> Result<Arc<Core>, BrokerError> {
        let guard = match self.core.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            None => Err(BrokerError::NotInitialized),
            Some(core) if core.token.is_cancelled() => Err(BrokerError::Stopped),
            Some(core) => Ok(Arc::clone(core)),
        }
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}
