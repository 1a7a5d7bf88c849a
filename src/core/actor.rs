//! # BrokerActor: the command loop.
//!
//! One dedicated task owns all mutable broker state and serializes every
//! operation through message passing — no shared-memory locks anywhere.
//!
//! ## Architecture
//! ```text
//! publishers ──► [command queue] ──┐
//! handles    ──► (bounded)         │
//!                                  ▼
//!                        ┌──────────────────┐     [delivery queue S1] ─► consumer 1
//! close_direct ────────► │   BrokerActor    │ ──► [delivery queue S2] ─► consumer 2
//! close_wait   ────────► │  (single owner)  │     [delivery queue SN] ─► consumer N
//!                        └──────────────────┘
//!                                  ▲
//!                [publish queue] ──┘
//!                (bounded, fed from the command queue)
//! ```
//!
//! ## Loop priority
//! The `select!` is biased, giving a strict servicing order per iteration:
//! 1. global cancellation (enter the drain sequence)
//! 2. `close_direct` (immediate shutdown, ahead of ordinary commands)
//! 3. command queue (subscribe/unsubscribe/ack/nack/progress, publish intake)
//! 4. publish queue (fan-out)
//! 5. `close_wait` (graceful shutdown, only once the backlog above is idle)
//!
//! ## Rules
//! - The three state tables are mutated only here (single-writer discipline).
//! - The loop never blocks on a full buffer: everything outbound is
//!   `try_send`, and failures become typed errors for the specific caller.
//! - A bad command is answered with an error, never allowed to wedge or
//!   panic the loop.
//! - Per-subscriber delivery queues are allocated one slot above the
//!   configured capacity; publish admission rejects when at most one slot
//!   remains, so exactly `sub_buffer_size` messages fit before backpressure.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::config::BrokerConfig;
use crate::core::command::{
    AckCommand, Command, CommandSender, MessageId, NackCommand, ProgressCommand, PublishCommand,
    SubscribeCommand, SubscriberId, Topic, UnsubscribeCommand,
};
use crate::error::{BrokerError, QueueKind};
use crate::handles::{Message, Subscription};

/// One registered subscriber as seen by the loop.
struct SubscriberEntry {
    tx: mpsc::Sender<Message>,
    token: CancellationToken,
    topic: Topic,
}

/// Sole owner of the broker's mutable state.
pub(crate) struct BrokerActor {
    cfg: BrokerConfig,

    /// Global cancellation; firing it moves the loop into draining.
    token: CancellationToken,
    /// Fired once the drain sequence completes; `close()` waits on this.
    stopped: CancellationToken,

    cmd_rx: mpsc::Receiver<Command>,
    pub_tx: mpsc::Sender<PublishCommand>,
    pub_rx: mpsc::Receiver<PublishCommand>,
    close_direct_rx: mpsc::Receiver<()>,
    close_wait_rx: mpsc::Receiver<()>,

    /// Capability handed out to subscriptions and messages.
    commands: CommandSender,

    topics: HashMap<Topic, Vec<SubscriberId>>,
    subs: HashMap<SubscriberId, SubscriberEntry>,
    inflight: HashMap<MessageId, Message>,

    next_message_id: u64,
    next_subscriber_id: u64,
}

impl BrokerActor {
    pub(crate) fn new(
        cfg: BrokerConfig,
        token: CancellationToken,
        stopped: CancellationToken,
        commands: CommandSender,
        cmd_rx: mpsc::Receiver<Command>,
        close_direct_rx: mpsc::Receiver<()>,
        close_wait_rx: mpsc::Receiver<()>,
    ) -> Self {
        let (pub_tx, pub_rx) = mpsc::channel(cfg.pub_buffer_clamped());
        Self {
            cfg,
            token,
            stopped,
            cmd_rx,
            pub_tx,
            pub_rx,
            close_direct_rx,
            close_wait_rx,
            commands,
            topics: HashMap::new(),
            subs: HashMap::new(),
            inflight: HashMap::new(),
            next_message_id: 1,
            next_subscriber_id: 1,
        }
    }

    /// Runs the loop until shutdown, then drains and marks the broker stopped.
    pub(crate) async fn run(mut self) {
        trace!("command loop started");

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    trace!("exiting command loop");
                    break;
                }
                // a close signal and a dropped façade read the same way:
                // recv yields None once the sender is gone, and both mean stop
                _ = self.close_direct_rx.recv() => {
                    trace!("received a close direct");
                    self.token.cancel();
                }
                Some(cmd) = self.cmd_rx.recv() => {
                    self.handle_command(cmd);
                }
                Some(publish) = self.pub_rx.recv() => {
                    self.handle_publish(publish);
                }
                _ = self.close_wait_rx.recv() => {
                    trace!("received a close wait");
                    self.token.cancel();
                }
            }
        }

        self.shutdown();
        trace!("command loop exited");
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Unsubscribe(c) => self.handle_unsubscribe(c),
            Command::Subscribe(c) => self.handle_subscribe(c),
            Command::Ack(c) => self.handle_ack(c),
            Command::Nack(c) => self.handle_nack(c),
            Command::Progress(c) => self.handle_progress(c),
            Command::Publish(c) => self.enqueue_publish(c),
        }
    }

    /// Forwards a publish from the command queue into the publish queue.
    fn enqueue_publish(&mut self, publish: PublishCommand) {
        match self.pub_tx.try_send(publish) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(publish)) => {
                trace!("publish buffer is full");
                let _ = publish.done.send(Err(BrokerError::Backpressure {
                    queue: QueueKind::Publish,
                }));
            }
            Err(mpsc::error::TrySendError::Closed(publish)) => {
                let _ = publish.done.send(Err(BrokerError::Stopped));
            }
        }
    }

    /// Fans a publish out to every subscriber of the topic.
    ///
    /// Admission is all-or-nothing: if any target queue is within one slot
    /// of its capacity, the whole publish is rejected and nothing is
    /// enqueued. A topic without subscribers resolves as a successful no-op.
    fn handle_publish(&mut self, publish: PublishCommand) {
        let targets = match self.topics.get(&publish.topic) {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => {
                let _ = publish.done.send(Ok(()));
                return;
            }
        };

        for id in &targets {
            let Some(entry) = self.subs.get(id) else {
                continue;
            };
            // dead queues don't count against admission; the send pass
            // below reclaims them
            if entry.tx.is_closed() {
                continue;
            }
            if entry.tx.capacity() <= 1 {
                let _ = publish.done.send(Err(BrokerError::Backpressure {
                    queue: QueueKind::Subscriber,
                }));
                return;
            }
        }

        let mut dead = Vec::new();
        for id in targets {
            let Some(entry) = self.subs.get(&id) else {
                continue;
            };
            let message_id = MessageId(self.next_message_id);
            self.next_message_id += 1;

            let msg = Message::new(
                message_id,
                id,
                Arc::clone(&publish.payload),
                entry.token.clone(),
                self.commands.clone(),
            );
            match entry.tx.try_send(msg.clone()) {
                // the record goes in-flight only once the copy is queued;
                // a failed send must not leave an unackable orphan behind
                Ok(()) => {
                    self.inflight.insert(message_id, msg);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    // the receiving handle is gone without an unsubscribe
                    // (dropped while the command queue was full); reclaim
                    // the registration here
                    trace!(subscriber = %id, "delivery queue is gone, removing subscriber");
                    dead.push(id);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    // unreachable: admission just verified room
                    trace!(subscriber = %id, "delivery queue rejected an admitted message");
                }
            }
        }
        for id in dead {
            self.remove_subscriber(id);
        }

        let _ = publish.done.send(Ok(()));
    }

    /// Registers a subscriber and replies with a live handle.
    fn handle_subscribe(&mut self, subscribe: SubscribeCommand) {
        let id = SubscriberId(self.next_subscriber_id);
        self.next_subscriber_id += 1;

        // one slot above the configured capacity; see the admission rule
        let (tx, rx) = mpsc::channel(self.cfg.sub_buffer_clamped() + 1);
        let token = self.token.child_token();

        self.subs.insert(
            id,
            SubscriberEntry {
                tx,
                token: token.clone(),
                topic: subscribe.topic.clone(),
            },
        );
        self.topics
            .entry(subscribe.topic.clone())
            .or_default()
            .push(id);

        trace!(subscriber = %id, topic = %subscribe.topic, "registered subscription");
        let handle = Subscription::live(id, subscribe.topic, token, self.commands.clone(), rx);
        if subscribe.reply.send(handle).is_err() {
            // the caller gave up on the handshake; roll the registration back
            self.remove_subscriber(id);
        }
    }

    /// Tears a subscriber down, reverse order of subscribe.
    fn handle_unsubscribe(&mut self, unsubscribe: UnsubscribeCommand) {
        if !self.subs.contains_key(&unsubscribe.id) {
            let _ = unsubscribe.done.send(Err(BrokerError::AlreadyClosed));
            return;
        }

        trace!(subscriber = %unsubscribe.id, "unsubscribing subscription");
        self.remove_subscriber(unsubscribe.id);
        let _ = unsubscribe.done.send(Ok(()));
    }

    /// Removes a message from the in-flight table.
    fn handle_ack(&mut self, ack: AckCommand) {
        if ack.token.is_cancelled() {
            let _ = ack.done.send(Err(BrokerError::Canceled));
            return;
        }
        self.inflight.remove(&ack.id);
        let _ = ack.done.send(Ok(()));
    }

    /// Re-enqueues an in-flight message to its original subscriber.
    ///
    /// A nack addressed to an unknown message or an already-removed
    /// subscriber is answered with `AlreadyClosed`; the loop never sends on
    /// a torn-down queue.
    fn handle_nack(&mut self, nack: NackCommand) {
        // table lookups first: a removed subscriber cancels its token, and
        // that case must read as AlreadyClosed, not Canceled
        let Some(msg) = self.inflight.get(&nack.id) else {
            let _ = nack.done.send(Err(BrokerError::AlreadyClosed));
            return;
        };
        let Some(entry) = self.subs.get(&nack.subscriber) else {
            let _ = nack.done.send(Err(BrokerError::AlreadyClosed));
            return;
        };
        if nack.token.is_cancelled() {
            let _ = nack.done.send(Err(BrokerError::Canceled));
            return;
        }

        let result = match entry.tx.try_send(msg.clone()) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(BrokerError::Backpressure {
                queue: QueueKind::Subscriber,
            }),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(BrokerError::AlreadyClosed),
        };
        let _ = nack.done.send(result);
    }

    /// No-op placeholder; reserved for a visibility-timeout feature.
    fn handle_progress(&mut self, progress: ProgressCommand) {
        let _ = progress.done.send(Ok(()));
    }

    /// Drain sequence: cancel subscribers, clear tables, answer stragglers.
    fn shutdown(&mut self) {
        trace!("draining command loop");

        // child tokens already observe the global cancel; the explicit
        // cancel covers tokens handed out before this pass runs
        for (_, entry) in self.subs.drain() {
            entry.token.cancel();
        }
        self.topics.clear();
        self.inflight.clear();

        while let Ok(cmd) = self.cmd_rx.try_recv() {
            Self::reject(cmd);
        }
        while let Ok(publish) = self.pub_rx.try_recv() {
            let _ = publish.done.send(Err(BrokerError::Stopped));
        }

        self.stopped.cancel();
    }

    /// Answers a drained command with a stopped error.
    fn reject(cmd: Command) {
        match cmd {
            Command::Publish(c) => {
                let _ = c.done.send(Err(BrokerError::Stopped));
            }
            Command::Subscribe(c) => {
                let _ = c.reply.send(Subscription::failed(None, BrokerError::Stopped));
            }
            Command::Unsubscribe(c) => {
                let _ = c.done.send(Err(BrokerError::Stopped));
            }
            Command::Ack(c) => {
                let _ = c.done.send(Err(BrokerError::Stopped));
            }
            Command::Nack(c) => {
                let _ = c.done.send(Err(BrokerError::Stopped));
            }
            Command::Progress(c) => {
                let _ = c.done.send(Err(BrokerError::Stopped));
            }
        }
    }

    fn remove_subscriber(&mut self, id: SubscriberId) {
        let Some(entry) = self.subs.remove(&id) else {
            return;
        };
        // cancel first so pending per-call operations observe it,
        // then drop the queue, then clear the topic list
        entry.token.cancel();
        if let Some(ids) = self.topics.get_mut(&entry.topic) {
            ids.retain(|s| *s != id);
            if ids.is_empty() {
                self.topics.remove(&entry.topic);
            }
        }
        // records addressed to this subscriber can never be acked again;
        // purge them (a later nack still answers AlreadyClosed)
        self.inflight.retain(|_, msg| msg.subscriber() != id);
    }
}
