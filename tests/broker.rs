//! End-to-end broker behavior: fan-out, acknowledgment, backpressure,
//! lifecycle, and registry forwarding.
//!
//! Tests run on the current-thread runtime, so the command loop only makes
//! progress at await points. Several tests lean on that to stage queue
//! states deterministically.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use courier::{
    Broker, BrokerConfig, BrokerError, BrokerRegistry, EventDescriptor, EventPayload, HandlerFn,
    QueueKind,
};

fn started(tune: impl FnOnce(&mut BrokerConfig)) -> Broker {
    let mut cfg = BrokerConfig::default();
    tune(&mut cfg);
    let broker = Broker::new(cfg);
    broker.start();
    broker
}

async fn within<T>(fut: impl Future<Output = T>) -> T {
    timeout(Duration::from_secs(5), fut)
        .await
        .expect("test timed out")
}

#[tokio::test]
async fn test_fan_out_preserves_order_per_subscriber() {
    let broker = started(|_| {});

    let mut first = within(broker.subscribe("hello")).await;
    let mut second = within(broker.subscribe("hello")).await;
    assert!(first.error().is_none());
    assert_ne!(first.id(), second.id());

    for word in ["halo", "dunia", "apakabar"] {
        within(broker.publish("hello", word).wait()).await.unwrap();
    }

    for sub in [&mut first, &mut second] {
        for expected in ["halo", "dunia", "apakabar"] {
            let msg = within(sub.recv()).await.expect("missing delivery");
            assert_eq!(msg.scan_text().unwrap(), expected);
            within(msg.ack().wait()).await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_copies_for_different_subscribers_have_distinct_ids() {
    let broker = started(|_| {});

    let mut first = within(broker.subscribe("t")).await;
    let mut second = within(broker.subscribe("t")).await;

    within(broker.publish("t", "shared").wait()).await.unwrap();

    let a = within(first.recv()).await.unwrap();
    let b = within(second.recv()).await.unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(a.subscriber(), first.id());
    assert_eq!(b.subscriber(), second.id());
}

#[tokio::test]
async fn test_publish_without_subscribers_is_a_successful_noop() {
    let broker = started(|_| {});
    within(broker.publish("nobody-listens", "void").wait())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_publish_before_start_reports_not_initialized() {
    let broker = Broker::new(BrokerConfig::default());
    let result = within(broker.publish("t", "early").wait()).await;
    assert!(matches!(result, Err(BrokerError::NotInitialized)));

    let sub = within(broker.subscribe("t")).await;
    assert!(matches!(sub.error(), Some(BrokerError::NotInitialized)));
    assert!(sub.is_done());
}

#[tokio::test]
async fn test_full_subscriber_buffer_rejects_the_whole_publish() {
    let broker = started(|cfg| cfg.sub_buffer_size = 2);

    let mut slow = within(broker.subscribe("busy")).await;

    within(broker.publish("busy", "one").wait()).await.unwrap();
    within(broker.publish("busy", "two").wait()).await.unwrap();

    let result = within(broker.publish("busy", "three").wait()).await;
    assert!(matches!(
        result,
        Err(BrokerError::Backpressure {
            queue: QueueKind::Subscriber
        })
    ));

    // other topics are unaffected
    within(broker.publish("idle", "fine").wait()).await.unwrap();

    // draining the queue restores admission
    let msg = within(slow.recv()).await.unwrap();
    within(msg.ack().wait()).await.unwrap();
    within(broker.publish("busy", "three").wait()).await.unwrap();
}

#[tokio::test]
async fn test_full_command_buffer_rejects_immediately() {
    // the loop only runs at await points, so two back-to-back publishes
    // observe a command queue of one as full
    let broker = started(|cfg| cfg.cmd_buffer_size = 1);

    let queued = broker.publish("t", "first");
    let rejected = within(broker.publish("t", "second").wait()).await;
    assert!(matches!(
        rejected,
        Err(BrokerError::Backpressure {
            queue: QueueKind::Command
        })
    ));

    within(queued.wait()).await.unwrap();
}

#[tokio::test]
async fn test_full_publish_buffer_rejects_the_overflowing_publish() {
    let broker = started(|cfg| cfg.pub_buffer_size = 1);

    let first = broker.publish("t", "fits");
    let second = broker.publish("t", "overflows");

    within(first.wait()).await.unwrap();
    assert!(matches!(
        within(second.wait()).await,
        Err(BrokerError::Backpressure {
            queue: QueueKind::Publish
        })
    ));
}

#[tokio::test]
async fn test_nack_redelivers_the_same_message() {
    let broker = started(|_| {});
    let mut sub = within(broker.subscribe("retry")).await;

    within(broker.publish("retry", "again").wait())
        .await
        .unwrap();

    let first = within(sub.recv()).await.unwrap();
    within(first.nack().wait()).await.unwrap();

    let redelivered = within(sub.recv()).await.unwrap();
    assert_eq!(redelivered.id(), first.id());
    assert_eq!(redelivered.scan_text().unwrap(), "again");
    within(redelivered.ack().wait()).await.unwrap();
}

#[tokio::test]
async fn test_nack_after_ack_reports_already_closed() {
    let broker = started(|_| {});
    let mut sub = within(broker.subscribe("once")).await;

    within(broker.publish("once", "done").wait()).await.unwrap();
    let msg = within(sub.recv()).await.unwrap();

    within(msg.ack().wait()).await.unwrap();
    let result = within(msg.nack().wait()).await;
    assert!(matches!(result, Err(BrokerError::AlreadyClosed)));
}

#[tokio::test]
async fn test_nacking_without_draining_hits_backpressure() {
    let broker = started(|cfg| cfg.sub_buffer_size = 2);
    let mut sub = within(broker.subscribe("loop")).await;

    within(broker.publish("loop", "hot").wait()).await.unwrap();
    let msg = within(sub.recv()).await.unwrap();

    let mut saw_backpressure = false;
    for _ in 0..10 {
        match within(msg.nack().wait()).await {
            Ok(()) => {}
            Err(BrokerError::Backpressure {
                queue: QueueKind::Subscriber,
            }) => {
                saw_backpressure = true;
                break;
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(saw_backpressure);
}

#[tokio::test]
async fn test_nack_to_removed_subscriber_reports_already_closed() {
    let broker = started(|_| {});
    let mut keeper = within(broker.subscribe("shared")).await;
    let mut leaver = within(broker.subscribe("shared")).await;

    within(broker.publish("shared", "payload").wait())
        .await
        .unwrap();
    let kept = within(keeper.recv()).await.unwrap();
    let orphaned = within(leaver.recv()).await.unwrap();

    within(leaver.close()).await.unwrap();

    let result = within(orphaned.nack().wait()).await;
    assert!(matches!(result, Err(BrokerError::AlreadyClosed)));

    // the broker itself is unaffected
    within(kept.ack().wait()).await.unwrap();
    within(broker.publish("shared", "still-alive").wait())
        .await
        .unwrap();
    assert!(within(keeper.recv()).await.is_some());
}

#[tokio::test]
async fn test_ack_after_subscription_close_reports_canceled() {
    let broker = started(|_| {});
    let mut sub = within(broker.subscribe("t")).await;

    within(broker.publish("t", "held").wait()).await.unwrap();
    let msg = within(sub.recv()).await.unwrap();

    within(sub.close()).await.unwrap();

    let result = within(msg.ack().wait()).await;
    assert!(matches!(result, Err(BrokerError::Canceled)));
}

#[tokio::test]
async fn test_dropping_a_receiving_handle_unsubscribes() {
    let broker = started(|cfg| cfg.sub_buffer_size = 2);
    let mut sub = within(broker.subscribe("leaky")).await;

    within(broker.publish("leaky", "held").wait()).await.unwrap();
    let msg = within(sub.recv()).await.unwrap();

    // the drop fires an unsubscribe; the loop services it before the
    // publishes queued after it
    drop(sub);

    for _ in 0..5 {
        within(broker.publish("leaky", "noise").wait())
            .await
            .unwrap();
    }

    // the registration is gone, so the pre-drop message is orphaned
    assert!(matches!(
        within(msg.nack().wait()).await,
        Err(BrokerError::AlreadyClosed)
    ));
    assert!(matches!(
        within(msg.ack().wait()).await,
        Err(BrokerError::Canceled)
    ));

    // and the topic accepts fresh subscribers as usual
    let mut fresh = within(broker.subscribe("leaky")).await;
    within(broker.publish("leaky", "clean").wait())
        .await
        .unwrap();
    assert!(within(fresh.recv()).await.is_some());
}

#[tokio::test]
async fn test_dead_delivery_queue_is_reclaimed_at_fan_out() {
    // a command queue of one swallows the drop's unsubscribe attempt, so
    // reclamation has to happen lazily when fan-out hits the closed queue
    let broker = started(|cfg| {
        cfg.cmd_buffer_size = 1;
        cfg.sub_buffer_size = 2;
    });
    let mut sub = within(broker.subscribe("t")).await;

    within(broker.publish("t", "held").wait()).await.unwrap();
    let msg = within(sub.recv()).await.unwrap();

    let pending = broker.publish("t", "triggers-reclaim");
    drop(sub); // command queue full: the unsubscribe is not delivered
    within(pending.wait()).await.unwrap();

    // fan-out saw the closed queue and removed the subscriber
    assert!(matches!(
        within(msg.nack().wait()).await,
        Err(BrokerError::AlreadyClosed)
    ));

    // the topic keeps working with the zombie gone
    within(broker.publish("t", "onward").wait()).await.unwrap();
}

#[tokio::test]
async fn test_dropping_a_control_only_handle_keeps_the_worker_consuming() {
    let broker = started(|_| {});

    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    let handler = HandlerFn::new(move |msg| {
        let counter = Arc::clone(&counter);
        async move {
            let _ = msg.ack().wait().await;
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let sub = broker.subscribe_handler("work", handler).await;
    assert!(sub.error().is_none());
    drop(sub); // the worker owns the stream; dropping the handle is fine

    within(broker.publish("work", "still-routed").wait())
        .await
        .unwrap();

    within(async {
        while handled.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
    })
    .await;
}

#[tokio::test]
async fn test_progress_currently_always_succeeds() {
    let broker = started(|_| {});
    let mut sub = within(broker.subscribe("slow-work")).await;

    within(broker.publish("slow-work", "crunch").wait())
        .await
        .unwrap();
    let msg = within(sub.recv()).await.unwrap();

    within(msg.progress().wait()).await.unwrap();
    within(msg.ack().wait()).await.unwrap();
}

#[tokio::test]
async fn test_closing_a_subscription_twice_reports_already_closed() {
    let broker = started(|_| {});
    let sub = within(broker.subscribe("t")).await;

    within(sub.close()).await.unwrap();
    assert!(sub.is_done());

    let second = within(sub.close()).await;
    assert!(matches!(second, Err(BrokerError::AlreadyClosed)));
}

#[tokio::test]
async fn test_graceful_close_drains_accepted_publishes() {
    let broker = started(|cfg| cfg.wait_on_close = true);
    let mut sub = within(broker.subscribe("t")).await;

    // queued before the close signal; the loop services it first
    let pending = broker.publish("t", "in-flight");
    within(broker.close()).await.unwrap();

    within(pending.wait()).await.unwrap();

    // buffered but unconsumed deliveries are dropped at close
    assert!(sub.is_done());
    assert!(within(sub.recv()).await.is_none());
}

#[tokio::test]
async fn test_direct_close_rejects_the_accepted_backlog() {
    let broker = started(|cfg| cfg.wait_on_close = false);
    let _sub = within(broker.subscribe("t")).await;

    let pending = broker.publish("t", "too-late");
    within(broker.close()).await.unwrap();

    assert!(matches!(
        within(pending.wait()).await,
        Err(BrokerError::Stopped)
    ));
}

#[tokio::test]
async fn test_operations_after_close_report_stopped() {
    let broker = started(|_| {});
    within(broker.close()).await.unwrap();

    let result = within(broker.publish("t", "late").wait()).await;
    assert!(matches!(result, Err(BrokerError::Stopped)));

    let sub = within(broker.subscribe("t")).await;
    assert!(matches!(sub.error(), Some(BrokerError::Stopped)));
    assert!(sub.is_done());
    assert!(matches!(within(sub.close()).await, Err(BrokerError::AlreadyClosed)));

    assert!(matches!(
        within(broker.close()).await,
        Err(BrokerError::Stopped)
    ));
}

#[tokio::test]
async fn test_concurrent_close_callers_all_block_until_stopped() {
    let broker = started(|_| {});

    // polled in order on the current-thread runtime: the first close takes
    // the signal slot, the second finds it occupied and must still wait
    let (winner, loser) = tokio::join!(
        within(broker.close()),
        within(broker.close()),
    );

    assert!(winner.is_ok());
    assert!(matches!(loser, Err(BrokerError::Stopped)));
    assert!(!broker.is_running());
}

#[tokio::test]
async fn test_close_fires_every_subscription_done_signal() {
    let broker = started(|_| {});
    let sub = within(broker.subscribe("t")).await;
    assert!(!sub.is_done());

    within(broker.close()).await.unwrap();
    within(sub.done()).await;
    assert!(sub.is_done());
}

#[tokio::test]
async fn test_broker_restarts_after_close() {
    let broker = started(|_| {});
    let old = within(broker.subscribe("t")).await;
    within(broker.close()).await.unwrap();

    broker.start();
    assert!(broker.is_running());

    // previous-generation handles stay dead
    assert!(old.is_done());

    let mut sub = within(broker.subscribe("t")).await;
    assert!(sub.error().is_none());
    within(broker.publish("t", "second-life").wait())
        .await
        .unwrap();
    assert!(within(sub.recv()).await.is_some());
}

#[tokio::test]
async fn test_event_payload_roundtrips_through_the_broker() {
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct NetworkStatus {
        up: bool,
        #[serde(rename = "x-meta-host")]
        host: String,
    }

    impl EventDescriptor for NetworkStatus {
        fn event_name() -> &'static str {
            "network-status"
        }

        fn to_event(&self) -> EventPayload {
            EventPayload::new(Self::event_name()).with_data("up", self.up)
        }
    }

    let broker = started(|_| {});
    let mut sub = within(broker.subscribe("net")).await;

    let event = EventPayload::new("network-status")
        .with_data("up", true)
        .with_meta("host", "gateway-1");
    within(broker.publish("net", event).wait()).await.unwrap();

    let msg = within(sub.recv()).await.unwrap();
    let status: NetworkStatus = msg.scan_event().unwrap();
    assert!(status.up);
    assert_eq!(status.host, "gateway-1");
    within(msg.ack().wait()).await.unwrap();
}

#[tokio::test]
async fn test_handler_receives_and_survives_panics() {
    let broker = started(|_| {});

    let handled = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&handled);
    let handler = HandlerFn::new(move |msg| {
        let counter = Arc::clone(&counter);
        async move {
            let text = msg.scan_text().unwrap();
            let _ = msg.ack().wait().await;
            if text == "boom" {
                panic!("handler blew up");
            }
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let sub = broker.subscribe_handler("work", handler).await;
    assert!(sub.error().is_none());

    within(broker.publish("work", "boom").wait()).await.unwrap();
    within(broker.publish("work", "fine").wait()).await.unwrap();

    within(async {
        while handled.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
    })
    .await;

    within(sub.close()).await.unwrap();
}

#[tokio::test]
async fn test_registry_forwards_once_registered() {
    let registry = BrokerRegistry::new();

    let early = within(registry.publish("t", "nobody").wait()).await;
    assert!(matches!(early, Err(BrokerError::NotInitialized)));

    let broker = Arc::new(started(|_| {}));
    registry.register(Arc::clone(&broker));

    let mut sub = within(registry.subscribe("t")).await;
    assert!(sub.error().is_none());

    within(registry.publish("t", "routed").wait()).await.unwrap();
    let msg = within(sub.recv()).await.unwrap();
    assert_eq!(msg.scan_text().unwrap(), "routed");
    within(msg.ack().wait()).await.unwrap();

    registry.clear();
    let late = within(registry.publish("t", "gone").wait()).await;
    assert!(matches!(late, Err(BrokerError::NotInitialized)));
}
