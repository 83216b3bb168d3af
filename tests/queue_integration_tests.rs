//! End-to-end tests of the priority queue: backpressure at capacity,
//! priority preemption, and batch-take boundaries.
mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use framegate::core::{AlertKind, AlertSink, Event, EventPriority, EventQueue, EventType};

fn queue(capacity: usize, alerts: AlertSink) -> EventQueue {
    EventQueue::new("itest", capacity, 10, Duration::from_millis(16), alerts)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_backpressure_at_capacity() {
    let alerts = AlertSink::new(2048);
    let queue = queue(1000, alerts.clone());
    let mut alert_rx = alerts.subscribe();

    for _ in 0..1000 {
        let accepted = queue
            .try_add(
                Event::new(EventType::UserInput, EventPriority::High),
                Duration::from_millis(10),
            )
            .await
            .unwrap();
        assert!(accepted);
    }
    assert_eq!(queue.len(), 1000);

    // The 1,001st enqueue times out and emits exactly one QueueFull alert.
    let rejected = queue
        .try_add(
            Event::new(EventType::UserInput, EventPriority::High),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
    assert!(!rejected);

    let mut queue_full_count = 0;
    while let Ok(alert) = alert_rx.try_recv() {
        if alert.kind == AlertKind::QueueFull {
            queue_full_count += 1;
        }
    }
    assert_eq!(queue_full_count, 1);
    assert_eq!(queue.stats().total_rejected, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_capacity_minus_one_still_accepts() {
    let alerts = AlertSink::new(64);
    let queue = queue(10, alerts);
    for _ in 0..9 {
        queue
            .try_add(
                Event::new(EventType::CacheUpdate, EventPriority::Low),
                Duration::from_millis(5),
            )
            .await
            .unwrap();
    }
    // One slot left: accepted without waiting.
    assert!(
        queue
            .try_add(
                Event::new(EventType::CacheUpdate, EventPriority::Low),
                Duration::from_millis(5),
            )
            .await
            .unwrap()
    );
    assert!(
        !queue
            .try_add(
                Event::new(EventType::CacheUpdate, EventPriority::Low),
                Duration::from_millis(5),
            )
            .await
            .unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_priority_preemption_over_bulk_writes() {
    let alerts = AlertSink::new(64);
    let queue = queue(100, alerts);
    for _ in 0..50 {
        queue
            .try_add(
                Event::new(EventType::FileWrite, EventPriority::Medium),
                Duration::from_millis(5),
            )
            .await
            .unwrap();
    }
    let urgent = Event::new(EventType::UserInput, EventPriority::Critical);
    let urgent_id = urgent.id.clone();
    queue.try_add(urgent, Duration::from_millis(5)).await.unwrap();

    let cancel = CancellationToken::new();
    let next = queue.take_priority(&cancel).await.unwrap();
    assert_eq!(next.id, urgent_id);
    assert_eq!(next.event_type, EventType::UserInput);
    assert_eq!(queue.len(), 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_batch_boundaries() {
    let alerts = AlertSink::new(64);
    let queue = Arc::new(queue(100, alerts));
    let cancel = CancellationToken::new();

    // Batch of one.
    queue
        .try_add(
            Event::new(EventType::CacheUpdate, EventPriority::Low),
            Duration::from_millis(5),
        )
        .await
        .unwrap();
    assert_eq!(queue.take_batch(&cancel).await.len(), 1);

    // Batch of exactly max_batch_size.
    for _ in 0..10 {
        queue
            .try_add(
                Event::new(EventType::CacheUpdate, EventPriority::Low),
                Duration::from_millis(5),
            )
            .await
            .unwrap();
    }
    assert_eq!(queue.take_batch(&cancel).await.len(), 10);

    // max_batch_size + 1: a full batch, then the remainder on the next call.
    for _ in 0..11 {
        queue
            .try_add(
                Event::new(EventType::CacheUpdate, EventPriority::Low),
                Duration::from_millis(5),
            )
            .await
            .unwrap();
    }
    assert_eq!(queue.take_batch(&cancel).await.len(), 10);
    assert_eq!(queue.take_batch(&cancel).await.len(), 1);
    assert!(queue.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fifo_order_within_priority_band() {
    let alerts = AlertSink::new(64);
    let queue = queue(100, alerts);
    let cancel = CancellationToken::new();

    let mut expected = Vec::new();
    for _ in 0..5 {
        let event = Event::new(EventType::AudioIn, EventPriority::High);
        expected.push(event.id.clone());
        queue.try_add(event, Duration::from_millis(5)).await.unwrap();
    }
    for id in expected {
        assert_eq!(queue.take_priority(&cancel).await.unwrap().id, id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_size_never_exceeds_capacity_under_contention() {
    let alerts = AlertSink::new(64);
    let queue = Arc::new(queue(32, alerts));
    let cancel = CancellationToken::new();

    let mut producers = Vec::new();
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        producers.push(tokio::spawn(async move {
            for _ in 0..50 {
                let _ = queue
                    .try_add(
                        Event::new(EventType::CacheUpdate, EventPriority::Low),
                        Duration::from_millis(2),
                    )
                    .await;
            }
        }));
    }
    let consumer = {
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut taken = 0usize;
            while let Some(_event) = queue.take(&cancel).await {
                taken += 1;
                assert!(queue.len() <= 32, "queue size stayed within capacity");
            }
            taken
        })
    };
    for producer in producers {
        producer.await.unwrap();
    }
    // Let the consumer drain what is left, then stop it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    let taken = consumer.await.unwrap();
    let stats = queue.stats();
    assert_eq!(stats.total_taken, taken as u64);
    assert_eq!(stats.total_added, taken as u64 + stats.depth as u64);
}
