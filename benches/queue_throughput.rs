use criterion::{Criterion, black_box, criterion_group, criterion_main};
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

use framegate::core::{AlertSink, Event, EventPriority, EventQueue, EventType};

fn bench_enqueue(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("enqueue_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = EventQueue::new(
                    "bench",
                    2000,
                    10,
                    Duration::from_millis(16),
                    AlertSink::new(16),
                );
                for _ in 0..1000 {
                    let accepted = queue
                        .try_add(
                            Event::new(EventType::CacheUpdate, EventPriority::Low),
                            Duration::from_millis(1),
                        )
                        .await
                        .unwrap();
                    black_box(accepted);
                }
            })
        })
    });
}

fn bench_batch_drain(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("batch_drain_1000", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = EventQueue::new(
                    "bench",
                    2000,
                    10,
                    Duration::from_millis(16),
                    AlertSink::new(16),
                );
                for _ in 0..1000 {
                    queue
                        .try_add(
                            Event::new(EventType::CacheUpdate, EventPriority::Low),
                            Duration::from_millis(1),
                        )
                        .await
                        .unwrap();
                }
                let cancel = CancellationToken::new();
                let mut drained = 0usize;
                while drained < 1000 {
                    drained += queue.take_batch(&cancel).await.len();
                }
                black_box(drained)
            })
        })
    });
}

fn bench_priority_take(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("priority_take_mixed_500", |b| {
        b.iter(|| {
            rt.block_on(async {
                let queue = EventQueue::new(
                    "bench",
                    2000,
                    10,
                    Duration::from_millis(16),
                    AlertSink::new(16),
                );
                for i in 0..500 {
                    let priority = match i % 4 {
                        0 => EventPriority::Critical,
                        1 => EventPriority::High,
                        2 => EventPriority::Medium,
                        _ => EventPriority::Low,
                    };
                    queue
                        .try_add(
                            Event::new(EventType::UserInput, priority),
                            Duration::from_millis(1),
                        )
                        .await
                        .unwrap();
                }
                let cancel = CancellationToken::new();
                for _ in 0..500 {
                    black_box(queue.take_priority(&cancel).await);
                }
            })
        })
    });
}

criterion_group!(benches, bench_enqueue, bench_batch_drain, bench_priority_take);
criterion_main!(benches);
