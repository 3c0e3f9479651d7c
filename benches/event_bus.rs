//! Event bus benchmark suite.
//!
//! Benchmarks emission and subscription at different subscriber counts.
//!
//! Run with: cargo bench --bench event_bus
//! Results saved to: target/criterion/

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use wscast::bus::EventBus;
use wscast::{CloseCode, Disconnect, Event};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SUBSCRIBER_COUNTS: &[usize] = &[1, 8, 64];

// ============================================================================
// Benchmark: Emit Throughput
// ============================================================================

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("bus_emit");

    for &count in SUBSCRIBER_COUNTS {
        group.bench_with_input(
            BenchmarkId::from_parameter(count),
            &count,
            |b, &subscriber_count| {
                let bus = EventBus::new();
                let mut subscribers: Vec<_> =
                    (0..subscriber_count).map(|_| bus.subscribe()).collect();

                b.iter(|| {
                    bus.emit(Event::Text("benchmark payload".into()));
                    for stream in &mut subscribers {
                        while stream.try_recv().is_some() {}
                    }
                });
            },
        );
    }

    group.finish();
}

// ============================================================================
// Benchmark: Subscribe With Replay
// ============================================================================

fn bench_subscribe_replay(c: &mut Criterion) {
    let bus = EventBus::new();
    bus.emit(Event::Disconnected {
        reason: Disconnect::closed(CloseCode::NORMAL, Some("bye".into())),
    });

    c.bench_function("bus_subscribe_replay", |b| {
        b.iter(|| {
            let mut stream = bus.subscribe();
            stream.try_recv()
        });
    });
}

criterion_group!(benches, bench_emit, bench_subscribe_replay);
criterion_main!(benches);
