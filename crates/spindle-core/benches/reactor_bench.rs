//! Reactor benchmarks
//!
//! Measures event dispatch and drain throughput on a single core.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use spindle_core::{EventArg, NoopTimers, Platform, Runtime, RuntimeConfig};
use std::hint::black_box;

/// Single-core platform so the bench never depends on the host topology.
struct BenchMachine;

impl Platform for BenchMachine {
    fn master_core(&self) -> u32 {
        0
    }

    fn is_core_enabled(&self, core: u32) -> bool {
        core == 0
    }

    fn pin_current_thread(&self, _core: u32) {}

    fn set_current_thread_name(&self, _name: &str) {}
}

fn bench_runtime() -> Runtime {
    let config = RuntimeConfig::builder().core_mask("0x1").build().unwrap();
    Runtime::init_with(config, Box::new(BenchMachine), Box::new(NoopTimers)).unwrap()
}

fn noop(_rt: &Runtime, _a1: &EventArg, _a2: &EventArg) {}

/// Benchmark a full allocate, call, drain round trip for one event.
fn bench_event_round_trip(c: &mut Criterion) {
    let rt = bench_runtime();

    c.bench_function("event_round_trip", |b| {
        b.iter(|| {
            let event = rt.event_allocate(0, noop, EventArg::none(), EventArg::none(), None);
            rt.event_call(black_box(event));
            rt.event_queue_run_all(0);
        });
    });
}

/// Benchmark draining batches of queued events.
fn bench_event_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_drain");

    for batch_size in &[100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let rt = bench_runtime();
                b.iter(|| {
                    for _ in 0..batch_size {
                        let event = rt.event_allocate(
                            0,
                            noop,
                            EventArg::none(),
                            EventArg::none(),
                            None,
                        );
                        rt.event_call(event);
                    }
                    rt.event_queue_run_all(0);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark continuation chains: each event triggers one follow-up.
fn bench_event_continuation(c: &mut Criterion) {
    let rt = bench_runtime();

    c.bench_function("event_continuation", |b| {
        b.iter(|| {
            let next = rt.event_allocate(0, noop, EventArg::none(), EventArg::none(), None);
            let first =
                rt.event_allocate(0, noop, EventArg::none(), EventArg::none(), Some(next));
            rt.event_call(first);
            // Two drains: the continuation enqueues after the snapshot.
            rt.event_queue_run_all(0);
            rt.event_queue_run_all(0);
        });
    });
}

criterion_group!(
    benches,
    bench_event_round_trip,
    bench_event_drain,
    bench_event_continuation
);
criterion_main!(benches);
