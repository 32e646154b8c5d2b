//! Replay cost against chain depth.
//!
//! `goto` rebuilds state from the root on every call, so its cost should
//! grow linearly with depth. `common_ancestor` between two fork tips walks
//! both chains back to the fork point.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use deje_core::container::PathKey;
use deje_core::dag::{self, EventStore};
use deje_core::event::Event;
use deje_core::state::DocumentState;
use serde_json::json;

const DEPTHS: [usize; 4] = [10, 100, 1_000, 5_000];

struct Chain {
    store: EventStore,
    tip: String,
    fork_tip: String,
}

/// A linear chain of `depth` events, plus a one-event fork off the root.
fn build_chain(depth: usize) -> Chain {
    let root = Event::set(Vec::<PathKey>::new(), json!({"counter": 0, "log": []})).build();
    let fork = Event::set(["forked"], true).parent(&root).build();
    let mut store = EventStore::new();
    let mut prev = root.clone();
    store.register(root);
    store.register(fork.clone());
    for i in 1..depth {
        let next = if i % 2 == 0 {
            Event::set(["counter"], i).parent(&prev).build()
        } else {
            Event::set([PathKey::from("log"), PathKey::from(0)], json!({"step": i}))
                .parent(&prev)
                .build()
        };
        store.register(next.clone());
        prev = next;
    }
    Chain {
        store,
        tip: prev.hash().to_string(),
        fork_tip: fork.hash().to_string(),
    }
}

fn bench_goto(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay.goto");
    for depth in DEPTHS {
        let chain = build_chain(depth);
        group.throughput(Throughput::Elements(depth as u64));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &chain, |b, chain| {
            let mut state = DocumentState::new();
            b.iter(|| {
                dag::goto(&chain.store, black_box(&chain.tip), &mut state).ok();
                black_box(state.applied().len())
            });
        });
    }
    group.finish();
}

fn bench_common_ancestor(c: &mut Criterion) {
    let mut group = c.benchmark_group("replay.common_ancestor");
    for depth in DEPTHS {
        let chain = build_chain(depth);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &chain, |b, chain| {
            b.iter(|| {
                dag::common_ancestor(&chain.store, black_box(&chain.tip), &chain.fork_tip)
                    .map(Event::hash)
                    .map(str::len)
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_goto, bench_common_ancestor);
criterion_main!(benches);
