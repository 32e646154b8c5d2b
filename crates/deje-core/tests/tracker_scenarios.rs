//! Integration tests: checkpoint ordering → tracker → materialized state.
//!
//! Covers:
//!   - Ledger-ordered checkpoints (block height, then hash) picking a fork
//!   - Collaborator failures surfaced verbatim and the previous run kept
//!   - Stale and foreign checkpoints skipped without moving the head
//!   - Events that cannot replay skipped the same way
//!   - Observers seeing every primitive the tracker replays
//!   - Two peers converging on the same tip over gossip

use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use deje_core::broadcast::Broadcaster;
use deje_core::container::PathKey;
use deje_core::document::Document;
use deje_core::error::ErrorCode;
use deje_core::event::Event;
use deje_core::primitive::Primitive;
use deje_core::protocol::Session;
use deje_core::quorum::Quorum;
use deje_core::timestamp::{
    DocumentTimestampService, LedgerTimestampService, Timestamp, TimestampService,
};
use deje_core::tracker::{TimestampTracker, TrackerError};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct Forked {
    root: Event,
    left: Event,
    left_child: Event,
    right: Event,
}

fn forked(doc: &mut Document) -> Forked {
    let root = Event::set(Vec::<PathKey>::new(), json!({"side": null, "n": 0})).build();
    let left = Event::set(["side"], "left").parent(&root).build();
    let left_child = Event::set(["n"], 1).parent(&left).build();
    let right = Event::set(["side"], "right").parent(&root).build();
    for e in [&root, &left, &left_child, &right] {
        doc.register_event(e.clone());
    }
    Forked {
        root,
        left,
        left_child,
        right,
    }
}

fn quorum(doc: &mut Document, event: &Event, signer: &str) -> Quorum {
    let q = Quorum::for_event(event).sign(signer, "sig").build();
    doc.register_quorum(q.clone());
    q
}

/// Fails on the calls whose index is listed, otherwise reads the document.
struct Flaky {
    calls: Cell<usize>,
    fail_on: Vec<usize>,
}

impl TimestampService for Flaky {
    type Error = String;

    fn get_timestamps(&self, topic: &str, doc: &Document) -> Result<Vec<String>, String> {
        let call = self.calls.get();
        self.calls.set(call + 1);
        if self.fail_on.contains(&call) {
            return Err(format!("oracle for {topic} unreachable"));
        }
        Ok(doc.timestamps().to_vec())
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn ledger_order_decides_between_forks() {
    let mut doc = Document::new("forks");
    let f = forked(&mut doc);
    let q_root = quorum(&mut doc, &f.root, "a");
    let q_left = quorum(&mut doc, &f.left_child, "a");
    let q_right = quorum(&mut doc, &f.right, "b");

    // Right is confirmed in an earlier block than left.
    let mut service = LedgerTimestampService::default();
    service.ledger_mut().register(Timestamp::new(q_left.hash(), 12));
    service.ledger_mut().register(Timestamp::new(q_right.hash(), 11));
    service.ledger_mut().register(Timestamp::new(q_root.hash(), 10));

    {
        let mut tracker = TimestampTracker::new(&service);
        let tip = tracker.go_to_latest(&mut doc).map(str::to_string);
        assert_eq!(tip.as_deref(), Some(f.right.hash()));
        assert_eq!(doc.state().export(), json!({"side": "right", "n": 0}));

        assert_eq!(tracker.errors().len(), 1);
        let skipped = &tracker.errors()[0];
        assert_eq!(skipped.position, Some(2));
        assert_eq!(skipped.error.code(), ErrorCode::IncompatibleCheckpoint);
        assert_eq!(skipped.tip.as_deref(), Some(f.right.hash()));
    }

    // Reorder: left confirmed first. A fresh pass recomputes from scratch.
    service.ledger_mut().unregister(q_left.hash());
    service.ledger_mut().register(Timestamp::new(q_left.hash(), 10));
    let mut tracker = TimestampTracker::new(&service);
    assert_eq!(tracker.go_to_latest(&mut doc), Some(f.left_child.hash()));
    assert_eq!(doc.state().export(), json!({"side": "left", "n": 1}));
}

#[test]
fn stale_checkpoint_does_not_rewind() {
    let mut doc = Document::new("stale");
    let f = forked(&mut doc);
    doc.set_timestamps(vec![
        f.left.hash().to_string(),
        f.left_child.hash().to_string(),
        f.root.hash().to_string(),
        "0000000000000000000000000000000000000000".to_string(),
    ]);

    let mut tracker = TimestampTracker::new(DocumentTimestampService);
    assert_eq!(tracker.go_to_latest(&mut doc), Some(f.left_child.hash()));
    let codes: Vec<_> = tracker.errors().iter().map(|e| e.error.code()).collect();
    assert_eq!(
        codes,
        [ErrorCode::IncompatibleCheckpoint, ErrorCode::EventNotFound]
    );
    assert_eq!(
        tracker.errors()[0].to_string(),
        format!(
            "error on iteration 2 (current tip: '{}'): event {} is not compatible with and ahead of tip {}",
            f.left_child.hash(),
            f.root.hash(),
            f.left_child.hash()
        )
    );
}

#[test]
fn far_list_index_is_skipped_not_fatal() {
    let mut doc = Document::new("padding");
    let root = Event::set(Vec::<PathKey>::new(), json!({"l": []})).build();
    let far = Event::set(
        vec![PathKey::from("l"), PathKey::from(1_000_000_000_000_usize)],
        1,
    )
    .parent(&root)
    .build();
    for e in [&root, &far] {
        doc.register_event(e.clone());
    }
    doc.set_timestamps(vec![root.hash().to_string(), far.hash().to_string()]);

    let mut tracker = TimestampTracker::new(DocumentTimestampService);
    assert_eq!(tracker.go_to_latest(&mut doc), Some(root.hash()));
    assert_eq!(tracker.errors().len(), 1);
    assert_eq!(tracker.errors()[0].position, Some(1));
    assert_eq!(tracker.errors()[0].error.code(), ErrorCode::IndexOutOfRange);
    assert_eq!(doc.state().export(), json!({"l": []}));
}

#[test]
fn oracle_failure_keeps_previous_run() {
    let mut doc = Document::new("flaky");
    let f = forked(&mut doc);
    doc.set_timestamps(vec![f.right.hash().to_string()]);
    let mut tracker = TimestampTracker::new(Flaky {
        calls: Cell::new(0),
        fail_on: vec![1],
    });

    assert_eq!(tracker.go_to_latest(&mut doc), Some(f.right.hash()));

    doc.set_timestamps(vec![f.left.hash().to_string()]);
    assert_eq!(tracker.go_to_latest(&mut doc), Some(f.right.hash()));
    assert_eq!(tracker.timestamps(), [f.right.hash().to_string()]);
    let failure = tracker.errors().last().expect("failure recorded");
    assert_eq!(failure.position, None);
    assert_eq!(
        failure.error,
        TrackerError::Service("oracle for flaky unreachable".into())
    );
    assert_eq!(failure.to_string(), "oracle for flaky unreachable");

    // The third call succeeds again and moves to the new checkpoint.
    assert_eq!(tracker.go_to_latest(&mut doc), Some(f.left.hash()));
    assert!(tracker.errors().is_empty());
}

#[test]
fn observers_see_replayed_primitives() {
    let mut doc = Document::new("observed");
    let f = forked(&mut doc);
    doc.set_timestamps(vec![f.left_child.hash().to_string()]);

    let broadcaster = Arc::new(Broadcaster::new().expect("spawn relay"));
    let sub = broadcaster.subscribe();
    doc.state_mut().attach(Arc::clone(&broadcaster));

    let mut tracker = TimestampTracker::new(DocumentTimestampService);
    tracker.go_to_latest(&mut doc);

    let mut seen = Vec::new();
    while let Some(p) = sub.recv_timeout(Duration::from_secs(2)) {
        seen.push(p);
        if seen.len() == 4 {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![
            Primitive::set(Vec::<PathKey>::new(), json!({})),
            Primitive::set(Vec::<PathKey>::new(), json!({"side": null, "n": 0})),
            Primitive::set(["side"], "left"),
            Primitive::set(["n"], 1),
        ]
    );
    broadcaster.close();
}

#[test]
fn peers_converge_over_gossip() {
    let mut alice = Document::new("shared");
    let f = forked(&mut alice);
    let q = quorum(&mut alice, &f.left_child, "alice");
    alice.push_timestamp(q.hash());

    let (tx, rx) = flume::unbounded();
    let mut outbound = Session::new(tx);
    for event in alice.events().iter() {
        outbound.publish_event(event).expect("publish");
    }
    outbound.publish_quorum(&q).expect("publish");

    let mut bob = Document::new("shared");
    bob.set_timestamps(alice.timestamps().to_vec());
    let mut inbound = Session::new(flume::unbounded::<Vec<u8>>().0);
    for bytes in rx.try_iter() {
        inbound.on_message(&mut bob, &bytes).expect("deliver");
    }
    assert_eq!(bob.to_file(), alice.to_file());

    let mut ta = TimestampTracker::new(DocumentTimestampService);
    let mut tb = TimestampTracker::new(DocumentTimestampService);
    let tip_a = ta.go_to_latest(&mut alice).map(str::to_string);
    let tip_b = tb.go_to_latest(&mut bob).map(str::to_string);
    assert_eq!(tip_a, tip_b);
    assert_eq!(alice.state().export(), bob.state().export());
}
