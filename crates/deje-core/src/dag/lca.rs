//! Common ancestors and fork compatibility.
//!
//! # Algorithm
//!
//! Two cursors start at `a` and `b` and share a FIFO work queue of at most
//! two slots. Each step pops one cursor: if its event has already been seen
//! by either cursor, that event is the common ancestor. Otherwise the event
//! is marked seen and the cursor's parent is queued. A cursor that reaches a
//! root drops out of the queue. When the queue is empty the chains never
//! met.
//!
//! The cursors alternate, so the work is O(depth(a) + depth(b)) with no
//! ancestor-set precomputation.
//!
//! # Edge cases
//!
//! - `a == b`: the second pop sees `a` again and returns it.
//! - `a` is an ancestor of `b`: `a` is seen first, `b`'s cursor reaches it.
//! - Different roots: [`DagError::NoCommonAncestor`].

use std::collections::{HashSet, VecDeque};

use crate::event::Event;

use super::DagError;
use super::store::EventStore;

/// Find the nearest event on both `a`'s and `b`'s chains.
///
/// # Errors
///
/// [`DagError::EventNotFound`] if either event is unknown,
/// [`DagError::BrokenChain`] if a walked parent is missing, or
/// [`DagError::NoCommonAncestor`] if the chains never meet.
pub fn common_ancestor<'a>(
    store: &'a EventStore,
    a: &str,
    b: &str,
) -> Result<&'a Event, DagError> {
    let mut cursors: VecDeque<&Event> = VecDeque::with_capacity(2);
    cursors.push_back(store.require(a)?);
    cursors.push_back(store.require(b)?);
    let mut seen: HashSet<&str> = HashSet::new();

    while let Some(current) = cursors.pop_front() {
        if !seen.insert(current.hash()) {
            return Ok(current);
        }
        if let Some(parent) = store.parent_of(current)? {
            cursors.push_back(parent);
        }
    }

    Err(DagError::NoCommonAncestor {
        a: a.to_string(),
        b: b.to_string(),
    })
}

/// Returns `true` if one of `a`, `b` lies on the other's chain (including
/// `a == b`). Events on diverged forks, or under different roots, are
/// incompatible.
///
/// # Errors
///
/// [`DagError::EventNotFound`] or [`DagError::BrokenChain`] from the walk.
pub fn compatible_with(store: &EventStore, a: &str, b: &str) -> Result<bool, DagError> {
    match common_ancestor(store, a, b) {
        Ok(ancestor) => Ok(ancestor.hash() == a || ancestor.hash() == b),
        Err(DagError::NoCommonAncestor { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Returns `true` if `event` is `tip` or descends from it: compatible with
/// and not behind `tip`.
///
/// # Errors
///
/// Same as [`compatible_with`].
pub fn compatible_ahead(store: &EventStore, tip: &str, event: &str) -> Result<bool, DagError> {
    match common_ancestor(store, tip, event) {
        Ok(ancestor) => Ok(ancestor.hash() == tip),
        Err(DagError::NoCommonAncestor { .. }) => Ok(false),
        Err(e) => Err(e),
    }
}
