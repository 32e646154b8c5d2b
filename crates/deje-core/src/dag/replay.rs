//! Materializing document state from history.
//!
//! [`apply`] runs one event's primitives against whatever state it is given.
//! [`goto`] rebuilds state from scratch by replaying the whole chain from
//! the root down to the target event.
//!
//! # Performance
//!
//! `goto` is O(chain length x primitive cost) on every call; nothing is
//! memoized between calls. This is the dominant cost for deep histories
//! (see the `replay` bench).
//!
//! # Failure
//!
//! A failed `goto` leaves the state reset and partially replayed. Treat it
//! as untrusted until the next successful `goto`.

use tracing::debug;

use crate::event::Event;
use crate::state::DocumentState;

use super::DagError;
use super::store::EventStore;

/// Apply `event`'s primitives to `state` in order.
///
/// Does not check that `state` is positioned at `event`'s parent.
///
/// # Errors
///
/// [`DagError::Translate`] if the event has no primitive translation, or
/// [`DagError::Apply`] if a primitive fails. Primitives before the failing
/// one stay applied.
pub fn apply(event: &Event, state: &mut DocumentState) -> Result<(), DagError> {
    let primitives = event.primitives().map_err(|source| DagError::Translate {
        event: event.hash().to_string(),
        source,
    })?;
    for primitive in &primitives {
        state.apply(primitive).map_err(|source| DagError::Apply {
            event: event.hash().to_string(),
            source,
        })?;
    }
    state.record_batch(event.hash());
    Ok(())
}

/// Reset `state` and replay the chain ending at `hash`, root first.
///
/// # Errors
///
/// [`DagError::EventNotFound`] / [`DagError::BrokenChain`] if the chain
/// cannot be walked, or the first [`apply`] failure along it.
pub fn goto(store: &EventStore, hash: &str, state: &mut DocumentState) -> Result<(), DagError> {
    state.reset();
    let chain = store.history(hash)?;
    debug!(event = %hash, depth = chain.len(), "goto");
    for event in chain {
        apply(event, state)?;
    }
    Ok(())
}
