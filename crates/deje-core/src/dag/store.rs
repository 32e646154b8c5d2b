//! The event store.
//!
//! Events are indexed by hash (primary) and by parent hash (secondary). The
//! secondary group keyed by an event's own hash is that event's children;
//! the group keyed by the empty string holds the roots.

use crate::event::Event;
use crate::index::Index;

use super::DagError;

/// Content-addressed event storage with parent/child lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStore {
    index: Index<Event>,
}

impl EventStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `event`. Returns `false` if it was already present.
    pub fn register(&mut self, event: Event) -> bool {
        self.index.register(event)
    }

    /// Remove the event stored under `hash`.
    ///
    /// Its children stay registered and become dangling.
    pub fn unregister(&mut self, hash: &str) -> Option<Event> {
        self.index.unregister(hash)
    }

    /// Look up an event.
    #[must_use]
    pub fn get(&self, hash: &str) -> Option<&Event> {
        self.index.get(hash)
    }

    /// Look up an event, failing with [`DagError::EventNotFound`].
    ///
    /// # Errors
    ///
    /// Returns [`DagError::EventNotFound`] if `hash` is not registered.
    pub fn require(&self, hash: &str) -> Result<&Event, DagError> {
        self.get(hash)
            .ok_or_else(|| DagError::EventNotFound(hash.to_string()))
    }

    /// Returns `true` if `hash` is registered.
    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.index.contains(hash)
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if the store holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All events in hash order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.index.values()
    }

    /// The underlying index.
    #[must_use]
    pub const fn index(&self) -> &Index<Event> {
        &self.index
    }

    /// The parent of `event`, or `None` for a root.
    ///
    /// # Errors
    ///
    /// Returns [`DagError::BrokenChain`] if the parent is not registered.
    pub fn parent_of(&self, event: &Event) -> Result<Option<&Event>, DagError> {
        if event.is_root() {
            return Ok(None);
        }
        self.get(event.parent())
            .map(Some)
            .ok_or_else(|| DagError::BrokenChain {
                event: event.hash().to_string(),
                parent: event.parent().to_string(),
            })
    }

    /// Children of the event `hash`, in hash order. Empty for unknown hashes
    /// and for leaves.
    pub fn children(&self, hash: &str) -> impl Iterator<Item = &Event> {
        self.index.group(hash).filter(move |_| !hash.is_empty())
    }

    /// Returns `true` if some registered event names `hash` as its parent.
    #[must_use]
    pub fn has_children(&self, hash: &str) -> bool {
        !hash.is_empty() && self.index.has_group(hash)
    }

    /// Parentless events, in hash order.
    pub fn roots(&self) -> impl Iterator<Item = &Event> {
        self.index.group("")
    }

    /// Events nobody has built on yet, in hash order.
    pub fn tips(&self) -> impl Iterator<Item = &Event> {
        self.iter().filter(move |e| !self.has_children(e.hash()))
    }

    /// The chain from its root down to `hash`, inclusive on both ends.
    ///
    /// # Errors
    ///
    /// [`DagError::EventNotFound`] if `hash` is unknown, or
    /// [`DagError::BrokenChain`] if any ancestor is missing.
    pub fn history(&self, hash: &str) -> Result<Vec<&Event>, DagError> {
        let mut current = self.require(hash)?;
        let mut chain = vec![current];
        while let Some(parent) = self.parent_of(current)? {
            chain.push(parent);
            current = parent;
        }
        chain.reverse();
        Ok(chain)
    }

    /// The root of the chain that ends at `hash`.
    ///
    /// # Errors
    ///
    /// Same as [`EventStore::history`].
    pub fn root_of(&self, hash: &str) -> Result<&Event, DagError> {
        let mut current = self.require(hash)?;
        while let Some(parent) = self.parent_of(current)? {
            current = parent;
        }
        Ok(current)
    }

    /// Check that every non-root event's parent is registered.
    ///
    /// Returns every break found, in hash order of the orphaned event.
    #[must_use]
    pub fn broken_links(&self) -> Vec<DagError> {
        self.iter()
            .filter_map(|e| self.parent_of(e).err())
            .collect()
    }

    /// Like [`EventStore::broken_links`], failing on the first break.
    ///
    /// # Errors
    ///
    /// Returns the first [`DagError::BrokenChain`] found.
    pub fn verify_chain(&self) -> Result<(), DagError> {
        self.broken_links().into_iter().next().map_or(Ok(()), Err)
    }
}

impl FromIterator<Event> for EventStore {
    fn from_iter<I: IntoIterator<Item = Event>>(iter: I) -> Self {
        Self {
            index: iter.into_iter().collect(),
        }
    }
}

impl Extend<Event> for EventStore {
    fn extend<I: IntoIterator<Item = Event>>(&mut self, iter: I) {
        self.index.extend(iter);
    }
}

// ---------------------------------------------------------------------------
// Fixtures shared by the dag tests
// ---------------------------------------------------------------------------
