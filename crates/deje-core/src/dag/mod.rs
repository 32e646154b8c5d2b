//! Hash-chained event history.
//!
//! Every event names at most one parent by hash, so the history of a
//! document is a tree of chains rooted at parentless events. Sibling events
//! that share a parent are forks.
//!
//! # Sub-modules
//!
//! - [`store`]: the event store, indexed by hash and by parent hash.
//!   ([`EventStore`])
//! - [`lca`]: common-ancestor search and fork compatibility.
//!   ([`common_ancestor`], [`compatible_with`], [`compatible_ahead`])
//! - [`replay`]: materializing state by replaying a chain.
//!   ([`apply`], [`goto`])

pub mod lca;
pub mod replay;
pub mod store;

pub use lca::{common_ancestor, compatible_ahead, compatible_with};
pub use replay::{apply, goto};
pub use store::EventStore;

use crate::error::ErrorCode;
use crate::event::EventError;
use crate::primitive::PrimitiveError;

/// Errors from history traversal and replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// The requested event is not in the store.
    #[error("event not found: {0}")]
    EventNotFound(String),

    /// An event names a parent that is not in the store.
    #[error("broken chain: event {event} has unknown parent {parent}")]
    BrokenChain { event: String, parent: String },

    /// The two events descend from different roots.
    #[error("no common ancestor between {a} and {b}")]
    NoCommonAncestor { a: String, b: String },

    /// An event on the replayed chain could not be translated.
    #[error("cannot translate event {event}: {source}")]
    Translate {
        event: String,
        #[source]
        source: EventError,
    },

    /// A primitive on the replayed chain failed to apply.
    #[error("cannot apply event {event}: {source}")]
    Apply {
        event: String,
        #[source]
        source: PrimitiveError,
    },
}

impl DagError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::EventNotFound(_) => ErrorCode::EventNotFound,
            Self::BrokenChain { .. } => ErrorCode::BrokenChain,
            Self::NoCommonAncestor { .. } => ErrorCode::NoCommonAncestor,
            Self::Translate { source, .. } => source.code(),
            Self::Apply { source, .. } => source.code(),
        }
    }
}
