//! deje-core library.
//!
//! A document is a JSON tree whose history is a hash-chained tree of
//! events. Peers gossip events and quorums, and an external timestamp
//! service picks which fork is canonical.
//!
//! # Conventions
//!
//! - **Errors**: one `thiserror` enum per module, each mapping to an
//!   [`ErrorCode`] through `code()`.
//! - **Logging**: `tracing` macros only; subscribers are installed by binaries.

pub mod broadcast;
pub mod config;
pub mod container;
pub mod dag;
pub mod document;
pub mod error;
pub mod event;
pub mod hash;
pub mod index;
pub mod primitive;
pub mod protocol;
pub mod quorum;
pub mod state;
pub mod timestamp;
pub mod tracker;

pub use container::{Container, PathKey};
pub use dag::{DagError, EventStore};
pub use document::{Document, DocumentError, DocumentFile};
pub use error::ErrorCode;
pub use event::{Event, EventBuilder, EventError};
pub use primitive::Primitive;
pub use quorum::{Quorum, QuorumBuilder};
pub use state::DocumentState;
pub use timestamp::TimestampService;
pub use tracker::{IterationError, TimestampTracker, TrackerError};
