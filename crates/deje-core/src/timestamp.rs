//! Externally ordered checkpoints and the services that supply them.
//!
//! A timestamp service answers "which checkpoints exist for this topic, in
//! what order?" with a list of references. Each reference is normally a
//! quorum hash; a bare event hash is also accepted by the tracker.
//!
//! Real deployments back this with a blockchain, where ordering is by block
//! height and ties inside one block are broken by hash. [`Timestamp`] and
//! [`TimestampStore`] model exactly that ordering.

use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::index::{Index, Manageable};

/// Height of a block in the ordering chain.
pub type BlockHeight = u64;

#[derive(Serialize, Deserialize)]
struct TimestampRecord {
    quorum_hash: String,
    block_height: BlockHeight,
}

/// A quorum hash confirmed at some block height.
///
/// Ordered by `(block_height, quorum_hash)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "TimestampRecord", into = "TimestampRecord")]
pub struct Timestamp {
    quorum_hash: String,
    block_height: BlockHeight,
    block_key: String,
}

impl Timestamp {
    /// A timestamp for `quorum_hash` at `block_height`.
    pub fn new(quorum_hash: impl Into<String>, block_height: BlockHeight) -> Self {
        Self {
            quorum_hash: quorum_hash.into(),
            block_height,
            block_key: block_height.to_string(),
        }
    }

    /// The confirmed quorum.
    #[must_use]
    pub fn quorum_hash(&self) -> &str {
        &self.quorum_hash
    }

    /// The confirming block.
    #[must_use]
    pub const fn block_height(&self) -> BlockHeight {
        self.block_height
    }

    /// Returns `true` if `self` sorts strictly before `other`.
    #[must_use]
    pub fn was_before(&self, other: &Self) -> bool {
        self < other
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block_height
            .cmp(&other.block_height)
            .then_with(|| self.quorum_hash.cmp(&other.quorum_hash))
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<TimestampRecord> for Timestamp {
    fn from(record: TimestampRecord) -> Self {
        Self::new(record.quorum_hash, record.block_height)
    }
}

impl From<Timestamp> for TimestampRecord {
    fn from(ts: Timestamp) -> Self {
        Self {
            quorum_hash: ts.quorum_hash,
            block_height: ts.block_height,
        }
    }
}

impl Manageable for Timestamp {
    fn key(&self) -> &str {
        &self.quorum_hash
    }

    fn group_key(&self) -> &str {
        &self.block_key
    }
}

/// Timestamps indexed by quorum hash and grouped by block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimestampStore {
    index: Index<Timestamp>,
}

impl TimestampStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `ts`. A quorum can only be confirmed once; returns `false` if
    /// its hash is already present.
    pub fn register(&mut self, ts: Timestamp) -> bool {
        self.index.register(ts)
    }

    /// Remove the timestamp for `quorum_hash`.
    pub fn unregister(&mut self, quorum_hash: &str) -> Option<Timestamp> {
        self.index.unregister(quorum_hash)
    }

    /// The timestamp for `quorum_hash`.
    #[must_use]
    pub fn get(&self, quorum_hash: &str) -> Option<&Timestamp> {
        self.index.get(quorum_hash)
    }

    /// Timestamps confirmed in block `height`, in hash order.
    pub fn at_height(&self, height: BlockHeight) -> impl Iterator<Item = &Timestamp> {
        self.index.group(&height.to_string()).collect::<Vec<_>>().into_iter()
    }

    /// Number of timestamps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns `true` if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// All timestamps in total order.
    #[must_use]
    pub fn ordered(&self) -> Vec<&Timestamp> {
        let mut all: Vec<&Timestamp> = self.index.values().collect();
        all.sort();
        all
    }

    /// Quorum hashes in total order.
    #[must_use]
    pub fn quorum_hashes(&self) -> Vec<String> {
        self.ordered()
            .into_iter()
            .map(|ts| ts.quorum_hash.clone())
            .collect()
    }
}

impl FromIterator<Timestamp> for TimestampStore {
    fn from_iter<I: IntoIterator<Item = Timestamp>>(iter: I) -> Self {
        Self {
            index: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Source of ordered checkpoint references for a topic.
///
/// `doc` is the document being tracked. Services backed by an external
/// chain ignore it; peer-side services read their answer from it.
pub trait TimestampService {
    /// Failure reported by the service. Surfaced to callers verbatim.
    type Error: fmt::Display;

    /// Ordered checkpoint references for `topic`.
    ///
    /// # Errors
    ///
    /// Whatever the underlying oracle reports.
    fn get_timestamps(&self, topic: &str, doc: &Document) -> Result<Vec<String>, Self::Error>;
}

impl<S: TimestampService + ?Sized> TimestampService for &S {
    type Error = S::Error;

    fn get_timestamps(&self, topic: &str, doc: &Document) -> Result<Vec<String>, Self::Error> {
        (**self).get_timestamps(topic, doc)
    }
}

/// Always returns an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTimestampService;

impl TimestampService for NullTimestampService {
    type Error = Infallible;

    fn get_timestamps(&self, _topic: &str, _doc: &Document) -> Result<Vec<String>, Infallible> {
        Ok(Vec::new())
    }
}

/// Returns the document's own checkpoint list, for peers that already hold
/// the oracle's answer (e.g. loaded from a file).
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTimestampService;

impl TimestampService for DocumentTimestampService {
    type Error = Infallible;

    fn get_timestamps(&self, _topic: &str, doc: &Document) -> Result<Vec<String>, Infallible> {
        Ok(doc.timestamps().to_vec())
    }
}

/// Returns every registered quorum hash, sorted.
///
/// A network-free stand-in for a chain oracle: quorum counts are small, and
/// real services also fall back to hash order within a block.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortingTimestampService;

impl TimestampService for SortingTimestampService {
    type Error = Infallible;

    fn get_timestamps(&self, _topic: &str, doc: &Document) -> Result<Vec<String>, Infallible> {
        // Index iteration is already in key order.
        Ok(doc.quorums().iter().map(|(hash, _)| hash.to_string()).collect())
    }
}

/// Returns the quorum hashes of a [`TimestampStore`] in block order.
#[derive(Debug, Clone, Default)]
pub struct LedgerTimestampService {
    ledger: TimestampStore,
}

impl LedgerTimestampService {
    /// Serve from `ledger`.
    #[must_use]
    pub const fn new(ledger: TimestampStore) -> Self {
        Self { ledger }
    }

    /// The backing ledger.
    #[must_use]
    pub const fn ledger(&self) -> &TimestampStore {
        &self.ledger
    }

    /// Mutable access to the backing ledger.
    pub const fn ledger_mut(&mut self) -> &mut TimestampStore {
        &mut self.ledger
    }
}

impl TimestampService for LedgerTimestampService {
    type Error = Infallible;

    fn get_timestamps(&self, _topic: &str, _doc: &Document) -> Result<Vec<String>, Infallible> {
        Ok(self.ledger.quorum_hashes())
    }
}
