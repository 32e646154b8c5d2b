//! Approval sets bridging events to timestamps.
//!
//! A [`Quorum`] attests that an event hash reached agreement. Signatures are
//! opaque strings keyed by signer identity; nothing here verifies them.
//! Quorums are content-addressed exactly like events and grouped by the
//! event they approve.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::event::Event;
use crate::hash::hash_object;
use crate::index::{Index, Manageable};

/// Quorums indexed by hash and grouped by `event_hash`.
pub type QuorumStore = Index<Quorum>;

#[derive(Serialize)]
struct QuorumBody<'a> {
    event_hash: &'a str,
    sigs: &'a BTreeMap<String, String>,
}

/// An immutable, content-addressed approval set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quorum {
    event_hash: String,
    sigs: BTreeMap<String, String>,
    hash: String,
}

impl Quorum {
    /// Start a quorum approving `event`.
    #[must_use]
    pub fn for_event(event: &Event) -> QuorumBuilder {
        QuorumBuilder::new(event.hash())
    }

    /// Hash of the approved event.
    #[must_use]
    pub fn event_hash(&self) -> &str {
        &self.event_hash
    }

    /// Signatures keyed by signer identity.
    #[must_use]
    pub const fn sigs(&self) -> &BTreeMap<String, String> {
        &self.sigs
    }

    /// Content hash (40 hex chars).
    #[must_use]
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl Manageable for Quorum {
    fn key(&self) -> &str {
        &self.hash
    }

    fn group_key(&self) -> &str {
        &self.event_hash
    }
}

impl Serialize for Quorum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        QuorumBody {
            event_hash: &self.event_hash,
            sigs: &self.sigs,
        }
        .serialize(serializer)
    }
}

#[derive(Deserialize)]
struct RawQuorum {
    event_hash: String,
    #[serde(default)]
    sigs: Option<BTreeMap<String, String>>,
}

impl<'de> Deserialize<'de> for Quorum {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawQuorum::deserialize(deserializer)?;
        Ok(QuorumBuilder {
            event_hash: raw.event_hash,
            sigs: raw.sigs.unwrap_or_default(),
        }
        .build())
    }
}

/// Quorum under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuorumBuilder {
    event_hash: String,
    sigs: BTreeMap<String, String>,
}

impl QuorumBuilder {
    /// An unsigned quorum for `event_hash`.
    pub fn new(event_hash: impl Into<String>) -> Self {
        Self {
            event_hash: event_hash.into(),
            sigs: BTreeMap::new(),
        }
    }

    /// Add or replace one signer's signature.
    #[must_use]
    pub fn sign(mut self, identity: impl Into<String>, signature: impl Into<String>) -> Self {
        self.sigs.insert(identity.into(), signature.into());
        self
    }

    /// Freeze into a [`Quorum`], computing its hash.
    #[must_use]
    pub fn build(self) -> Quorum {
        let body = QuorumBody {
            event_hash: &self.event_hash,
            sigs: &self.sigs,
        };
        let hash = hash_object(&body).expect("quorum body is always serializable");
        Quorum {
            event_hash: self.event_hash,
            sigs: self.sigs,
            hash,
        }
    }
}
