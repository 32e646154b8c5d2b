//! Documents and their on-disk form.
//!
//! A [`Document`] owns everything about one synchronized object: the event
//! store, the quorum store, the ordered checkpoint references, and the
//! materialized state. Algorithms that need several of these take the
//! document (or the relevant store) as an explicit argument; entities never
//! point back at their document.
//!
//! The serialized form is [`DocumentFile`]:
//!
//! ```text
//! {"topic": "...", "events": {<hash>: <event>}, "quorums": {<hash>: <quorum>},
//!  "timestamps": [<reference>...]}
//! ```
//!
//! Materialized state is derived and never serialized.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dag::{self, DagError, EventStore};
use crate::error::ErrorCode;
use crate::event::Event;
use crate::index::Manageable;
use crate::quorum::{Quorum, QuorumStore};
use crate::state::DocumentState;

/// Errors from loading, saving and checking documents.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// Reading or writing the file failed.
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The bytes are not a document file.
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A map key does not match the content hash of its entry.
    #[error("{kind} stored under {key} actually hashes to {actual}")]
    HashMismatch {
        kind: &'static str,
        key: String,
        actual: String,
    },
}

impl DocumentError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::Io,
            Self::Malformed(_) => ErrorCode::MalformedDocument,
            Self::HashMismatch { .. } => ErrorCode::HashMismatch,
        }
    }
}

// ---------------------------------------------------------------------------
// DocumentFile
// ---------------------------------------------------------------------------

/// Serialized document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub topic: String,
    #[serde(default)]
    pub events: BTreeMap<String, Event>,
    #[serde(default)]
    pub quorums: BTreeMap<String, Quorum>,
    #[serde(default)]
    pub timestamps: Vec<String>,
}

impl DocumentFile {
    /// Parse from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Malformed`] if the bytes are not a document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DocumentError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Malformed`] if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every entry whose map key differs from its content hash.
    #[must_use]
    pub fn hash_mismatches(&self) -> Vec<DocumentError> {
        fn check<'a, T: Manageable + 'a>(
            kind: &'static str,
            entries: impl IntoIterator<Item = (&'a String, &'a T)>,
        ) -> impl Iterator<Item = DocumentError> {
            entries
                .into_iter()
                .filter(|(key, entry)| key.as_str() != entry.key())
                .map(move |(key, entry)| DocumentError::HashMismatch {
                    kind,
                    key: key.clone(),
                    actual: entry.key().to_string(),
                })
        }
        check("event", &self.events)
            .chain(check("quorum", &self.quorums))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// One synchronized document.
#[derive(Debug, Default)]
pub struct Document {
    topic: String,
    events: EventStore,
    quorums: QuorumStore,
    timestamps: Vec<String>,
    state: DocumentState,
}

impl Document {
    /// An empty document for `topic`.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    /// The topic this document is published under.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub const fn events(&self) -> &EventStore {
        &self.events
    }

    pub const fn events_mut(&mut self) -> &mut EventStore {
        &mut self.events
    }

    #[must_use]
    pub const fn quorums(&self) -> &QuorumStore {
        &self.quorums
    }

    pub const fn quorums_mut(&mut self) -> &mut QuorumStore {
        &mut self.quorums
    }

    /// Checkpoint references, in the order they were recorded.
    #[must_use]
    pub fn timestamps(&self) -> &[String] {
        &self.timestamps
    }

    pub fn set_timestamps(&mut self, timestamps: Vec<String>) {
        self.timestamps = timestamps;
    }

    pub fn push_timestamp(&mut self, reference: impl Into<String>) {
        self.timestamps.push(reference.into());
    }

    #[must_use]
    pub const fn state(&self) -> &DocumentState {
        &self.state
    }

    pub const fn state_mut(&mut self) -> &mut DocumentState {
        &mut self.state
    }

    /// Register an event. Returns `false` if it was already present.
    pub fn register_event(&mut self, event: Event) -> bool {
        self.events.register(event)
    }

    /// Unregister an event by hash.
    pub fn unregister_event(&mut self, hash: &str) -> Option<Event> {
        self.events.unregister(hash)
    }

    /// Register a quorum. Returns `false` if it was already present.
    pub fn register_quorum(&mut self, quorum: Quorum) -> bool {
        self.quorums.register(quorum)
    }

    /// Unregister a quorum by hash.
    pub fn unregister_quorum(&mut self, hash: &str) -> Option<Quorum> {
        self.quorums.unregister(hash)
    }

    /// Resolve a checkpoint reference to an event: first as a quorum hash,
    /// then directly as an event hash.
    #[must_use]
    pub fn resolve_checkpoint(&self, reference: &str) -> Option<&Event> {
        self.quorums.get(reference).map_or_else(
            || self.events.get(reference),
            |quorum| self.events.get(quorum.event_hash()),
        )
    }

    /// See [`dag::common_ancestor`].
    ///
    /// # Errors
    ///
    /// Same as [`dag::common_ancestor`].
    pub fn common_ancestor(&self, a: &str, b: &str) -> Result<&Event, DagError> {
        dag::common_ancestor(&self.events, a, b)
    }

    /// See [`dag::compatible_with`].
    ///
    /// # Errors
    ///
    /// Same as [`dag::compatible_with`].
    pub fn compatible_with(&self, a: &str, b: &str) -> Result<bool, DagError> {
        dag::compatible_with(&self.events, a, b)
    }

    /// Apply one registered event to the current state.
    ///
    /// # Errors
    ///
    /// [`DagError::EventNotFound`] or the [`dag::apply`] failure.
    pub fn apply(&mut self, hash: &str) -> Result<(), DagError> {
        let event = self.events.require(hash)?;
        dag::apply(event, &mut self.state)
    }

    /// Rebuild the state at event `hash`.
    ///
    /// # Errors
    ///
    /// Same as [`dag::goto`].
    pub fn goto(&mut self, hash: &str) -> Result<(), DagError> {
        dag::goto(&self.events, hash, &mut self.state)
    }

    /// Build a document from its serialized form, ignoring map keys and
    /// re-deriving every hash from content.
    #[must_use]
    pub fn from_file(file: DocumentFile) -> Self {
        let mut doc = Self::new(file.topic);
        for (key, event) in file.events {
            if key != event.hash() {
                warn!(key = %key, actual = %event.hash(), "event stored under wrong key");
            }
            doc.events.register(event);
        }
        for (key, quorum) in file.quorums {
            if key != quorum.hash() {
                warn!(key = %key, actual = %quorum.hash(), "quorum stored under wrong key");
            }
            doc.quorums.register(quorum);
        }
        doc.timestamps = file.timestamps;
        doc
    }

    /// Like [`Document::from_file`], but rejects files whose map keys do
    /// not match their entries.
    ///
    /// # Errors
    ///
    /// Returns the first [`DocumentError::HashMismatch`].
    pub fn from_file_verified(file: DocumentFile) -> Result<Self, DocumentError> {
        if let Some(mismatch) = file.hash_mismatches().into_iter().next() {
            return Err(mismatch);
        }
        Ok(Self::from_file(file))
    }

    /// The serialized form.
    #[must_use]
    pub fn to_file(&self) -> DocumentFile {
        DocumentFile {
            topic: self.topic.clone(),
            events: self
                .events
                .iter()
                .map(|e| (e.hash().to_string(), e.clone()))
                .collect(),
            quorums: self
                .quorums
                .iter()
                .map(|(hash, q)| (hash.to_string(), q.clone()))
                .collect(),
            timestamps: self.timestamps.clone(),
        }
    }

    /// Read a document file from disk.
    ///
    /// # Errors
    ///
    /// [`DocumentError::Io`], [`DocumentError::Malformed`], or (when
    /// `verify` is set) [`DocumentError::HashMismatch`].
    pub fn load(path: &Path, verify: bool) -> Result<Self, DocumentError> {
        let bytes = fs::read(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = DocumentFile::from_slice(&bytes)?;
        debug!(
            path = %path.display(),
            events = file.events.len(),
            quorums = file.quorums.len(),
            "loaded document file"
        );
        if verify {
            Self::from_file_verified(file)
        } else {
            Ok(Self::from_file(file))
        }
    }

    /// Write the document file to disk as pretty JSON.
    ///
    /// # Errors
    ///
    /// [`DocumentError::Io`] if the write fails.
    pub fn save(&self, path: &Path) -> Result<(), DocumentError> {
        let mut text = self.to_file().to_json_pretty()?;
        text.push('\n');
        fs::write(path, text).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::QuorumBuilder;
    use serde_json::json;

    fn sample() -> (Document, Event, Event, Quorum) {
        let mut doc = Document::new("demo");
        let root = Event::set(Vec::<crate::container::PathKey>::new(), json!({"k": 0})).build();
        let child = Event::set(["k"], 1).parent(&root).build();
        let q = Quorum::for_event(&child).sign("peer", "sig").build();
        doc.register_event(root.clone());
        doc.register_event(child.clone());
        doc.register_quorum(q.clone());
        doc.push_timestamp(q.hash());
        (doc, root, child, q)
    }

    #[test]
    fn resolve_quorum_then_event() {
        let (doc, root, child, q) = sample();
        assert_eq!(doc.resolve_checkpoint(q.hash()), Some(&child));
        assert_eq!(doc.resolve_checkpoint(root.hash()), Some(&root));
        assert_eq!(doc.resolve_checkpoint("nope"), None);

        let dangling = QuorumBuilder::new("0000").build();
        let mut doc = doc;
        doc.register_quorum(dangling.clone());
        assert_eq!(doc.resolve_checkpoint(dangling.hash()), None);
    }

    #[test]
    fn goto_and_apply() {
        let (mut doc, root, child, _) = sample();
        doc.goto(child.hash()).unwrap();
        assert_eq!(doc.state().export(), json!({"k": 1}));
        doc.goto(root.hash()).unwrap();
        doc.apply(child.hash()).unwrap();
        assert_eq!(doc.state().export(), json!({"k": 1}));
        assert_eq!(doc.apply("nope").unwrap_err().code(), ErrorCode::EventNotFound);
    }

    #[test]
    fn file_round_trip() {
        let (doc, _, _, _) = sample();
        let file = doc.to_file();
        assert_eq!(file.topic, "demo");
        assert_eq!(file.events.len(), 2);
        let json = file.to_json_pretty().unwrap();
        let parsed = DocumentFile::from_slice(json.as_bytes()).unwrap();
        assert_eq!(parsed, file);
        let back = Document::from_file_verified(parsed).unwrap();
        assert_eq!(back.events(), doc.events());
        assert_eq!(back.quorums(), doc.quorums());
        assert_eq!(back.timestamps(), doc.timestamps());
    }

    #[test]
    fn missing_sections_default() {
        let file = DocumentFile::from_slice(br#"{"events": {}}"#).unwrap();
        assert_eq!(file, DocumentFile::default());
        assert!(!serde_json::to_string(&file).unwrap().contains("topic"));
    }

    #[test]
    fn mismatched_keys() {
        let (doc, root, _, _) = sample();
        let mut file = doc.to_file();
        let event = file.events.remove(root.hash()).unwrap();
        file.events.insert("f".repeat(40), event);

        assert_eq!(file.hash_mismatches().len(), 1);
        let err = Document::from_file_verified(file.clone()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::HashMismatch);

        let lenient = Document::from_file(file);
        assert!(lenient.events().contains(root.hash()));
    }

    #[test]
    fn malformed_bytes() {
        let err = DocumentFile::from_slice(b"deje event {}").unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedDocument);
        let err = DocumentFile::from_slice(br#"{"events": {"x": {"parent": ""}}}"#).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MalformedDocument);
    }
}
