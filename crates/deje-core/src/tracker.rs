//! Timestamp consensus: picking the canonical tip.
//!
//! The tracker asks a [`TimestampService`] for an ordered checkpoint list,
//! then walks it position by position. Each checkpoint that resolves to a
//! registered event which is compatible with and ahead of the current tip
//! becomes the new tip (after a successful `goto`). Everything else is
//! recorded as a non-fatal [`IterationError`] and skipped.
//!
//! The effect is "earliest agreement wins, without rewriting agreed
//! history": once a fork has been chosen, a later checkpoint on a sibling
//! fork, or on an ancestor of the tip, cannot move the head.
//!
//! ```text
//! Idle --start_iteration--> Iterating --do_iteration(0..n)--> done
//!   ^                                                          |
//!   +-------------------- start_iteration ---------------------+
//! ```
//!
//! Each `start_iteration` discards the previous tip and recomputes from
//! scratch. A failing service leaves the previous run untouched.

use std::fmt;

use tracing::{info, warn};

use crate::dag::{self, DagError};
use crate::document::Document;
use crate::error::ErrorCode;
use crate::timestamp::TimestampService;

/// Default cap on retained [`IterationError`]s.
pub const DEFAULT_MAX_RECORDED_ERRORS: usize = 1024;

/// Errors from one tracker step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrackerError {
    /// The timestamp service failed. Holds its message verbatim.
    #[error("{0}")]
    Service(String),

    /// `do_iteration` was called past the end of the checkpoint list.
    #[error("bad position {position}: {len} checkpoints fetched")]
    BadPosition { position: usize, len: usize },

    /// The checkpoint resolves to no registered event.
    #[error("no such event for checkpoint {0}")]
    NoSuchEvent(String),

    /// The event is on another fork, or behind the tip.
    #[error("event {event} is not compatible with and ahead of tip {tip}")]
    Incompatible { event: String, tip: String },

    /// Replaying the event failed.
    #[error(transparent)]
    Goto(#[from] DagError),
}

impl TrackerError {
    /// Return the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Service(_) => ErrorCode::OracleFailure,
            Self::BadPosition { .. } => ErrorCode::BadPosition,
            Self::NoSuchEvent(_) => ErrorCode::EventNotFound,
            Self::Incompatible { .. } => ErrorCode::IncompatibleCheckpoint,
            Self::Goto(e) => e.code(),
        }
    }
}

/// A skipped checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationError {
    /// Position in the checkpoint list; `None` for a service failure.
    pub position: Option<usize>,
    /// Tip at the time of the failure.
    pub tip: Option<String>,
    pub error: TrackerError,
}

impl fmt::Display for IterationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tip = self.tip.as_deref().unwrap_or("");
        match self.position {
            Some(p) => write!(f, "error on iteration {p} (current tip: '{tip}'): {}", self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

/// Selects the canonical tip of a [`Document`] from externally ordered
/// checkpoints.
#[derive(Debug)]
pub struct TimestampTracker<S> {
    service: S,
    timestamps: Vec<String>,
    tip: Option<String>,
    errors: Vec<IterationError>,
    max_errors: usize,
}

impl<S: TimestampService> TimestampTracker<S> {
    /// An idle tracker with no tip.
    pub fn new(service: S) -> Self {
        Self {
            service,
            timestamps: Vec::new(),
            tip: None,
            errors: Vec::new(),
            max_errors: DEFAULT_MAX_RECORDED_ERRORS,
        }
    }

    /// Retain at most `max` skip records per run. Skips beyond the cap are
    /// still logged.
    #[must_use]
    pub const fn with_max_recorded_errors(mut self, max: usize) -> Self {
        self.max_errors = max;
        self
    }

    /// The service.
    #[must_use]
    pub const fn service(&self) -> &S {
        &self.service
    }

    /// The current tip.
    #[must_use]
    pub fn tip(&self) -> Option<&str> {
        self.tip.as_deref()
    }

    /// Seed the tip, e.g. to continue a run from a known head without
    /// refetching.
    pub fn set_tip(&mut self, tip: Option<String>) {
        self.tip = tip;
    }

    /// Checkpoints fetched by the last successful `start_iteration`.
    #[must_use]
    pub fn timestamps(&self) -> &[String] {
        &self.timestamps
    }

    /// Skips recorded by the current run.
    #[must_use]
    pub fn errors(&self) -> &[IterationError] {
        &self.errors
    }

    /// Fetch the checkpoint list and clear the tip.
    ///
    /// # Errors
    ///
    /// [`TrackerError::Service`] with the service's message. On failure the
    /// previous checkpoint list and tip are kept.
    pub fn start_iteration(&mut self, doc: &Document) -> Result<(), TrackerError> {
        let timestamps = self
            .service
            .get_timestamps(doc.topic(), doc)
            .map_err(|e| TrackerError::Service(e.to_string()))?;
        self.timestamps = timestamps;
        self.tip = None;
        self.errors.clear();
        Ok(())
    }

    /// Try to advance the tip to checkpoint `position`.
    ///
    /// # Errors
    ///
    /// [`TrackerError::BadPosition`], [`TrackerError::NoSuchEvent`],
    /// [`TrackerError::Incompatible`], or the [`dag::goto`] failure. The tip
    /// is unchanged on every error.
    pub fn do_iteration(&mut self, doc: &mut Document, position: usize) -> Result<(), TrackerError> {
        let reference = self
            .timestamps
            .get(position)
            .ok_or_else(|| TrackerError::BadPosition {
                position,
                len: self.timestamps.len(),
            })?;
        let hash = doc
            .resolve_checkpoint(reference)
            .ok_or_else(|| TrackerError::NoSuchEvent(reference.clone()))?
            .hash()
            .to_string();

        if !self.compatible_with_tip(doc, &hash) {
            return Err(TrackerError::Incompatible {
                event: hash,
                tip: self.tip.clone().unwrap_or_default(),
            });
        }

        doc.goto(&hash)?;
        self.tip = Some(hash);
        Ok(())
    }

    /// Returns `true` if `event` may become the new tip.
    ///
    /// - unregistered `event`: `false`
    /// - no tip yet: `true`
    /// - tip no longer registered: `false`
    /// - otherwise: `event` is the tip or descends from it
    #[must_use]
    pub fn compatible_with_tip(&self, doc: &Document, event: &str) -> bool {
        if !doc.events().contains(event) {
            return false;
        }
        let Some(tip) = self.tip.as_deref() else {
            return true;
        };
        if !doc.events().contains(tip) {
            return false;
        }
        dag::compatible_ahead(doc.events(), tip, event).unwrap_or(false)
    }

    /// Run a full pass: `start_iteration`, then every position in order.
    ///
    /// Returns the resulting tip. Failures are logged and recorded in
    /// [`TimestampTracker::errors`]; none of them abort the pass. On return
    /// the document state is materialized at the tip (or empty if there is
    /// none).
    pub fn go_to_latest(&mut self, doc: &mut Document) -> Option<&str> {
        if let Err(error) = self.start_iteration(doc) {
            warn!(error = %error, "timestamp service failed; keeping previous tip");
            self.record(None, error);
            return self.tip();
        }

        let mut rejected = 0usize;
        for position in 0..self.timestamps.len() {
            if let Err(error) = self.do_iteration(doc, position) {
                warn!(
                    position,
                    tip = self.tip.as_deref().unwrap_or(""),
                    error = %error,
                    "skipping checkpoint"
                );
                rejected += 1;
                self.record(Some(position), error);
            }
        }

        // A failed goto leaves partial state behind; land back on the tip.
        if doc.state().head() != self.tip.as_deref() {
            match self.tip.clone() {
                Some(tip) => {
                    if let Err(error) = doc.goto(&tip) {
                        warn!(tip = %tip, error = %error, "cannot restore tip state");
                        self.record(None, error.into());
                    }
                }
                None => doc.state_mut().reset(),
            }
        }

        info!(
            tip = self.tip.as_deref().unwrap_or(""),
            checkpoints = self.timestamps.len(),
            rejected,
            "tracker pass finished"
        );
        self.tip()
    }

    fn record(&mut self, position: Option<usize>, error: TrackerError) {
        if self.errors.len() < self.max_errors {
            self.errors.push(IterationError {
                position,
                tip: self.tip.clone(),
                error,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Event;
    use crate::timestamp::{DocumentTimestampService, NullTimestampService};
    use serde_json::json;

    struct Events {
        root: Event,
        child: Event,
        fork: Event,
        orphan: Event,
        unregistered: Event,
    }

    fn setup(doc: &mut Document) -> Events {
        let root = Event::set(["key"], "value").build();
        let child = Event::set(["other key"], "other value").parent(&root).build();
        let fork = Event::set(["fork"], "fork").parent(&root).build();
        let orphan = Event::builder("SET").parent_hash("foobarbaz").build();
        let unregistered = Event::builder("foo").build();
        for e in [&root, &child, &fork, &orphan] {
            doc.register_event(e.clone());
        }
        Events {
            root,
            child,
            fork,
            orphan,
            unregistered,
        }
    }

    #[test]
    fn compatible_with_tip_table() {
        let mut doc = Document::new("t");
        let ev = setup(&mut doc);
        let mut tracker = TimestampTracker::new(NullTimestampService);

        let cases: [(Option<&str>, &Event, bool, &str); 7] = [
            (None, &ev.unregistered, false, "unregistered event"),
            (None, &ev.root, true, "any registered event vs no tip"),
            (Some(ev.root.hash()), &ev.child, true, "child of tip"),
            (Some(ev.child.hash()), &ev.root, false, "parent of tip"),
            (Some(ev.child.hash()), &ev.fork, false, "sibling fork"),
            (Some("foobar"), &ev.root, false, "dangling tip"),
            (Some(ev.root.hash()), &ev.orphan, false, "missing heritage"),
        ];
        for (tip, event, expected, what) in cases {
            tracker.set_tip(tip.map(String::from));
            assert_eq!(tracker.compatible_with_tip(&doc, event.hash()), expected, "{what}");
        }
    }

    #[test]
    fn start_iteration_clears_tip() {
        let mut doc = Document::new("t");
        doc.set_timestamps(vec!["1".into(), "2".into()]);
        let mut tracker = TimestampTracker::new(DocumentTimestampService);
        tracker.set_tip(Some("marshmallow".into()));
        tracker.start_iteration(&doc).unwrap();
        assert_eq!(tracker.timestamps(), ["1", "2"]);
        assert_eq!(tracker.tip(), None);
    }

    #[test]
    fn do_iteration_errors_keep_tip() {
        let mut doc = Document::new("t");
        let ev = setup(&mut doc);
        let no_path = Event::builder("SET").build();
        doc.register_event(no_path.clone());
        doc.set_timestamps(vec![
            ev.unregistered.hash().to_string(),
            ev.root.hash().to_string(),
            no_path.hash().to_string(),
        ]);
        let mut tracker = TimestampTracker::new(DocumentTimestampService);
        tracker.start_iteration(&doc).unwrap();

        let err = tracker.do_iteration(&mut doc, 3).unwrap_err();
        assert_eq!(err, TrackerError::BadPosition { position: 3, len: 3 });

        let err = tracker.do_iteration(&mut doc, 0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::EventNotFound);

        let err = tracker.do_iteration(&mut doc, 2).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingArgument);
        assert_eq!(tracker.tip(), None);

        tracker.set_tip(Some(ev.child.hash().to_string()));
        let err = tracker.do_iteration(&mut doc, 1).unwrap_err();
        assert_eq!(err.code(), ErrorCode::IncompatibleCheckpoint);
        assert_eq!(tracker.tip(), Some(ev.child.hash()));
    }

    #[test]
    fn do_iteration_success_materializes_state() {
        let mut doc = Document::new("t");
        let ev = setup(&mut doc);
        doc.set_timestamps(vec![ev.root.hash().to_string(), ev.child.hash().to_string()]);
        let mut tracker = TimestampTracker::new(DocumentTimestampService);
        tracker.start_iteration(&doc).unwrap();
        tracker.do_iteration(&mut doc, 1).unwrap();
        assert_eq!(tracker.tip(), Some(ev.child.hash()));
        assert_eq!(
            doc.state().export(),
            json!({"key": "value", "other key": "other value"})
        );
    }

    #[test]
    fn go_to_latest_first_fork_wins() {
        let mut doc = Document::new("t");
        let ev = setup(&mut doc);
        doc.set_timestamps(vec![
            ev.root.hash().to_string(),
            ev.child.hash().to_string(),
            ev.fork.hash().to_string(),
        ]);
        let mut tracker = TimestampTracker::new(DocumentTimestampService);
        assert_eq!(tracker.go_to_latest(&mut doc), Some(ev.child.hash()));
        assert_eq!(tracker.errors().len(), 1);
        assert_eq!(tracker.errors()[0].position, Some(2));
        assert_eq!(
            tracker.errors()[0].error.code(),
            ErrorCode::IncompatibleCheckpoint
        );
        assert!(
            tracker.errors()[0]
                .to_string()
                .starts_with("error on iteration 2 (current tip: '")
        );
    }

    #[test]
    fn failed_goto_state_is_rolled_back_to_tip() {
        let mut doc = Document::new("t");
        let ev = setup(&mut doc);
        let bad = Event::set(["missing", "deep"], 1).parent(&ev.root).build();
        doc.register_event(bad.clone());
        doc.set_timestamps(vec![ev.root.hash().to_string(), bad.hash().to_string()]);
        let mut tracker = TimestampTracker::new(DocumentTimestampService);
        assert_eq!(tracker.go_to_latest(&mut doc), Some(ev.root.hash()));
        assert_eq!(doc.state().export(), json!({"key": "value"}));
        assert_eq!(doc.state().head(), Some(ev.root.hash()));
    }

    #[test]
    fn error_cap() {
        let mut doc = Document::new("t");
        doc.set_timestamps((0..10).map(|i| i.to_string()).collect());
        let mut tracker =
            TimestampTracker::new(DocumentTimestampService).with_max_recorded_errors(3);
        assert_eq!(tracker.go_to_latest(&mut doc), None);
        assert_eq!(tracker.errors().len(), 3);
    }
}
