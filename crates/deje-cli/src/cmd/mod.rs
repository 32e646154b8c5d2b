pub mod ancestor;
pub mod history;
pub mod show;
pub mod tip;
pub mod verify;

use std::path::Path;

use anyhow::{Context, Result};
use deje_core::config::DejeConfig;
use deje_core::dag::DagError;
use deje_core::document::{Document, DocumentError};
use deje_core::error::ErrorCode;
use deje_core::event::Event;
use deje_core::protocol::ProtocolError;
use deje_core::tracker::{IterationError, TimestampTracker, TrackerError};
use serde::Serialize;
use tracing::debug;

/// Load a document file, verifying hashes when the config asks for it.
pub fn load_document(path: &Path, config: &DejeConfig) -> Result<Document> {
    let doc = Document::load(path, config.document.verify_hashes)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    debug!(
        path = %path.display(),
        events = doc.events().len(),
        quorums = doc.quorums().len(),
        "document loaded"
    );
    Ok(doc)
}

/// Run the configured tracker over `doc`, leaving its state at the tip.
pub fn run_tracker(doc: &mut Document, config: &DejeConfig) -> TrackerRun {
    let mut tracker = TimestampTracker::new(config.tracker.source)
        .with_max_recorded_errors(config.tracker.max_recorded_errors);
    let tip = tracker.go_to_latest(doc).map(str::to_string);
    TrackerRun {
        tip,
        checkpoints: tracker.timestamps().len(),
        skipped: tracker.errors().iter().map(Skipped::from).collect(),
    }
}

#[derive(Debug, Serialize)]
pub struct TrackerRun {
    pub tip: Option<String>,
    pub checkpoints: usize,
    pub skipped: Vec<Skipped>,
}

/// One checkpoint the tracker passed over.
#[derive(Debug, Serialize)]
pub struct Skipped {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
    pub code: &'static str,
    pub message: String,
}

impl From<&IterationError> for Skipped {
    fn from(e: &IterationError) -> Self {
        Self {
            position: e.position,
            code: e.error.code().code(),
            message: e.to_string(),
        }
    }
}

/// JSON view of an event.
#[derive(Debug, Serialize)]
pub struct EventView {
    pub hash: String,
    pub parent: String,
    pub handler: String,
    pub args: serde_json::Value,
}

impl From<&Event> for EventView {
    fn from(e: &Event) -> Self {
        Self {
            hash: e.hash().to_string(),
            parent: e.parent().to_string(),
            handler: e.handler().to_string(),
            args: serde_json::to_value(e.args()).unwrap_or_default(),
        }
    }
}

/// First deje error code found along an error chain.
pub fn error_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<DocumentError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<DagError>() {
            Some(e.code())
        } else if let Some(e) = cause.downcast_ref::<TrackerError>() {
            Some(e.code())
        } else {
            cause.downcast_ref::<ProtocolError>().map(ProtocolError::code)
        }
    })
}
