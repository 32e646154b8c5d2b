//! `deje show`: materialize the state at one event.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deje_core::config::DejeConfig;
use serde::Serialize;

use super::{load_document, run_tracker};
use crate::output::{OutputMode, pretty_json, pretty_kv, render};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Document file.
    pub file: PathBuf,

    /// Event or quorum hash to show. Defaults to the tracker's tip.
    #[arg(long)]
    pub event: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ShowReport {
    pub event: Option<String>,
    pub state: serde_json::Value,
}

/// Replay the document to the requested event and print its state.
///
/// # Errors
///
/// Returns an error if the document cannot be loaded, the reference does
/// not resolve, or replay fails.
pub fn run_show(args: &ShowArgs, config: &DejeConfig, output: OutputMode) -> Result<()> {
    let mut doc = load_document(&args.file, config)?;

    let event = match args.event.as_deref() {
        Some(reference) => {
            let hash = doc
                .resolve_checkpoint(reference)
                .map_or_else(|| reference.to_string(), |e| e.hash().to_string());
            doc.goto(&hash)
                .with_context(|| format!("Failed to replay to {reference}"))?;
            Some(hash)
        }
        None => run_tracker(&mut doc, config).tip,
    };

    let report = ShowReport {
        event,
        state: doc.state().export(),
    };
    render(output, &report, |r, w| {
        pretty_kv(w, "event", r.event.as_deref().unwrap_or("(none)"))?;
        pretty_json(w, &r.state)
    })
}
