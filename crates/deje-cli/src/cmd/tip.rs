//! `deje tip`: run the tracker and print the canonical head.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use deje_core::config::DejeConfig;
use serde::Serialize;

use super::{Skipped, load_document, run_tracker};
use crate::output::{OutputMode, pretty_json, pretty_kv, pretty_section, render};

#[derive(Args, Debug)]
pub struct TipArgs {
    /// Document file.
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct TipReport {
    pub topic: String,
    pub tip: Option<String>,
    pub checkpoints: usize,
    pub state: serde_json::Value,
    pub skipped: Vec<Skipped>,
}

/// Run the configured tracker over the document and report the tip.
///
/// # Errors
///
/// Returns an error if the document cannot be loaded.
pub fn run_tip(args: &TipArgs, config: &DejeConfig, output: OutputMode) -> Result<()> {
    let mut doc = load_document(&args.file, config)?;
    let run = run_tracker(&mut doc, config);
    let report = TipReport {
        topic: doc.topic().to_string(),
        tip: run.tip,
        checkpoints: run.checkpoints,
        state: doc.state().export(),
        skipped: run.skipped,
    };

    render(output, &report, |r, w| {
        pretty_kv(w, "topic", &r.topic)?;
        pretty_kv(w, "tip", r.tip.as_deref().unwrap_or("(none)"))?;
        pretty_kv(w, "checkpoints", r.checkpoints.to_string())?;
        if !r.skipped.is_empty() {
            writeln!(w)?;
            pretty_section(w, "Skipped")?;
            for s in &r.skipped {
                writeln!(w, "[{}] {}", s.code, s.message)?;
            }
        }
        writeln!(w)?;
        pretty_section(w, "State")?;
        pretty_json(w, &r.state)
    })
}
