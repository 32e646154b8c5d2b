//! `deje history`: the chain from the root down to one event.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deje_core::config::DejeConfig;

use super::{EventView, load_document};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Document file.
    pub file: PathBuf,

    /// Event hash.
    pub hash: String,
}

/// Print the chain root-first.
///
/// # Errors
///
/// Returns an error if the document cannot be loaded or the chain is broken.
pub fn run_history(args: &HistoryArgs, config: &DejeConfig, output: OutputMode) -> Result<()> {
    let doc = load_document(&args.file, config)?;
    let chain: Vec<EventView> = doc
        .events()
        .history(&args.hash)
        .with_context(|| format!("Failed to walk history of {}", args.hash))?
        .into_iter()
        .map(EventView::from)
        .collect();

    render(output, &chain, |chain, w| {
        for (depth, e) in chain.iter().enumerate() {
            writeln!(w, "{depth:>4}  {}  {} {}", e.hash, e.handler, e.args)?;
        }
        Ok(())
    })
}
