//! `deje ancestor`: common ancestor and fork compatibility of two events.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deje_core::config::DejeConfig;
use deje_core::dag::DagError;
use serde::Serialize;

use super::load_document;
use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct AncestorArgs {
    /// Document file.
    pub file: PathBuf,

    /// First event hash.
    pub a: String,

    /// Second event hash.
    pub b: String,
}

#[derive(Debug, Serialize)]
pub struct AncestorReport {
    pub ancestor: Option<String>,
    /// One event descends from the other.
    pub compatible: bool,
}

/// Report the nearest common ancestor of two events.
///
/// Events in unrelated trees have no ancestor and are incompatible; that is
/// a result, not an error.
///
/// # Errors
///
/// Returns an error if the document cannot be loaded, either event is
/// unknown, or a chain is broken.
pub fn run_ancestor(args: &AncestorArgs, config: &DejeConfig, output: OutputMode) -> Result<()> {
    let doc = load_document(&args.file, config)?;
    let ancestor = match doc.common_ancestor(&args.a, &args.b) {
        Ok(e) => Some(e.hash().to_string()),
        Err(DagError::NoCommonAncestor { .. }) => None,
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to compare {} and {}", args.a, args.b));
        }
    };
    let compatible = doc
        .compatible_with(&args.a, &args.b)
        .with_context(|| format!("Failed to compare {} and {}", args.a, args.b))?;

    let report = AncestorReport {
        ancestor,
        compatible,
    };
    render(output, &report, |r, w| {
        pretty_kv(w, "ancestor", r.ancestor.as_deref().unwrap_or("(none)"))?;
        pretty_kv(w, "compatible", if r.compatible { "yes" } else { "no" })
    })
}
