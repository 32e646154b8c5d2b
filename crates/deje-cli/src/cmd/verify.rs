//! `deje verify`: content hashes and parent links of a document file.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use deje_core::document::{Document, DocumentError, DocumentFile};
use serde::Serialize;

use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Document file.
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct Finding {
    #[serde(skip_serializing_if = "str::is_empty")]
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyReport {
    pub events: usize,
    pub quorums: usize,
    pub problems: Vec<Finding>,
    /// Quorums whose event is not in the file. Not fatal.
    pub warnings: Vec<Finding>,
}

impl VerifyReport {
    pub const fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check every content hash and parent link in the file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if any check
/// fails. The error carries the code of the first failure.
pub fn run_verify(args: &VerifyArgs, output: OutputMode) -> Result<()> {
    let bytes = std::fs::read(&args.file)
        .map_err(|source| DocumentError::Io {
            path: args.file.clone(),
            source,
        })
        .with_context(|| format!("Failed to verify {}", args.file.display()))?;
    let file = DocumentFile::from_slice(&bytes)
        .with_context(|| format!("Failed to verify {}", args.file.display()))?;

    let mismatches = file.hash_mismatches();
    let doc = Document::from_file(file);
    let broken = doc.events().broken_links();

    let mut problems: Vec<Finding> = mismatches
        .iter()
        .map(|e| Finding {
            code: e.code().code(),
            message: e.to_string(),
        })
        .collect();
    problems.extend(broken.iter().map(|e| Finding {
        code: e.code().code(),
        message: e.to_string(),
    }));

    let warnings = doc
        .quorums()
        .values()
        .filter(|q| !doc.events().contains(q.event_hash()))
        .map(|q| Finding {
            code: "",
            message: format!("quorum {} names unknown event {}", q.hash(), q.event_hash()),
        })
        .collect();

    let report = VerifyReport {
        events: doc.events().len(),
        quorums: doc.quorums().len(),
        problems,
        warnings,
    };
    render(output, &report, |r, w| {
        for p in &r.problems {
            writeln!(w, "FAIL [{}] {}", p.code, p.message)?;
        }
        for warning in &r.warnings {
            writeln!(w, "WARN {}", warning.message)?;
        }
        writeln!(w, "{} events, {} quorums", r.events, r.quorums)?;
        if r.is_ok() {
            writeln!(w, "verify: success")?;
        }
        Ok(())
    })?;

    if let Some(first) = mismatches.into_iter().next() {
        return Err(anyhow::Error::new(first).context("verify: failed"));
    }
    if let Some(first) = broken.into_iter().next() {
        return Err(anyhow::Error::new(first).context("verify: failed"));
    }
    Ok(())
}
