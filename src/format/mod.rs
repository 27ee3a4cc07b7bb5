//! Output formatter (ambient, §6 "exposed interfaces"). Grounded on
//! `hash/core.rs`'s `print_hash*` family: free functions taking
//! `&mut impl Write` rather than a formatter object owning the output
//! stream, so callers can point the same writer at stdout, a file, or an
//! in-memory buffer in tests.

pub mod json;
pub mod text;

use std::io::{self, Write};

use crate::record::{DupGroupEvent, LintFinding, ProgressEvent};

/// One of the two presentation modes the CLI exposes (`--format text|json`).
pub trait Formatter {
    fn write_group(&self, out: &mut dyn Write, group: &DupGroupEvent) -> io::Result<()>;
    fn write_lint(&self, out: &mut dyn Write, finding: &LintFinding) -> io::Result<()>;
    fn write_progress(&self, out: &mut dyn Write, progress: &ProgressEvent) -> io::Result<()>;
    fn write_summary(&self, out: &mut dyn Write, summary: &RunSummary) -> io::Result<()>;
}

/// Totals accumulated across a full run, printed once at the end.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct RunSummary {
    pub groups_found: usize,
    pub duplicates_found: usize,
    pub bytes_redundant: u64,
    pub lint_findings: usize,
    pub aborted: bool,
}

pub use json::JsonFormatter;
pub use text::TextFormatter;
