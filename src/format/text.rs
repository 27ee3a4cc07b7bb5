//! Human-readable output, in the style of `hash/core.rs`'s
//! `print_hash`/`print_hash_tag` functions: one line per record, the
//! original marked rather than hidden, ties resolved upstream by the
//! finalizer (§4.6).

use std::io::{self, Write};

use super::{Formatter, RunSummary};
use crate::record::{DupGroupEvent, LintFinding, ProgressEvent};

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn write_group(&self, out: &mut dyn Write, group: &DupGroupEvent) -> io::Result<()> {
        for file in &group.files {
            let marker = if file.is_original { "#" } else { " " };
            writeln!(out, "{marker} {} ({} bytes)", file.path.display(), file.size)?;
        }
        writeln!(
            out,
            "  -> {} duplicate(s), {} bytes redundant",
            group.duplicate_count, group.byte_savings
        )
    }

    fn write_lint(&self, out: &mut dyn Write, finding: &LintFinding) -> io::Result<()> {
        match finding {
            LintFinding::EmptyFile(path) => writeln!(out, "empty file: {}", path.display()),
            LintFinding::EmptyDirectory(path) => writeln!(out, "empty directory: {}", path.display()),
            LintFinding::BadOwner { path, uid, gid } => {
                writeln!(out, "bad owner (uid {uid}, gid {gid}): {}", path.display())
            }
            LintFinding::DanglingSymlink(path) => writeln!(out, "dangling symlink: {}", path.display()),
            LintFinding::NonStrippedBinary(path) => writeln!(out, "non-stripped binary: {}", path.display()),
        }
    }

    fn write_progress(&self, out: &mut dyn Write, progress: &ProgressEvent) -> io::Result<()> {
        writeln!(
            out,
            "[{:?}] {} files, {} bytes remaining ({} groups, {} duplicates so far)",
            progress.phase, progress.files_remaining, progress.bytes_remaining,
            progress.groups_found, progress.duplicates_found,
        )
    }

    fn write_summary(&self, out: &mut dyn Write, summary: &RunSummary) -> io::Result<()> {
        if summary.aborted {
            writeln!(out, "run aborted")?;
        }
        writeln!(
            out,
            "{} groups, {} duplicates, {} bytes redundant, {} lint findings",
            summary.groups_found, summary.duplicates_found, summary.bytes_redundant, summary.lint_findings,
        )
    }
}
