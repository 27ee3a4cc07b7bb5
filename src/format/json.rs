//! JSON output via `serde_json`, one object per line (ndjson) so a
//! consumer can stream a run without buffering the whole result set —
//! mirrors the progress-as-a-stream shape §6 describes.

use std::io::{self, Write};

use super::{Formatter, RunSummary};
use crate::record::{DupGroupEvent, LintFinding, ProgressEvent};

pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn write_group(&self, out: &mut dyn Write, group: &DupGroupEvent) -> io::Result<()> {
        serde_json::to_writer(&mut *out, group).map_err(io::Error::other)?;
        writeln!(out)
    }

    fn write_lint(&self, out: &mut dyn Write, finding: &LintFinding) -> io::Result<()> {
        serde_json::to_writer(&mut *out, finding).map_err(io::Error::other)?;
        writeln!(out)
    }

    fn write_progress(&self, out: &mut dyn Write, progress: &ProgressEvent) -> io::Result<()> {
        serde_json::to_writer(&mut *out, progress).map_err(io::Error::other)?;
        writeln!(out)
    }

    fn write_summary(&self, out: &mut dyn Write, summary: &RunSummary) -> io::Result<()> {
        serde_json::to_writer(&mut *out, summary).map_err(io::Error::other)?;
        writeln!(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EmittedFile;
    use std::path::PathBuf;

    #[test]
    fn emits_one_json_object_per_line() {
        let group = DupGroupEvent {
            files: vec![EmittedFile { path: PathBuf::from("/a"), size: 10, is_original: true }],
            duplicate_count: 0,
            byte_savings: 0,
            directory_merge_candidate: false,
        };
        let mut buf = Vec::new();
        JsonFormatter.write_group(&mut buf, &group).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.ends_with('\n'));
        let parsed: serde_json::Value = serde_json::from_str(text.trim()).unwrap();
        assert_eq!(parsed["duplicate_count"], 0);
    }
}
