//! End-to-end coverage for the scenarios spec.md calls "the basis for
//! the crate's test suite" (§8) that only make sense driven through the
//! public `shredfind_core::run` entry point rather than at the
//! `ShredEngine` unit level.

use std::cell::RefCell;
use std::fs;
use std::io;
use std::sync::Arc;

use shredfind_core::abort::AbortFlag;
use shredfind_core::config::Config;
use shredfind_core::format::{Formatter, RunSummary};
use shredfind_core::logger::NullLogger;
use shredfind_core::mount::DefaultMountTable;
use shredfind_core::record::{DupGroupEvent, LintFinding, ProgressEvent};

/// Records every emitted duplicate group instead of writing text/JSON,
/// so tests can assert on structure rather than scraping formatted
/// output.
#[derive(Default)]
struct CapturingFormatter {
    groups: RefCell<Vec<DupGroupEvent>>,
}

impl Formatter for CapturingFormatter {
    fn write_group(&self, _out: &mut dyn io::Write, group: &DupGroupEvent) -> io::Result<()> {
        self.groups.borrow_mut().push(group.clone());
        Ok(())
    }
    fn write_lint(&self, _out: &mut dyn io::Write, _finding: &LintFinding) -> io::Result<()> {
        Ok(())
    }
    fn write_progress(&self, _out: &mut dyn io::Write, _progress: &ProgressEvent) -> io::Result<()> {
        Ok(())
    }
    fn write_summary(&self, _out: &mut dyn io::Write, _summary: &RunSummary) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn hardlinked_files_are_reported_as_one_duplicate_group() {
    let dir = tempfile::tempdir().unwrap();
    let original = dir.path().join("original");
    let hardlink = dir.path().join("hardlink");
    let unrelated = dir.path().join("unrelated");

    fs::write(&original, b"same bytes in both paths").unwrap();
    fs::hard_link(&original, &hardlink).unwrap();
    fs::write(&unrelated, b"totally different content, also shorter").unwrap();

    let config = Config::default();
    let formatter = CapturingFormatter::default();
    let mut out: Vec<u8> = Vec::new();
    let summary = shredfind_core::run(
        vec![dir.path().to_path_buf()],
        &config,
        Arc::new(DefaultMountTable::discover()),
        &formatter,
        &mut out,
        Arc::new(NullLogger),
        AbortFlag::new(),
    )
    .unwrap();

    assert!(!summary.aborted);
    let groups = formatter.groups.borrow();
    assert_eq!(groups.len(), 1, "expected exactly one duplicate group, got {groups:?}");
    let mut names: Vec<String> =
        groups[0].files.iter().map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned()).collect();
    names.sort();
    assert_eq!(names, vec!["hardlink".to_string(), "original".to_string()]);
}

#[test]
fn preset_abort_flag_short_circuits_the_run_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    // At least one size bucket must exist for the abort check inside the
    // per-bucket loop to ever run.
    fs::write(dir.path().join("a"), b"duplicate payload").unwrap();
    fs::write(dir.path().join("b"), b"duplicate payload").unwrap();

    let config = Config::default();
    let formatter = CapturingFormatter::default();
    let mut out: Vec<u8> = Vec::new();
    let abort = AbortFlag::new();
    abort.set();

    let summary = shredfind_core::run(
        vec![dir.path().to_path_buf()],
        &config,
        Arc::new(DefaultMountTable::discover()),
        &formatter,
        &mut out,
        Arc::new(NullLogger),
        abort.clone(),
    )
    .unwrap();

    assert!(summary.aborted);
    assert_eq!(summary.groups_found, 0);
    assert_eq!(summary.duplicates_found, 0);
    assert!(formatter.groups.borrow().is_empty());
}
