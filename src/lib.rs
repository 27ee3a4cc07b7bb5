// Allow pre-existing clippy lints across the codebase
#![allow(
    clippy::collapsible_if,
    clippy::unnecessary_map_or,
    clippy::redundant_closure,
    clippy::manual_strip,
    clippy::needless_range_loop,
    clippy::identity_op,
    clippy::len_without_is_empty,
    clippy::doc_lazy_continuation,
    clippy::empty_line_after_doc_comments,
    clippy::implicit_saturating_sub,
    clippy::manual_div_ceil,
    clippy::manual_range_contains,
    clippy::needless_borrows_for_generic_args,
    clippy::needless_lifetimes,
    clippy::needless_return,
    clippy::too_many_arguments,
    clippy::unnecessary_cast,
    clippy::write_literal,
    clippy::io_other_error
)]

/// Use mimalloc as the global allocator for the CLI binary.
/// Better thread-local caching than glibc malloc, which matters here
/// given how many small `Group`/trie-node allocations the shred engine
/// and path trie produce per run.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod abort;
pub mod config;
pub mod digest;
pub mod error;
pub mod format;
pub mod hasher;
pub mod logger;
pub mod mount;
pub mod paranoid;
pub mod preprocess;
pub mod rank;
pub mod record;
pub mod scheduler;
pub mod sift;
pub mod traverse;
pub mod trie;
pub mod xattr_cache;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use abort::AbortFlag;
use config::Config;
use digest::DigestKind;
use error::RunError;
use format::{Formatter, RunSummary};
use logger::Logger;
use mount::MountTable;
use preprocess::{PreprocessOpts, Preprocessor};
use rank::Finalizer;
use record::{LintFinding, ProgressEvent, ProgressPhase};
use sift::ShredEngine;
use traverse::{DefaultTraverser, TraverseOpts, Traverser};
use trie::PathTrie;

/// Runs one full pass over `roots`: traverse, preprocess (size-bucket,
/// hardlink-cluster, lint), shred each size bucket, finalize and rank,
/// then stream every result through `formatter` into `out`. This is the
/// glue the CLI binary calls; embedders of the library can call it
/// directly or recombine the pieces themselves.
pub fn run(
    roots: Vec<PathBuf>,
    config: &Config,
    mount_table: Arc<dyn MountTable>,
    formatter: &dyn Formatter,
    out: &mut dyn Write,
    logger: Arc<dyn Logger>,
    abort: AbortFlag,
) -> Result<RunSummary, RunError> {
    let trie: Arc<PathTrie<()>> = Arc::new(PathTrie::new());

    formatter.write_progress(out, &ProgressEvent { phase: ProgressPhase::Traverse, ..ProgressEvent::default() })?;

    let traverse_opts = TraverseOpts {
        follow_symlinks: config.follow_symlinks,
        one_file_system: config.one_file_system,
    };
    let traverser = DefaultTraverser::new(trie.clone(), logger.clone());
    let entries = traverser.walk(&roots, &traverse_opts).filter_map(|entry| match entry {
        Ok(e) => Some(e),
        Err(e) => {
            logger.warn(&format!("traversal error: {e}"));
            None
        }
    });

    let preprocessor = Preprocessor::new(mount_table.clone(), trie.clone(), logger.clone());
    let preprocess_opts = PreprocessOpts {
        read_ext_cksum_xattr: config.use_xattr_cache,
        detect_lint: config.detect_lint,
    };
    let output = preprocessor.run(entries, &preprocess_opts);

    for finding in &output.lint_findings {
        formatter.write_lint(out, finding)?;
    }

    let mut remaining_files: u64 = output
        .size_buckets
        .values()
        .flat_map(|clusters| clusters.iter())
        .map(|c| c.total_members() as u64)
        .sum();
    let mut remaining_bytes: u64 = output
        .size_buckets
        .iter()
        .map(|(size, clusters)| size * clusters.iter().map(|c| c.total_members() as u64).sum::<u64>())
        .sum();

    let mut summary = RunSummary {
        lint_findings: output.lint_findings.len(),
        ..RunSummary::default()
    };

    formatter.write_progress(
        out,
        &ProgressEvent {
            phase: ProgressPhase::Preprocess,
            bytes_remaining: remaining_bytes,
            files_remaining: remaining_files,
            ..ProgressEvent::default()
        },
    )?;

    let digest_kind = DigestKind::parse(&config.checksum_type).unwrap_or(DigestKind::Blake2b { output_bytes: 64 });
    let engine = ShredEngine::new(mount_table, config, abort.clone(), logger.clone());
    let finalizer = Finalizer::new(trie);

    for (size, entrants) in output.size_buckets {
        if abort.is_set() {
            summary.aborted = true;
            break;
        }
        let bucket_files: u64 = entrants.iter().map(|c| c.total_members() as u64).sum();
        let classes = engine.run_size_bucket(size, entrants, digest_kind, config)?;
        for class in classes {
            for event in finalizer.finalize(class, config) {
                summary.groups_found += 1;
                summary.duplicates_found += event.duplicate_count;
                summary.bytes_redundant += event.byte_savings;
                formatter.write_group(out, &event)?;
            }
        }
        remaining_files = remaining_files.saturating_sub(bucket_files);
        remaining_bytes = remaining_bytes.saturating_sub(size * bucket_files);
        formatter.write_progress(
            out,
            &ProgressEvent {
                phase: ProgressPhase::Shredder,
                bytes_remaining: remaining_bytes,
                files_remaining: remaining_files,
                duplicates_found: summary.duplicates_found as u64,
                groups_found: summary.groups_found as u64,
                aborted: summary.aborted,
            },
        )?;
    }
    engine.shutdown();

    if config.merge_directories {
        formatter.write_progress(
            out,
            &ProgressEvent {
                phase: ProgressPhase::Merge,
                duplicates_found: summary.duplicates_found as u64,
                groups_found: summary.groups_found as u64,
                aborted: summary.aborted,
                ..ProgressEvent::default()
            },
        )?;
    }

    formatter.write_progress(
        out,
        &ProgressEvent {
            phase: ProgressPhase::Summary,
            duplicates_found: summary.duplicates_found as u64,
            groups_found: summary.groups_found as u64,
            aborted: summary.aborted,
            ..ProgressEvent::default()
        },
    )?;
    formatter.write_summary(out, &summary)?;
    Ok(summary)
}

/// Counts lint findings by kind, used by the CLI's `--lint-only` summary.
pub fn count_lint_kind(findings: &[LintFinding], predicate: impl Fn(&LintFinding) -> bool) -> usize {
    findings.iter().filter(|f| predicate(f)).count()
}
