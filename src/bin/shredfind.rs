use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;

use shredfind_core::abort::AbortFlag;
use shredfind_core::config::{Config, ParanoidCollisionPolicy, WaitPolicy};
use shredfind_core::format::{Formatter, JsonFormatter, TextFormatter};
use shredfind_core::logger::EnvLogger;
use shredfind_core::mount::DefaultMountTable;

#[derive(Parser)]
#[command(
    name = "shredfind",
    about = "Find duplicate files and common filesystem lint by progressive hashing",
    after_help = "With no PATH, the current directory is scanned."
)]
struct Cli {
    /// Directories or files to scan
    paths: Vec<PathBuf>,

    /// Digest algorithm: blake2b, blake2b-256, sha256, sha512, md5, xxh3,
    /// cumulative, ext, or paranoid (byte-exact comparison)
    #[arg(short = 'a', long = "checksum-type", default_value = "blake2b")]
    checksum_type: String,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "text")]
    format: OutputFormat,

    /// Number of hasher worker threads
    #[arg(short = 't', long = "threads", default_value_t = num_cpus())]
    threads: usize,

    /// Follow symbolic links during traversal
    #[arg(short = 'L', long = "follow-symlinks")]
    follow_symlinks: bool,

    /// Don't cross filesystem boundaries while traversing
    #[arg(short = 'x', long = "one-file-system")]
    one_file_system: bool,

    /// Only report duplicates where every member is tagged (appears after `--`)
    #[arg(long = "must-match-tagged")]
    must_match_tagged: bool,

    /// Only report duplicates where no member is tagged
    #[arg(long = "must-match-untagged")]
    must_match_untagged: bool,

    /// Keep (never report as duplicate) every tagged file in a group
    #[arg(short = 'k', long = "keep-all-tagged")]
    keep_all_tagged: bool,

    /// Keep every untagged file in a group
    #[arg(short = 'K', long = "keep-all-untagged")]
    keep_all_untagged: bool,

    /// Ranking criteria string applied within a group, e.g. "pOma" (§4.6)
    #[arg(long = "rank-criteria", default_value = "pOma")]
    rank_criteria: String,

    /// Split a group further if two files don't share a basename
    #[arg(long = "unmatched-basenames")]
    unmatched_basenames: bool,

    /// Flag directories whose files are all duplicates of another directory's
    #[arg(long = "merge-directories")]
    merge_directories: bool,

    /// Skip empty-file/dir, dangling-symlink, bad-owner, and non-stripped-binary checks
    #[arg(long = "no-lint")]
    no_lint: bool,

    /// Always wait for the same-disk arm instead of the size/rotational heuristic
    #[arg(long = "always-wait", conflicts_with = "never_wait")]
    always_wait: bool,

    /// Never wait for the same-disk arm
    #[arg(long = "never-wait")]
    never_wait: bool,

    /// Total memory budget for paranoid-mode buffers, in bytes
    #[arg(long = "paranoid-mem", default_value_t = 256 * 1024 * 1024)]
    paranoid_mem: u64,

    /// Tagged paths come after this marker, e.g. `shredfind a b -- c d`
    #[arg(last = true)]
    tagged: Vec<PathBuf>,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

fn main() {
    if let Err(e) = try_main() {
        eprintln!("shredfind: {e:#}");
        process::exit(1);
    }
}

fn try_main() -> anyhow::Result<()> {
    use anyhow::Context;

    let cli = Cli::parse();

    let mut config = Config {
        checksum_type: cli.checksum_type,
        threads: cli.threads.max(1),
        follow_symlinks: cli.follow_symlinks,
        one_file_system: cli.one_file_system,
        must_match_tagged: cli.must_match_tagged,
        must_match_untagged: cli.must_match_untagged,
        keep_all_tagged: cli.keep_all_tagged,
        keep_all_untagged: cli.keep_all_untagged,
        rank_criteria: cli.rank_criteria,
        unmatched_basenames: cli.unmatched_basenames,
        merge_directories: cli.merge_directories,
        detect_lint: !cli.no_lint,
        total_mem: cli.paranoid_mem,
        paranoid_collision_policy: ParanoidCollisionPolicy::Fatal,
        ..Config::default()
    };
    config.wait_policy = if cli.always_wait {
        WaitPolicy::AlwaysWait
    } else if cli.never_wait {
        WaitPolicy::NeverWait
    } else {
        WaitPolicy::Heuristic
    };

    let mut roots = if cli.paths.is_empty() { vec![PathBuf::from(".")] } else { cli.paths };
    roots.extend(cli.tagged);

    let abort = AbortFlag::new();
    let abort_for_handler = abort.clone();
    if ctrlc::set_handler(move || abort_for_handler.set()).is_err() {
        eprintln!("shredfind: warning: failed to install Ctrl-C handler");
    }

    env_logger::init();
    let logger = Arc::new(EnvLogger);
    let mount_table = Arc::new(DefaultMountTable::discover());

    let formatter: &dyn Formatter = match cli.format {
        OutputFormat::Text => &TextFormatter,
        OutputFormat::Json => &JsonFormatter,
    };

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let result = shredfind_core::run(roots, &config, mount_table, formatter, &mut out, logger, abort.clone())
        .context("scanning failed");
    out.flush().context("flushing output")?;

    let summary = result?;
    if abort.is_set() || summary.aborted {
        process::exit(130);
    }
    Ok(())
}
