use std::path::PathBuf;

use thiserror::Error;

/// Fatal error taxonomy for the core (§7). Per-file failures are never
/// propagated as errors — they are recorded on the offending `FileRecord`
/// and drained through the normal sift/finalize path instead.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown digest variant '{0}'")]
    UnknownDigest(String),

    #[error("paranoid collision: shadow hash matched but byte comparison mismatched between {a} and {b}")]
    ParanoidCollision { a: PathBuf, b: PathBuf },

    #[error("run aborted by user")]
    Aborted,
}

/// Per-file error recorded by the hasher/scheduler and surfaced on
/// completion. Never unwinds the stack — the file is marked `ignored`
/// and sifted away.
#[derive(Debug, Error, Clone)]
#[error("{path}: {message}")]
pub struct PathError {
    pub path: PathBuf,
    pub message: String,
}

impl PathError {
    pub fn from_io(path: PathBuf, err: &std::io::Error) -> Self {
        PathError {
            path,
            message: err.to_string(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Top-level error for [`crate::run`]: either a fatal core condition
/// (§7) or an I/O failure writing through the formatter.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
