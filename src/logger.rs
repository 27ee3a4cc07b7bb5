//! Injected logging capability (§7: "nothing in the core writes to
//! stdout/stderr directly except via the injected logger").
//!
//! The default implementation is a thin adapter over the `log` facade
//! (as used by the pack's directory-walking crate for the same purpose),
//! so `RUST_LOG` controls verbosity the usual way. Tests use `NullLogger`.

pub trait Logger: Send + Sync {
    fn info(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn debug(&self, msg: &str);
}

/// Routes through the `log` crate facade.
pub struct EnvLogger;

impl Logger for EnvLogger {
    fn info(&self, msg: &str) {
        log::info!("{msg}");
    }

    fn warn(&self, msg: &str) {
        log::warn!("{msg}");
    }

    fn debug(&self, msg: &str) {
        log::debug!("{msg}");
    }
}

/// Discards everything. Used by tests and by callers embedding the core
/// as a library without wanting log output.
pub struct NullLogger;

impl Logger for NullLogger {
    fn info(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn debug(&self, _msg: &str) {}
}
