//! Developer-facing tracing, via the `log` crate.
//!
//! This is orthogonal to [`crate::diagnostics`]: diagnostics are the
//! analyzer's user-facing *output*; this module is internal trace logging
//! for debugging the analyzer itself, enabled with `-v`/`-q` or `RUST_LOG`.

use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// How chatty the analyzer should be about its own progress, independent of
/// which [`crate::diagnostics::Severity`] levels get reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    #[must_use]
    pub fn level_filter(self) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::Error,
            Self::Normal => LevelFilter::Warn,
            Self::Verbose => LevelFilter::Debug,
        }
    }
}

/// Initialize the global logger once, honoring `RUST_LOG` if set, falling
/// back to `verbosity` otherwise. Safe to call more than once; later calls
/// are no-ops (mirrors `env_logger::Builder::try_init`'s idempotence).
pub fn init(verbosity: Verbosity) {
    let mut builder = Builder::new();
    builder
        .filter_level(verbosity.level_filter())
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .parse_default_env();
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_is_stricter_than_verbose() {
        assert!(Verbosity::Quiet.level_filter() < Verbosity::Verbose.level_filter());
    }
}
