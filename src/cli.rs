//! Command-line surface (`[CLI]`): a `clap`-derive struct whose fields map
//! directly onto `[DRIVER]`'s inputs and `[DIAGNOSTIC_SINK]`'s output format.
//!
//! Grounded on `thag_rs::stdin`'s `#[derive(Parser)]` struct — the teacher's
//! one real use of `clap::Parser` (its `bin/thag_convert_themes.rs` is the
//! same shape for a simpler case).

use std::path::PathBuf;

use clap::Parser;

use crate::diagnostics::{DiagnosticId, Severity};

#[derive(Debug, Parser)]
#[command(name = "cclint", author, version, about = "A static analyzer for C and C++ source")]
pub struct Cli {
    /// Source files to analyze.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Path to a `cclint.toml` configuration file.
    #[arg(long, default_value = "cclint.toml")]
    pub config: PathBuf,

    /// Minimum severity to report; omit to report everything.
    #[arg(long, value_enum)]
    pub severity: Option<CliSeverity>,

    /// Also report conservative ("possible") diagnostics.
    #[arg(short = 'a', long = "show-all")]
    pub show_all: bool,

    /// Emit the XML report format instead of plain text.
    #[arg(long)]
    pub xml: bool,

    /// Re-enable a diagnostic id that `cclint.toml` disabled.
    #[arg(long = "enable", value_name = "ID")]
    pub enable: Vec<String>,

    /// Suppress a diagnostic id regardless of severity.
    #[arg(long = "disable", value_name = "ID")]
    pub disable: Vec<String>,

    /// Predefine a macro, `NAME` or `NAME=VALUE`; repeatable.
    #[arg(short = 'D', long = "define", value_name = "NAME[=VALUE]")]
    pub define: Vec<String>,

    /// Additional `#include "…"` search directory; repeatable.
    #[arg(short = 'I', long = "include", value_name = "PATH")]
    pub include: Vec<String>,

    /// Cap on the number of preprocessor configurations analyzed per file.
    #[arg(long)]
    pub max_configs: Option<usize>,

    /// Suppress informational logging; only warnings and errors are shown.
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Enable debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Mirrors [`Severity`] for `clap`'s `ValueEnum`, since `Severity` itself is
/// keyed to the diagnostic wire spelling (`possibleError`, …) rather than a
/// CLI-friendly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliSeverity {
    Error,
    PossibleError,
    Style,
    PossibleStyle,
}

impl From<CliSeverity> for Severity {
    fn from(value: CliSeverity) -> Self {
        match value {
            CliSeverity::Error => Self::Error,
            CliSeverity::PossibleError => Self::PossibleError,
            CliSeverity::Style => Self::Style,
            CliSeverity::PossibleStyle => Self::PossibleStyle,
        }
    }
}

impl Cli {
    /// Parses `--define` entries into `(name, value)` pairs for the
    /// preprocessor; a bare `NAME` defines it as `"1"`.
    #[must_use]
    pub fn defines(&self) -> Vec<(String, String)> {
        self.define
            .iter()
            .map(|raw| match raw.split_once('=') {
                Some((name, value)) => (name.to_string(), value.to_string()),
                None => (raw.clone(), "1".to_string()),
            })
            .collect()
    }

    /// `--disable`/`--enable` as parsed [`DiagnosticId`]s; an unrecognized
    /// id is logged and dropped rather than treated as fatal.
    #[must_use]
    pub fn disabled_ids(&self) -> Vec<DiagnosticId> {
        parse_ids(&self.disable)
    }

    #[must_use]
    pub fn enabled_ids(&self) -> Vec<DiagnosticId> {
        parse_ids(&self.enable)
    }
}

fn parse_ids(raw: &[String]) -> Vec<DiagnosticId> {
    raw.iter()
        .filter_map(|s| match s.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                log::warn!("unrecognized diagnostic id '{s}', ignoring");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_define_defaults_to_one() {
        let cli = Cli::parse_from(["cclint", "-D", "DEBUG", "a.c"]);
        assert_eq!(cli.defines(), vec![("DEBUG".to_string(), "1".to_string())]);
    }

    #[test]
    fn keyed_define_splits_on_equals() {
        let cli = Cli::parse_from(["cclint", "-D", "SIZE=16", "a.c"]);
        assert_eq!(cli.defines(), vec![("SIZE".to_string(), "16".to_string())]);
    }

    #[test]
    fn unknown_disable_id_is_dropped_not_fatal() {
        let cli = Cli::parse_from(["cclint", "--disable", "notAnId", "a.c"]);
        assert!(cli.disabled_ids().is_empty());
    }

    #[test]
    fn known_disable_id_parses() {
        let cli = Cli::parse_from(["cclint", "--disable", "memleak", "a.c"]);
        assert_eq!(cli.disabled_ids(), vec![DiagnosticId::MemLeak]);
    }
}
