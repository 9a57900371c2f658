//! Analysis configuration (`spec.md` §5's "configurable type-size map and
//! auto-deallocating type names", expanded with the severity filter,
//! show-all flag, and macro/include search paths `[CLI]` feeds in).
//!
//! Grounded on `thag_rs::config`: a `Deserialize` struct loaded from a TOML
//! file, falling back to `Default` when no file is present, with CLI flags
//! layered on top afterward rather than the file dictating everything.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::diagnostics::{DiagnosticId, Severity};
use crate::errors::CcResult;

/// `spec.md` §4.3's `size_of_type` map, plus the `float`/`double`/`long long`
/// entries recovered from cppcheck's `sizeOfType` (`SPEC_FULL.md` §4).
fn default_type_sizes() -> HashMap<String, u32> {
    [
        ("bool", 1),
        ("char", 1),
        ("short", 2),
        ("int", 4),
        ("long", 8),
        ("float", 4),
        ("double", 8),
        ("long long", 8),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum severity to report; `None` reports everything.
    pub severity: Option<Severity>,
    /// Show conservative ("possible") diagnostics as well as proven ones.
    pub show_all: bool,
    /// Diagnostic ids to suppress regardless of severity.
    pub disabled: Vec<DiagnosticId>,
    /// Class names assumed to free their own resources in their destructor
    /// (`spec.md` §5's "auto-deallocating type names").
    pub auto_dealloc_types: Vec<String>,
    /// `name -> byte size` overrides/additions to `default_type_sizes`.
    pub type_sizes: HashMap<String, u32>,
    /// Additional directories searched for `#include "…"`.
    pub include_paths: Vec<String>,
    /// Macros predefined before preprocessing (`--define KEY[=VAL]`).
    pub predefined: HashMap<String, String>,
    pub pointer_size: u32,
    pub max_configs: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            severity: None,
            show_all: false,
            disabled: Vec::new(),
            auto_dealloc_types: Vec::new(),
            type_sizes: default_type_sizes(),
            include_paths: Vec::new(),
            predefined: HashMap::new(),
            pointer_size: 8,
            max_configs: 64,
        }
    }
}

impl Config {
    /// Resolves a size by name, falling back to `default_type_sizes` for any
    /// name a `cclint.toml`'s `type_sizes` table doesn't override.
    #[must_use]
    pub fn size_of(&self, type_name: &str) -> Option<u32> {
        self.type_sizes
            .get(type_name)
            .copied()
            .or_else(|| default_type_sizes().get(type_name).copied())
    }

    #[must_use]
    pub fn is_auto_dealloc_type(&self, name: &str) -> bool {
        self.auto_dealloc_types.iter().any(|t| t == name)
    }

    /// Loads `path` if it exists, otherwise returns the default
    /// configuration — a missing `cclint.toml` is not an error.
    pub fn load(path: &Path) -> CcResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_seed_standard_type_sizes() {
        let config = Config::default();
        assert_eq!(config.size_of("int"), Some(4));
        assert_eq!(config.size_of("double"), Some(8));
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let config = Config::load(Path::new("/nonexistent/cclint.toml")).unwrap();
        assert_eq!(config.pointer_size, 8);
    }

    #[test]
    fn type_sizes_override_defaults() {
        let toml = "pointer_size = 4\n[type_sizes]\nint = 2\n";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.size_of("int"), Some(2));
        assert_eq!(config.size_of("char"), Some(1));
    }

    #[test]
    fn auto_dealloc_membership() {
        let mut config = Config::default();
        config.auto_dealloc_types.push("MyString".to_string());
        assert!(config.is_auto_dealloc_type("MyString"));
        assert!(!config.is_auto_dealloc_type("Other"));
    }
}
