//! Holds the source text for one translation unit and maps `(file-index,
//! line)` pairs back to paths, for diagnostics (`spec.md` §2 "Source
//! buffer").
//!
//! `#include "x.h"` pass-through markers (`spec.md` §4.1) give each included
//! file its own index, so a diagnostic inside an included header still
//! reports the header's own path, not the including file's.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct SourceBuffer {
    paths: Vec<PathBuf>,
    texts: Vec<String>,
}

impl SourceBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for a single in-memory file, used throughout
    /// the test suite.
    #[must_use]
    pub fn from_text(path: impl AsRef<Path>, text: impl Into<String>) -> Self {
        let mut buf = Self::new();
        buf.add_file(path, text);
        buf
    }

    /// Registers a file and returns its stable `file_index`.
    pub fn add_file(&mut self, path: impl AsRef<Path>, text: impl Into<String>) -> usize {
        self.paths.push(path.as_ref().to_path_buf());
        self.texts.push(text.into());
        self.paths.len() - 1
    }

    #[must_use]
    pub fn path(&self, file_index: usize) -> String {
        self.paths
            .get(file_index)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| format!("<unknown file {file_index}>"))
    }

    #[must_use]
    pub fn text(&self, file_index: usize) -> &str {
        self.texts
            .get(file_index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn file_count(&self) -> usize {
        self.paths.len()
    }

    /// Lines of `text(file_index)`, 1-indexed to match `Location::line`.
    #[must_use]
    pub fn line(&self, file_index: usize, line: usize) -> Option<&str> {
        line.checked_sub(1)
            .and_then(|i| self.text(file_index).lines().nth(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_path_and_line() {
        let buf = SourceBuffer::from_text("foo.c", "int a;\nint b;\n");
        assert_eq!(buf.path(0), "foo.c");
        assert_eq!(buf.line(0, 2), Some("int b;"));
    }

    #[test]
    fn unknown_file_index_is_reported_not_panicked() {
        let buf = SourceBuffer::new();
        assert!(buf.path(3).contains("unknown"));
    }
}
