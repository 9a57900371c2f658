//! The diagnostic sink: collects `(severity, id, location-chain, message)`
//! records and formats them as plain text, call-stack-chained text, or XML.
//!
//! A [`Diagnostic`] is constructed once, at the point a check or the leak
//! verdict engine proves (or conservatively suspects) a defect, and is
//! immutable thereafter — see `spec.md` §3 "Diagnostic record".

use std::fmt;

use serde::Deserialize;
use strum::{Display, EnumString};

use crate::source::SourceBuffer;

/// `spec.md` §7's error taxonomy, reused as the diagnostic severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, Deserialize)]
pub enum Severity {
    #[strum(serialize = "error")]
    #[serde(rename = "error")]
    Error,
    #[strum(serialize = "possibleError")]
    #[serde(rename = "possibleError")]
    PossibleError,
    #[strum(serialize = "style")]
    #[serde(rename = "style")]
    Style,
    #[strum(serialize = "possibleStyle")]
    #[serde(rename = "possibleStyle")]
    PossibleStyle,
}

/// The stable identifier set from `spec.md` §6. Kept as an enum (not a bare
/// `String`) so a typo in a check can't silently mint a new, unrecognized id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Deserialize)]
pub enum DiagnosticId {
    #[strum(serialize = "memleak")]
    #[serde(rename = "memleak")]
    MemLeak,
    #[strum(serialize = "memleakall")]
    #[serde(rename = "memleakall")]
    MemLeakAll,
    #[strum(serialize = "resourceLeak")]
    #[serde(rename = "resourceLeak")]
    ResourceLeak,
    #[strum(serialize = "mismatchAllocDealloc")]
    #[serde(rename = "mismatchAllocDealloc")]
    MismatchAllocDealloc,
    #[strum(serialize = "deallocDealloc")]
    #[serde(rename = "deallocDealloc")]
    DeallocDealloc,
    #[strum(serialize = "deallocuse")]
    #[serde(rename = "deallocuse")]
    DeallocUse,
    #[strum(serialize = "mismatchSize")]
    #[serde(rename = "mismatchSize")]
    MismatchSize,
    #[strum(serialize = "uninitMember")]
    #[serde(rename = "uninitMember")]
    UninitMember,
    #[strum(serialize = "noConstructor")]
    #[serde(rename = "noConstructor")]
    NoConstructor,
    #[strum(serialize = "unusedPrivateFunction")]
    #[serde(rename = "unusedPrivateFunction")]
    UnusedPrivateFunction,
    #[strum(serialize = "noVirtualDestructor")]
    #[serde(rename = "noVirtualDestructor")]
    NoVirtualDestructor,
    #[strum(serialize = "operatorEqRetType")]
    #[serde(rename = "operatorEqRetType")]
    OperatorEqRetType,
    #[strum(serialize = "arrayIndexOutOfBounds")]
    #[serde(rename = "arrayIndexOutOfBounds")]
    ArrayIndexOutOfBounds,
    #[strum(serialize = "bufferOverrun")]
    #[serde(rename = "bufferOverrun")]
    BufferOverrun,
    #[strum(serialize = "unusedVariable")]
    #[serde(rename = "unusedVariable")]
    UnusedVariable,
    #[strum(serialize = "unusedStructMember")]
    #[serde(rename = "unusedStructMember")]
    UnusedStructMember,
    #[strum(serialize = "strncatUsage")]
    #[serde(rename = "strncatUsage")]
    StrncatUsage,
    #[strum(serialize = "invalidFunctionUsage")]
    #[serde(rename = "invalidFunctionUsage")]
    InvalidFunctionUsage,
    #[strum(serialize = "nullPointer")]
    #[serde(rename = "nullPointer")]
    NullPointer,
    #[strum(serialize = "redundantCondition")]
    #[serde(rename = "redundantCondition")]
    RedundantCondition,
    #[strum(serialize = "charVariableAsIndex")]
    #[serde(rename = "charVariableAsIndex")]
    CharVariableAsIndex,
    #[strum(serialize = "varScope")]
    #[serde(rename = "varScope")]
    VarScope,
    #[strum(serialize = "cStylePointerCast")]
    #[serde(rename = "cStylePointerCast")]
    CStylePointerCast,
    #[strum(serialize = "unreachableCode")]
    #[serde(rename = "unreachableCode")]
    UnreachableCode,
    #[strum(serialize = "zeroDivision")]
    #[serde(rename = "zeroDivision")]
    ZeroDivision,
}

/// One `(file, line)` point in a diagnostic's call-stack chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub file_index: usize,
    pub line: usize,
}

impl Location {
    #[must_use]
    pub const fn new(file_index: usize, line: usize) -> Self {
        Self { file_index, line }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub id: DiagnosticId,
    /// Ordered call-stack of locations; most diagnostics carry exactly one,
    /// a chained diagnostic (one that crosses a call, per `spec.md` §6)
    /// carries more than one, innermost location last.
    pub locations: Vec<Location>,
    pub message: String,
}

impl Diagnostic {
    #[must_use]
    pub fn new(severity: Severity, id: DiagnosticId, location: Location, message: impl Into<String>) -> Self {
        Self {
            severity,
            id,
            locations: vec![location],
            message: message.into(),
        }
    }

    #[must_use]
    pub fn chained(
        severity: Severity,
        id: DiagnosticId,
        locations: Vec<Location>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            id,
            locations,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn primary_location(&self) -> Location {
        *self.locations.last().expect("a diagnostic always has at least one location")
    }

    fn write_plain(&self, f: &mut impl fmt::Write, source: &SourceBuffer) -> fmt::Result {
        for (idx, loc) in self.locations.iter().enumerate() {
            if idx > 0 {
                write!(f, " -> ")?;
            }
            write!(f, "[{}:{}]", source.path(loc.file_index), loc.line)?;
        }
        write!(f, ": ({}) {}", self.severity, self.message)
    }

    fn write_xml(&self, f: &mut impl fmt::Write, source: &SourceBuffer) -> fmt::Result {
        let loc = self.primary_location();
        write!(
            f,
            r#"<error file="{}" line="{}" id="{}" severity="{}" msg="{}"/>"#,
            xml_escape(source.path(loc.file_index)),
            loc.line,
            self.id,
            self.severity,
            xml_escape(&self.message),
        )
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Collects diagnostics for one analysis run and flushes them to a format on
/// request. Owns all emitted records for the lifetime of the run
/// (`spec.md` §3 "Ownership").
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    records: Vec<Diagnostic>,
    min_severity: Option<Severity>,
    suppressed: std::collections::HashSet<DiagnosticId>,
}

impl DiagnosticSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    #[must_use]
    pub fn with_disabled(mut self, ids: impl IntoIterator<Item = DiagnosticId>) -> Self {
        self.suppressed.extend(ids);
        self
    }

    /// Appends a diagnostic, respecting the severity filter and the
    /// `--disable` id set. Diagnostics are appended in the order checks
    /// produce them, preserving the source-order guarantee from `spec.md` §5
    /// as long as callers run checks in source order.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.suppressed.contains(&diagnostic.id) {
            return;
        }
        if let Some(min) = self.min_severity {
            if diagnostic.severity > min {
                return;
            }
        }
        self.records.push(diagnostic);
    }

    #[must_use]
    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Merge another sink's records in, preserving relative order (used by
    /// the driver to combine per-configuration results).
    pub fn extend(&mut self, other: DiagnosticSink) {
        self.records.extend(other.records);
    }

    #[must_use]
    pub fn to_plain(&self, source: &SourceBuffer) -> String {
        let mut out = String::new();
        for (i, d) in self.records.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let _ = d.write_plain(&mut out, source);
        }
        out
    }

    #[must_use]
    pub fn to_xml(&self, source: &SourceBuffer) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<results>\n");
        for d in &self.records {
            out.push_str("  ");
            let _ = d.write_xml(&mut out, source);
            out.push('\n');
        }
        out.push_str("</results>\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceBuffer {
        SourceBuffer::from_text("a.c", "int main(){}\n")
    }

    #[test]
    fn plain_format_matches_spec() {
        let sink = {
            let mut s = DiagnosticSink::new();
            s.push(Diagnostic::new(
                Severity::Error,
                DiagnosticId::MemLeak,
                Location::new(0, 1),
                "Memory leak: p",
            ));
            s
        };
        let source = source();
        assert_eq!(sink.to_plain(&source), "[a.c:1]: (error) Memory leak: p");
    }

    #[test]
    fn chained_format_uses_arrow() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::chained(
            Severity::Error,
            DiagnosticId::MemLeak,
            vec![Location::new(0, 10), Location::new(0, 3)],
            "Memory leak: p",
        ));
        let source = source();
        assert_eq!(
            sink.to_plain(&source),
            "[a.c:10] -> [a.c:3]: (error) Memory leak: p"
        );
    }

    #[test]
    fn severity_filter_drops_lower_priority() {
        let mut sink = DiagnosticSink::new().with_min_severity(Severity::Style);
        sink.push(Diagnostic::new(
            Severity::PossibleStyle,
            DiagnosticId::VarScope,
            Location::new(0, 1),
            "scope can be reduced",
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn disabled_ids_are_suppressed() {
        let mut sink = DiagnosticSink::new().with_disabled([DiagnosticId::MemLeak]);
        sink.push(Diagnostic::new(
            Severity::Error,
            DiagnosticId::MemLeak,
            Location::new(0, 1),
            "leak",
        ));
        assert!(sink.is_empty());
    }

    #[test]
    fn xml_escapes_message() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::new(
            Severity::Style,
            DiagnosticId::CStylePointerCast,
            Location::new(0, 5),
            r#"cast to "Foo*""#,
        ));
        let source = source();
        let xml = sink.to_xml(&source);
        assert!(xml.contains("&quot;Foo*&quot;"));
        assert!(xml.contains(r#"id="cStylePointerCast""#));
    }
}
