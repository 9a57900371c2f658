//! Rule checks (`spec.md` §4.8): independent passes over the (already
//! simplified, variable-ID-assigned) token stream. Unlike the leak verdict
//! engine in `crate::flow`, these never mutate the stream — only the
//! simplifier is allowed to (`spec.md` §5 "rule checks only read").

pub mod bufferoverrun;
pub mod class;
pub mod style;
pub mod unused;

use crate::diagnostics::DiagnosticSink;
use crate::tokenizer::Tokenizer;

/// Runs every rule check over `tz`, in the fixed order `spec.md` §5's
/// source-order guarantee implies (each check walks the stream start to
/// end, so running them in sequence keeps diagnostics grouped by check
/// but still in source order within each).
pub fn run_all(tz: &Tokenizer, sink: &mut DiagnosticSink) {
    class::check(tz, sink);
    bufferoverrun::check(tz, sink);
    unused::check(tz, sink);
    style::check(tz, sink);
}
