//! The leak verdict engine (`spec.md` §4.7): scans a reduced, fixed-point
//! stream for witness patterns, in the priority order the spec lists, and
//! emits one diagnostic per witness found.

use crate::diagnostics::{Diagnostic, DiagnosticId, DiagnosticSink, Location, Severity};
use crate::flow::lowering::{focus_variables, Lowerer};
use crate::flow::reduced::{AllocKind, ReducedKind, ReducedStmt};
use crate::flow::reducer;
use crate::token::{TokenId, TokenList, VarId};
use crate::tokenizer::Tokenizer;

/// Picks the id/severity/wording for a "leaked" witness: a resource handle
/// (file/descriptor/pipe/directory) is always `resourceLeak`/`Error`; plain
/// heap memory is `memleak`/`Error` normally, or the more conservative
/// `memleakall`/`PossibleError` when `show_all` widened the reduction
/// (`original_source`'s `CheckMemoryLeak::leakError`).
fn leak_verdict(alloc_kind: Option<AllocKind>, show_all: bool) -> (DiagnosticId, Severity, &'static str) {
    if alloc_kind.is_some_and(AllocKind::is_resource) {
        (DiagnosticId::ResourceLeak, Severity::Error, "resource leak")
    } else if show_all {
        (DiagnosticId::MemLeakAll, Severity::PossibleError, "memory leak")
    } else {
        (DiagnosticId::MemLeak, Severity::Error, "memory leak")
    }
}

/// Lowers, reduces, and checks every local variable declared in
/// `[body_open, body_close]`, pushing any witnesses it finds into `sink`.
pub fn check_function(tz: &Tokenizer, body_open: TokenId, body_close: TokenId, sink: &mut DiagnosticSink, show_all: bool) {
    let tokens = tz.tokens();
    for var in focus_variables(tokens, body_open, body_close) {
        let name = declared_name(tokens, body_open, body_close, var);
        let mut lowerer = Lowerer::new(tz);
        let stream = lowerer.lower(body_open, body_close, var);
        let reduced = if show_all { reducer::reduce_show_all(stream) } else { reducer::reduce(stream) };
        scan_witnesses(tokens, &reduced, &name, sink, show_all);
    }
}

fn declared_name(tokens: &TokenList, start: TokenId, end: TokenId, var: VarId) -> String {
    let mut cur = Some(start);
    while let Some(id) = cur {
        if let Some(tok) = tokens.get(id) {
            if tok.var_id == var && tok.is_name {
                return tok.text.clone();
            }
        }
        if id == end {
            break;
        }
        cur = tokens.next(id);
    }
    format!("var{}", var.0)
}

fn loc(tokens: &TokenList, id: TokenId) -> Location {
    tokens.get(id).map(|t| Location::new(t.file_index, t.line)).unwrap_or(Location::new(0, 0))
}

fn matching_close(stream: &[ReducedStmt], open_idx: usize) -> usize {
    let mut depth = 1i32;
    let mut j = open_idx + 1;
    while j < stream.len() {
        match stream[j].kind {
            ReducedKind::OpenBrace => depth += 1,
            ReducedKind::CloseBrace => {
                depth -= 1;
                if depth == 0 {
                    return j;
                }
            }
            _ => {}
        }
        j += 1;
    }
    stream.len().saturating_sub(1)
}

fn scan_witnesses(tokens: &TokenList, stream: &[ReducedStmt], name: &str, sink: &mut DiagnosticSink, show_all: bool) {
    let mut fired = vec![false; stream.len()];
    let mut any_alloc = false;
    let mut any_alloc_kind = None;
    let mut any_release_or_use = false;

    // Rule 1: a loop whose body contains an alloc with no compensating
    // dealloc before the loop closes.
    for i in 0..stream.len() {
        if matches!(stream[i].kind, ReducedKind::Loop) {
            let Some(open) = (i + 1..stream.len()).find(|&j| matches!(stream[j].kind, ReducedKind::OpenBrace)) else {
                continue;
            };
            let close = matching_close(stream, open);
            if let Some(alloc_idx) = (open + 1..close).find(|&j| stream[j].is_alloc()) {
                let has_dealloc = (alloc_idx + 1..close).any(|j| stream[j].is_dealloc());
                if !has_dealloc {
                    let (id, severity, what) = leak_verdict(stream[alloc_idx].alloc_kind(), show_all);
                    sink.push(Diagnostic::new(
                        severity,
                        id,
                        loc(tokens, stream[alloc_idx].origin),
                        format!("{what}: '{name}' allocated on every loop iteration is never freed"),
                    ));
                    fired[alloc_idx] = true;
                }
            }
        }
    }

    // Rule 2: alloc followed, before any compensating dealloc, by a
    // conditional early exit (`if` then break/continue/return).
    for i in 0..stream.len() {
        if !stream[i].is_alloc() || fired[i] {
            continue;
        }
        any_alloc = true;
        any_alloc_kind = any_alloc_kind.or_else(|| stream[i].alloc_kind());
        let mut j = i + 1;
        while j < stream.len() {
            match stream[j].kind {
                ReducedKind::Dealloc(_) => break,
                ReducedKind::CloseBrace if j == stream.len() - 1 => break,
                _ if is_if_header(&stream[j].kind) => {
                    if let Some(next) = stream.get(j + 1) {
                        if matches!(next.kind, ReducedKind::Break | ReducedKind::Continue | ReducedKind::Return | ReducedKind::ReturnUse) {
                            let (id, severity, what) = leak_verdict(stream[i].alloc_kind(), show_all);
                            sink.push(Diagnostic::new(
                                severity,
                                id,
                                loc(tokens, stream[i].origin),
                                format!("{what}: '{name}' may be lost on an early exit path"),
                            ));
                            fired[i] = true;
                            break;
                        }
                    }
                }
                _ => {}
            }
            j += 1;
        }
    }

    // Rule 3: alloc overwritten by another alloc/assign/return before use or release.
    for i in 0..stream.len() {
        if !stream[i].is_alloc() || fired[i] {
            continue;
        }
        let mut j = i + 1;
        while j < stream.len() {
            match &stream[j].kind {
                ReducedKind::Dealloc(_) | ReducedKind::Use | ReducedKind::UseIndexed | ReducedKind::ReturnUse => break,
                ReducedKind::Alloc(_) | ReducedKind::Assign | ReducedKind::Return => {
                    let (id, severity, what) = leak_verdict(stream[i].alloc_kind(), show_all);
                    sink.push(Diagnostic::new(
                        severity,
                        id,
                        loc(tokens, stream[i].origin),
                        format!("{what}: '{name}' is overwritten before being freed"),
                    ));
                    fired[i] = true;
                    break;
                }
                _ => {}
            }
            j += 1;
        }
        if fired[i] {
            continue;
        }
    }

    // Rule 4 & 7: consecutive deallocs (double-free), and kind mismatch
    // against the nearest preceding alloc.
    let mut last_alloc_kind = None;
    for i in 0..stream.len() {
        if stream[i].is_alloc() {
            last_alloc_kind = stream[i].alloc_kind();
            any_release_or_use = true;
            continue;
        }
        if let ReducedKind::Dealloc(dealloc_kind) = stream[i].kind {
            any_release_or_use = true;
            if let Some(next) = stream.get(i + 1) {
                if next.is_dealloc() {
                    sink.push(Diagnostic::new(
                        Severity::Error,
                        DiagnosticId::DeallocDealloc,
                        loc(tokens, next.origin),
                        format!("'{name}' is deallocated twice"),
                    ));
                    fired[i + 1] = true;
                    continue;
                }
            }
            if let Some(alloc_kind) = last_alloc_kind {
                if !alloc_kind.matches_dealloc(dealloc_kind) {
                    sink.push(Diagnostic::new(
                        Severity::Error,
                        DiagnosticId::MismatchAllocDealloc,
                        loc(tokens, stream[i].origin),
                        format!("'{name}' allocated with one kind of allocator and released with a mismatched deallocator"),
                    ));
                }
            }
        }
        if matches!(stream[i].kind, ReducedKind::Use | ReducedKind::UseIndexed | ReducedKind::ReturnUse) {
            any_release_or_use = true;
        }
    }

    // Rule 6: dealloc immediately followed by an indexed use — use-after-free.
    for i in 0..stream.len().saturating_sub(1) {
        if stream[i].is_dealloc() && matches!(stream[i + 1].kind, ReducedKind::UseIndexed) {
            sink.push(Diagnostic::new(
                Severity::Error,
                DiagnosticId::DeallocUse,
                loc(tokens, stream[i + 1].origin),
                format!("'{name}' is used after being freed"),
            ));
        }
    }

    // Rule 5: no dealloc, no use, no return-use anywhere — leaked at scope exit.
    if any_alloc && !any_release_or_use {
        if let Some(last) = stream.iter().rev().find(|s| matches!(s.kind, ReducedKind::CloseBrace)) {
            let (id, severity, what) = leak_verdict(any_alloc_kind, show_all);
            sink.push(Diagnostic::new(severity, id, loc(tokens, last.origin), format!("{what}: '{name}' is never freed")));
        }
    }
}

fn is_if_header(kind: &ReducedKind) -> bool {
    matches!(kind, ReducedKind::If | ReducedKind::IfVar | ReducedKind::IfNotVar | ReducedKind::IfValueDependent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn run_with(src: &str, show_all: bool) -> DiagnosticSink {
        let mut tz = Tokenizer::new(src, 0, 8).unwrap();
        crate::simplifier::simplify(&mut tz);
        let body_open = tz.tokens().iter().find(|&id| tz.tokens().get(id).unwrap().str_is("{")).unwrap();
        let body_close = tz.tokens().link(body_open).unwrap();
        let mut sink = DiagnosticSink::new();
        check_function(&tz, body_open, body_close, &mut sink, show_all);
        sink
    }

    fn run(src: &str) -> DiagnosticSink {
        run_with(src, false)
    }

    #[test]
    fn leak_baseline_scenario() {
        let sink = run("void f(){ char *p = malloc(10); }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::MemLeak));
    }

    #[test]
    fn mismatched_pair_scenario() {
        let sink = run("void f(){ int *p = new int; free(p); }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::MismatchAllocDealloc));
    }

    #[test]
    fn matched_pair_is_clean() {
        let sink = run("void f(){ char *p = malloc(10); free(p); }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::MemLeak));
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::MismatchAllocDealloc));
    }

    #[test]
    fn double_free_is_detected() {
        let sink = run("void f(){ char *p = malloc(10); free(p); free(p); }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::DeallocDealloc));
    }

    #[test]
    fn resource_handle_leak_is_reported_as_resource_leak() {
        let sink = run("void f(){ FILE *fp = fopen(\"x\", \"r\"); }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::ResourceLeak));
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::MemLeak));
    }

    #[test]
    fn show_all_downgrades_memleak_to_memleakall() {
        let sink = run_with("void f(){ char *p = malloc(10); }", true);
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::MemLeakAll));
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::MemLeak));
        assert_eq!(
            sink.records().iter().find(|d| d.id == DiagnosticId::MemLeakAll).unwrap().severity,
            crate::diagnostics::Severity::PossibleError
        );
    }
}
