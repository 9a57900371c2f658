//! Buffer-overrun / array-out-of-bounds check (`spec.md` §4.8): for every
//! declared `T a[N]`, flags `a[k]` with a literal (or simple loop-bounded)
//! index `>= N`, and string operations (`strcpy`, `sprintf`, `strncat`)
//! whose literal argument provably overflows `N`.

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, DiagnosticId, Location, Severity};
use crate::token::{TokenId, TokenList, VarId};
use crate::tokenizer::Tokenizer;

use crate::diagnostics::DiagnosticSink;

struct ArrayDecl {
    extent: u32,
}

pub fn check(tz: &Tokenizer, sink: &mut DiagnosticSink) {
    let tokens = tz.tokens();
    check_malloc_size_mismatch(tz, tokens, sink);
    let arrays = find_array_decls(tokens);
    if arrays.is_empty() {
        return;
    }
    check_indexing(tokens, &arrays, sink);
    check_string_ops(tokens, &arrays, sink);
}

/// `%type% * name = malloc ( %num% ) ;` where the literal byte count isn't a
/// multiple of the pointee's size — almost always a `sizeof` typo (e.g.
/// `malloc(n)` instead of `malloc(n * sizeof(T))`). Grounded on
/// `original_source`'s `CheckMemoryLeak::mismatchSizeError`, whose `sz`
/// comes from the declaration's own type rather than any cast.
fn check_malloc_size_mismatch(tz: &Tokenizer, tokens: &TokenList, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    for w in ids.windows(7) {
        let ty_tok = tokens.get(w[0]).unwrap();
        if !ty_tok.is_standard_type {
            continue;
        }
        if !tokens.get(w[1]).is_some_and(|t| t.str_is("*")) {
            continue;
        }
        if !tokens.get(w[2]).is_some_and(|t| t.is_name) {
            continue;
        }
        if !tokens.get(w[3]).is_some_and(|t| t.str_is("=")) {
            continue;
        }
        if !tokens.get(w[4]).is_some_and(|t| t.str_is("malloc")) {
            continue;
        }
        if !tokens.get(w[5]).is_some_and(|t| t.str_is("(")) {
            continue;
        }
        let num_tok = tokens.get(w[6]).unwrap();
        if !num_tok.is_number {
            continue;
        }
        let Some(sz) = tz.size_of_type(&ty_tok.text) else { continue };
        if sz <= 1 {
            continue;
        }
        let Ok(n) = num_tok.text.parse::<u64>() else { continue };
        if n % u64::from(sz) != 0 {
            sink.push(Diagnostic::new(
                Severity::Error,
                DiagnosticId::MismatchSize,
                Location::new(num_tok.file_index, num_tok.line),
                format!("the given size {n} is mismatching with sizeof({}) = {sz}", ty_tok.text),
            ));
        }
    }
}

/// `T name [ N ] ;` — a declaration of a fixed-extent array whose element
/// count `N` is a literal. Keyed by the declared name's [`VarId`].
fn find_array_decls(tokens: &TokenList) -> HashMap<VarId, ArrayDecl> {
    let mut out = HashMap::new();
    let ids: Vec<TokenId> = tokens.iter().collect();
    for w in ids.windows(5) {
        let [_ty, name, lb, extent, rb] = *w else { continue };
        let name_tok = tokens.get(name).unwrap();
        if !name_tok.is_name || !name_tok.var_id.is_some() {
            continue;
        }
        if tokens.get(lb).map_or(true, |t| !t.str_is("[")) || tokens.get(rb).map_or(true, |t| !t.str_is("]")) {
            continue;
        }
        if tokens.link(lb) != Some(rb) {
            continue;
        }
        let Some(extent_tok) = tokens.get(extent) else { continue };
        if !extent_tok.is_number {
            continue;
        }
        let Ok(count) = extent_tok.text.parse::<u32>() else { continue };
        out.insert(name_tok.var_id, ArrayDecl { extent: count });
    }
    out
}

/// `name [ k ]` where `k` is a literal index, or a loop `for (i = 0; i < M; …)`
/// whose body indexes `name[i]` with `M` a literal exceeding the array's extent.
fn check_indexing(tokens: &TokenList, arrays: &HashMap<VarId, ArrayDecl>, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    for w in ids.windows(4) {
        let [name, lb, idx, rb] = *w else { continue };
        let name_tok = tokens.get(name).unwrap();
        let Some(decl) = arrays.get(&name_tok.var_id) else { continue };
        if tokens.get(lb).map_or(true, |t| !t.str_is("[")) || tokens.get(rb).map_or(true, |t| !t.str_is("]")) {
            continue;
        }
        // Skip the declaration itself (`T name[N];`): its preceding token is
        // a type-spec, not an operator/assignment/another name use.
        if tokens.prev(name).is_some_and(|p| tokens.get(p).is_some_and(|t| t.is_standard_type)) {
            continue;
        }
        let idx_tok = tokens.get(idx).unwrap();
        if let Some(k) = idx_tok.is_number.then(|| idx_tok.text.parse::<i64>().ok()).flatten() {
            if k < 0 || k as u32 >= decl.extent {
                sink.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticId::ArrayIndexOutOfBounds,
                    Location::new(name_tok.file_index, name_tok.line),
                    format!(
                        "array '{}[{}]' accessed at index {} (out of bounds)",
                        name_tok.text, decl.extent, k
                    ),
                ));
            }
        } else if let Some(bound) = loop_literal_upper_bound(tokens, &ids, name, idx_tok.var_id) {
            if bound > decl.extent {
                sink.push(Diagnostic::new(
                    Severity::Error,
                    DiagnosticId::ArrayIndexOutOfBounds,
                    Location::new(name_tok.file_index, name_tok.line),
                    format!(
                        "array '{}[{}]' indexed by a loop variable bounded by literal {} (out of bounds)",
                        name_tok.text, decl.extent, bound
                    ),
                ));
            }
        }
    }
}

/// Conservative: looks for the nearest preceding `for ( … ; %varid% < %num% ; … )`
/// whose loop-variable id matches `idx_var`, and returns the literal bound.
fn loop_literal_upper_bound(tokens: &TokenList, ids: &[TokenId], before: TokenId, idx_var: VarId) -> Option<u32> {
    if !idx_var.is_some() {
        return None;
    }
    let pos = ids.iter().position(|&id| id == before)?;
    for &id in ids[..pos].iter().rev() {
        if tokens.get(id).is_some_and(|t| t.str_is("for")) {
            let open = tokens.next(id)?;
            let close = tokens.link(open)?;
            let mut cur = Some(open);
            while let Some(c) = cur {
                if c == close {
                    break;
                }
                let tok = tokens.get(c)?;
                if tok.var_id == idx_var {
                    let op = tokens.next(c).and_then(|n| tokens.get(n));
                    if op.is_some_and(|t| t.str_is("<") || t.str_is("<=")) {
                        let bound_id = tokens.next(tokens.next(c)?)?;
                        let bound_tok = tokens.get(bound_id)?;
                        if bound_tok.is_number {
                            let n: u32 = bound_tok.text.parse().ok()?;
                            return Some(if op.unwrap().str_is("<=") { n + 1 } else { n });
                        }
                    }
                }
                cur = tokens.next(c);
            }
            return None;
        }
    }
    None
}

/// `strcpy(name, "literal")`, `strncat(name, "literal", n)`: flags an
/// overflow provable from the literal operand alone (`spec.md` §4.8).
fn check_string_ops(tokens: &TokenList, arrays: &HashMap<VarId, ArrayDecl>, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    for (i, &call) in ids.iter().enumerate() {
        let tok = tokens.get(call).unwrap();
        if !tok.is_name {
            continue;
        }
        let is_strcpy = tok.str_is("strcpy");
        let is_strncat = tok.str_is("strncat");
        let is_sprintf = tok.str_is("sprintf");
        if !is_strcpy && !is_strncat && !is_sprintf {
            continue;
        }
        let Some(&open) = ids.get(i + 1) else { continue };
        if tokens.get(open).map_or(true, |t| !t.str_is("(")) {
            continue;
        }
        let Some(close) = tokens.link(open) else { continue };
        let args = call_args(tokens, open, close);
        let Some(&dest) = args.first().and_then(|a| a.first()) else { continue };
        let dest_tok = tokens.get(dest).unwrap();
        let Some(decl) = arrays.get(&dest_tok.var_id) else { continue };

        if is_strcpy {
            if let Some(&lit) = args.get(1).and_then(|a| a.first()) {
                if let Some(needed) = string_literal_byte_len(tokens, lit) {
                    if needed > decl.extent {
                        sink.push(Diagnostic::new(
                            Severity::Error,
                            DiagnosticId::BufferOverrun,
                            Location::new(tok.file_index, tok.line),
                            format!("strcpy into '{}[{}]' writes {} bytes", dest_tok.text, decl.extent, needed),
                        ));
                    }
                }
            }
        } else if is_sprintf {
            if let Some(&fmt) = args.get(1).and_then(|a| a.first()) {
                if let Some(needed) = string_literal_byte_len(tokens, fmt) {
                    if needed > decl.extent {
                        sink.push(Diagnostic::new(
                            Severity::Error,
                            DiagnosticId::BufferOverrun,
                            Location::new(tok.file_index, tok.line),
                            format!("sprintf into '{}[{}]' writes at least {} bytes", dest_tok.text, decl.extent, needed),
                        ));
                    }
                }
            }
        } else if is_strncat {
            if let Some(&n_tok) = args.get(2).and_then(|a| a.first()) {
                let n = tokens.get(n_tok).filter(|t| t.is_number).and_then(|t| t.text.parse::<u32>().ok());
                if let Some(n) = n {
                    if n >= decl.extent {
                        sink.push(Diagnostic::new(
                            Severity::PossibleStyle,
                            DiagnosticId::StrncatUsage,
                            Location::new(tok.file_index, tok.line),
                            format!(
                                "strncat's size argument ({n}) is not less than the destination's full extent ({}); likely meant the remaining space",
                                decl.extent
                            ),
                        ));
                    }
                }
            }
        }
    }
}

/// Splits a call's argument list `( a , b , c )` into one token run per
/// top-level comma-separated argument.
pub(super) fn call_args(tokens: &TokenList, open: TokenId, close: TokenId) -> Vec<Vec<TokenId>> {
    let mut args: Vec<Vec<TokenId>> = vec![Vec::new()];
    let mut depth = 0i32;
    let mut cur = tokens.next(open);
    while let Some(id) = cur {
        if id == close {
            break;
        }
        let t = tokens.get(id).unwrap();
        match t.text.as_str() {
            "(" | "[" => {
                depth += 1;
                args.last_mut().unwrap().push(id);
            }
            ")" | "]" => {
                depth -= 1;
                args.last_mut().unwrap().push(id);
            }
            "," if depth == 0 => args.push(Vec::new()),
            _ => args.last_mut().unwrap().push(id),
        }
        cur = tokens.next(id);
    }
    args
}

/// Byte length a string literal token needs once copied including its NUL
/// terminator, or `None` if `id` isn't a plain (no-escape) string literal.
fn string_literal_byte_len(tokens: &TokenList, id: TokenId) -> Option<u32> {
    let tok = tokens.get(id)?;
    if !tok.is_string {
        return None;
    }
    let inner = tok.text.get(1..tok.text.len() - 1)?;
    Some(inner.chars().count() as u32 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simplifier;

    fn run(src: &str) -> DiagnosticSink {
        let mut tz = Tokenizer::new(src, 0, 8).unwrap();
        simplifier::simplify(&mut tz);
        let mut sink = DiagnosticSink::new();
        check(&tz, &mut sink);
        sink
    }

    #[test]
    fn strcpy_overflow_is_detected() {
        let sink = run("void f(){ char s[3]; strcpy(s, \"abc\"); }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::BufferOverrun));
    }

    #[test]
    fn strcpy_within_bounds_is_clean() {
        let sink = run("void f(){ char s[4]; strcpy(s, \"abc\"); }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::BufferOverrun));
    }

    #[test]
    fn literal_index_out_of_bounds_is_detected() {
        let sink = run("void f(){ int a[4]; a[4] = 1; }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::ArrayIndexOutOfBounds));
    }

    #[test]
    fn literal_index_in_bounds_is_clean() {
        let sink = run("void f(){ int a[4]; a[3] = 1; }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::ArrayIndexOutOfBounds));
    }

    #[test]
    fn loop_bounded_overrun_is_detected() {
        let sink = run("void f(){ int a[4]; int i; for (i = 0; i < 5; i = i + 1) { a[i] = 0; } }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::ArrayIndexOutOfBounds));
    }

    #[test]
    fn malloc_size_not_a_multiple_of_sizeof_is_detected() {
        let sink = run("void f(){ int *p = malloc(10); free(p); }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::MismatchSize));
    }

    #[test]
    fn malloc_size_exact_multiple_of_sizeof_is_clean() {
        let sink = run("void f(){ int *p = malloc(8); free(p); }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::MismatchSize));
    }
}
