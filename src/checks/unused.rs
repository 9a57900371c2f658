//! Unused variable / struct member check (`spec.md` §4.8): "over one
//! function or one struct, flag declared names never read or never written."

use std::collections::HashMap;

use crate::diagnostics::{Diagnostic, DiagnosticId, DiagnosticSink, Location, Severity};
use crate::token::{TokenId, TokenList, VarId};
use crate::tokenizer::Tokenizer;

pub fn check(tz: &Tokenizer, sink: &mut DiagnosticSink) {
    let tokens = tz.tokens();
    check_unused_locals(tokens, sink);
    check_unused_struct_members(tokens, sink);
}

#[derive(Default, Clone, Copy)]
struct Usage {
    reads: u32,
    writes: u32,
    decl_line: usize,
    decl_file: usize,
}

/// Walks each function body, tracking every locally-declared variable's
/// read/write counts after its declaration. Parameters are out of scope —
/// only names declared with a visible `;`-terminated declaration inside a
/// function body are flagged.
fn check_unused_locals(tokens: &TokenList, sink: &mut DiagnosticSink) {
    for (body_open, body_close) in tz_functions(tokens) {
        let mut usages: HashMap<VarId, Usage> = HashMap::new();
        let mut cur = tokens.next(body_open);
        while let Some(id) = cur {
            if id == body_close {
                break;
            }
            let tok = tokens.get(id).unwrap();
            if tok.var_id.is_some() {
                let is_decl = !usages.contains_key(&tok.var_id)
                    && tokens.prev(id).is_some_and(|p| {
                        tokens.get(p).is_some_and(|t| t.is_standard_type || (t.is_name && t.var_id == VarId::NONE))
                    });
                if is_decl {
                    usages.insert(
                        tok.var_id,
                        Usage { reads: 0, writes: 0, decl_line: tok.line, decl_file: tok.file_index },
                    );
                } else if let Some(entry) = usages.get_mut(&tok.var_id) {
                    // Only variables declared inside this body are tracked —
                    // a parameter's occurrences never hit the `is_decl`
                    // branch, so it never gets an entry and is ignored here.
                    classify_occurrence(tokens, id, entry);
                }
            }
            cur = tokens.next(id);
        }
        for (_, usage) in usages {
            let message = match (usage.reads, usage.writes) {
                (0, 0) => Some("variable is declared but never used"),
                (0, _) => Some("variable is assigned but its value is never used"),
                (_, 0) => Some("variable is used but never assigned a value"),
                _ => None,
            };
            if let Some(message) = message {
                sink.push(Diagnostic::new(
                    Severity::PossibleStyle,
                    DiagnosticId::UnusedVariable,
                    Location::new(usage.decl_file, usage.decl_line),
                    message.to_string(),
                ));
            }
        }
    }
}

fn classify_occurrence(tokens: &TokenList, id: TokenId, usage: &mut Usage) {
    let next = tokens.next(id).and_then(|n| tokens.get(n));
    let prev = tokens.prev(id).and_then(|p| tokens.get(p));
    let is_write = next.is_some_and(|t| t.is_one_of(&["=", "+=", "-=", "*=", "/=", "++", "--"]))
        || prev.is_some_and(|t| t.is_one_of(&["++", "--"]));
    let is_compound_write = next.is_some_and(|t| t.str_is("="))
        && !next_next_is_eq(tokens, id);
    if is_write || is_compound_write {
        usage.writes += 1;
        // `a += b`/`a = a + 1` also reads the prior value, but that's an
        // implementation detail this scan doesn't try to untangle — a plain
        // `=` after an unread declaration is the common "written, never
        // used" shape this check targets.
    } else {
        usage.reads += 1;
    }
}

fn next_next_is_eq(tokens: &TokenList, id: TokenId) -> bool {
    tokens
        .next(id)
        .and_then(|n| tokens.next(n))
        .and_then(|n2| tokens.get(n2))
        .is_some_and(|t| t.str_is("="))
}

/// Every `{ … }` immediately preceded by a `)` that closes a parameter list
/// — a function definition's body, as `(body_open, body_close)`. Shared with
/// `crate::checks::style`'s variable-scope check.
pub(super) fn tz_functions(tokens: &TokenList) -> Vec<(TokenId, TokenId)> {
    let mut out = Vec::new();
    for id in tokens.iter() {
        let tok = tokens.get(id).unwrap();
        if !tok.str_is("{") {
            continue;
        }
        if tokens.prev(id).is_some_and(|p| tokens.get(p).is_some_and(|t| t.str_is(")"))) {
            if let Some(close) = tokens.link(id) {
                out.push((id, close));
            }
        }
    }
    out
}

/// Plain-aggregate `struct Name { … } ;` with no methods (a method-bearing
/// type is `class`-checked instead — `crate::checks::class`).
fn check_unused_struct_members(tokens: &TokenList, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    let mut i = 0;
    while i < ids.len() {
        let id = ids[i];
        let tok = tokens.get(id).unwrap();
        if tok.str_is("struct") {
            if let Some((name, open, close, members)) = parse_plain_struct(tokens, &ids, i) {
                for (member_name, member_var) in &members {
                    if !referenced_outside(tokens, &ids, open, close, *member_var) {
                        sink.push(Diagnostic::new(
                            Severity::PossibleStyle,
                            DiagnosticId::UnusedStructMember,
                            Location::new(tok.file_index, tok.line),
                            format!("struct member '{name}::{member_name}' is never used"),
                        ));
                    }
                }
                i = ids.iter().position(|&x| x == close).unwrap_or(i) + 1;
                continue;
            }
        }
        i += 1;
    }
}

fn parse_plain_struct(
    tokens: &TokenList,
    ids: &[TokenId],
    start: usize,
) -> Option<(String, TokenId, TokenId, Vec<(String, VarId)>)> {
    let name_tok = tokens.get(*ids.get(start + 1)?)?;
    if !name_tok.is_name {
        return None;
    }
    let open = *ids.get(start + 2)?;
    if !tokens.get(open).is_some_and(|t| t.str_is("{")) {
        return None;
    }
    let close = tokens.link(open)?;
    let open_pos = ids.iter().position(|&x| x == open)?;
    let close_pos = ids.iter().position(|&x| x == close)?;
    let mut members = Vec::new();
    let mut depth = 0i32;
    let mut k = open_pos + 1;
    while k < close_pos {
        let id = ids[k];
        let tok = tokens.get(id).unwrap();
        match tok.text.as_str() {
            "{" => {
                depth += 1;
                k += 1;
                continue;
            }
            "}" => {
                depth -= 1;
                k += 1;
                continue;
            }
            "(" => {
                // a method: this isn't a plain aggregate, bail entirely.
                return None;
            }
            _ => {}
        }
        if depth == 0 && tok.is_name && tok.var_id.is_some() {
            members.push((tok.text.clone(), tok.var_id));
        }
        k += 1;
    }
    Some((name_tok.text.clone(), open, close, members))
}

/// A member is "used" if its name token text appears anywhere outside the
/// struct's own declaration range preceded by `.` or `->` — this scan has no
/// type information, so it matches on name alone (best-effort, favors false
/// negatives per `spec.md` §7).
fn referenced_outside(tokens: &TokenList, ids: &[TokenId], open: TokenId, close: TokenId, member_var: VarId) -> bool {
    let open_pos = ids.iter().position(|&x| x == open).unwrap();
    let close_pos = ids.iter().position(|&x| x == close).unwrap();
    let name = {
        // caller already validated `member_var` belongs to this struct;
        // recover the name text from the declaration range.
        ids[open_pos + 1..close_pos]
            .iter()
            .find_map(|&id| {
                let t = tokens.get(id)?;
                (t.var_id == member_var).then(|| t.text.clone())
            })
    };
    let Some(name) = name else { return true };
    for (k, &id) in ids.iter().enumerate() {
        if k >= open_pos && k <= close_pos {
            continue;
        }
        let tok = tokens.get(id).unwrap();
        if tok.is_name && tok.text == name && k > 0 {
            let prev = tokens.get(ids[k - 1]).unwrap();
            if prev.is_one_of(&[".", "->"]) {
                return true;
            }
        }
    }
    false
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
    fn written_but_never_read_is_flagged() {
        let sink = run("void f(){ int x; x = 1; }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::UnusedVariable));
    }

    #[test]
    fn read_after_write_is_clean() {
        let sink = run("void f(){ int x; x = 1; g(x); }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::UnusedVariable));
    }

    #[test]
    fn declared_and_never_touched_is_flagged() {
        let sink = run("void f(){ int x; }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::UnusedVariable));
    }

    #[test]
    fn unreferenced_struct_member_is_flagged() {
        let sink = run("struct S { int a; int b; }; void f(struct S *s){ s->a = 1; }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::UnusedStructMember));
    }

    #[test]
    fn referenced_struct_member_is_clean() {
        let sink = run("struct S { int a; }; void f(struct S *s){ s->a = 1; }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::UnusedStructMember));
    }
}
