//! Style-category checks (`spec.md` §4.8/§7): C-style pointer casts,
//! redundant self-conditions, unreachable code after a terminating
//! statement, division by a literal zero, `char` used as an array index,
//! scope-could-be-reduced, a null pointer dereferenced after a literal-zero
//! assignment, and a handful of suspicious standard-library call shapes.

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostic, DiagnosticId, DiagnosticSink, Location, Severity};
use crate::token::{TokenId, TokenList, VarId};
use crate::tokenizer::Tokenizer;

pub fn check(tz: &Tokenizer, sink: &mut DiagnosticSink) {
    let tokens = tz.tokens();
    check_c_style_cast(tokens, sink);
    check_redundant_condition(tokens, sink);
    check_unreachable_code(tokens, sink);
    check_zero_division(tokens, sink);
    check_char_as_index(tokens, sink);
    check_null_pointer(tokens, sink);
    check_invalid_function_usage(tokens, sink);
    check_variable_scope(tokens, sink);
}

/// A variable declared directly in a function's top-level block, but used
/// only inside one nested block, could have its declaration moved into that
/// block (`spec.md` §7's possible-style "scope can be reduced").
fn check_variable_scope(tokens: &TokenList, sink: &mut DiagnosticSink) {
    for (body_open, body_close) in super::unused::tz_functions(tokens) {
        scope_check_function(tokens, body_open, body_close, sink);
    }
}

fn scope_check_function(tokens: &TokenList, body_open: TokenId, body_close: TokenId, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter_from(body_open).skip(1).take_while(|&id| id != body_close).collect();

    let mut declared: HashMap<VarId, usize> = HashMap::new();
    let mut depth = 0i32;
    for (k, &id) in ids.iter().enumerate() {
        let tok = tokens.get(id).unwrap();
        match tok.text.as_str() {
            "{" => depth += 1,
            "}" => depth -= 1,
            _ => {}
        }
        if depth == 0
            && tok.var_id.is_some()
            && !declared.contains_key(&tok.var_id)
            && k > 0
            && tokens.get(ids[k - 1]).is_some_and(|t| t.is_standard_type)
        {
            declared.insert(tok.var_id, k);
        }
    }
    if declared.is_empty() {
        return;
    }

    // For each candidate, track every later occurrence's immediate depth-1
    // ancestor block. A sole ancestor (and at least one occurrence) means
    // every use lives inside one nested block, away from the declaration.
    let mut depth = 0i32;
    let mut stack: Vec<TokenId> = Vec::new();
    let mut ancestor_of: HashMap<VarId, Option<TokenId>> = HashMap::new();
    let mut used_at_top: HashSet<VarId> = HashSet::new();

    for (k, &id) in ids.iter().enumerate() {
        let tok = tokens.get(id).unwrap();
        match tok.text.as_str() {
            "{" => {
                depth += 1;
                if depth == 1 {
                    stack.push(id);
                }
                continue;
            }
            "}" => {
                if depth == 1 {
                    stack.pop();
                }
                depth -= 1;
                continue;
            }
            _ => {}
        }
        let Some(&decl_k) = declared.get(&tok.var_id) else { continue };
        if k == decl_k {
            continue;
        }
        if depth == 0 {
            used_at_top.insert(tok.var_id);
            continue;
        }
        let ancestor = stack.first().copied();
        ancestor_of
            .entry(tok.var_id)
            .and_modify(|seen| {
                if *seen != ancestor {
                    *seen = None;
                }
            })
            .or_insert(ancestor);
    }

    for (&var, &decl_k) in &declared {
        if used_at_top.contains(&var) {
            continue;
        }
        let Some(Some(_block)) = ancestor_of.get(&var) else { continue };
        let tok = tokens.get(ids[decl_k]).unwrap();
        sink.push(Diagnostic::new(
            Severity::PossibleStyle,
            DiagnosticId::VarScope,
            Location::new(tok.file_index, tok.line),
            format!("the scope of variable '{}' can be reduced", tok.text),
        ));
    }
}

/// `( Name * ) expr` where `Name` is a plain identifier, not one of the
/// recognized standard types — a C-style cast to a class pointer.
fn check_c_style_cast(tokens: &TokenList, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    for w in ids.windows(4) {
        let [open, name, star, close] = *w else { continue };
        let Some(open_tok) = tokens.get(open) else { continue };
        if !open_tok.str_is("(") {
            continue;
        }
        let Some(name_tok) = tokens.get(name) else { continue };
        if !name_tok.is_name || name_tok.is_standard_type || name_tok.var_id.is_some() {
            continue;
        }
        if tokens.get(star).map_or(true, |t| !t.str_is("*")) || tokens.get(close).map_or(true, |t| !t.str_is(")")) {
            continue;
        }
        // A cast, not a declaration `(Name * p)`: the next token after `)`
        // is an expression start, not itself `)` or `;` or another name that
        // would make this look like a parameter.
        sink.push(Diagnostic::new(
            Severity::Style,
            DiagnosticId::CStylePointerCast,
            Location::new(name_tok.file_index, name_tok.line),
            format!("C-style pointer cast to '{}*'", name_tok.text),
        ));
    }
}

/// `%varid% && %varid%` / `%varid% || %varid%` / `%varid% == %varid%` with
/// both sides the same variable — always true/false/redundant.
fn check_redundant_condition(tokens: &TokenList, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    for w in ids.windows(3) {
        let [lhs, op, rhs] = *w else { continue };
        let Some(lhs_tok) = tokens.get(lhs) else { continue };
        let Some(op_tok) = tokens.get(op) else { continue };
        let Some(rhs_tok) = tokens.get(rhs) else { continue };
        if !op_tok.is_one_of(&["&&", "||", "=="]) {
            continue;
        }
        if lhs_tok.var_id.is_some() && lhs_tok.var_id == rhs_tok.var_id {
            sink.push(Diagnostic::new(
                Severity::PossibleStyle,
                DiagnosticId::RedundantCondition,
                Location::new(lhs_tok.file_index, lhs_tok.line),
                format!("condition '{} {} {}' is always the same value", lhs_tok.text, op_tok.text, rhs_tok.text),
            ));
        }
    }
}

/// A statement immediately following `return`/`break`/`continue` (before the
/// enclosing `}`) at the same brace depth can never execute.
fn check_unreachable_code(tokens: &TokenList, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    let mut i = 0;
    while i < ids.len() {
        let id = ids[i];
        let tok = tokens.get(id).unwrap();
        if tok.is_one_of(&["return", "break", "continue"]) {
            // Skip to the terminating `;` of this statement.
            let mut j = i + 1;
            while j < ids.len() && !tokens.get(ids[j]).is_some_and(|t| t.str_is(";")) {
                j += 1;
            }
            if let Some(&next_id) = ids.get(j + 1) {
                let next_tok = tokens.get(next_id).unwrap();
                if !next_tok.is_one_of(&["}", "case", "default"]) {
                    sink.push(Diagnostic::new(
                        Severity::Style,
                        DiagnosticId::UnreachableCode,
                        Location::new(next_tok.file_index, next_tok.line),
                        "unreachable code after return/break/continue".to_string(),
                    ));
                }
            }
            i = j + 1;
            continue;
        }
        i += 1;
    }
}

/// `expr / 0` / `expr % 0` with a literal zero divisor.
fn check_zero_division(tokens: &TokenList, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    for w in ids.windows(2) {
        let [op, rhs] = *w else { continue };
        let Some(op_tok) = tokens.get(op) else { continue };
        if !op_tok.is_one_of(&["/", "%"]) {
            continue;
        }
        let Some(rhs_tok) = tokens.get(rhs) else { continue };
        if rhs_tok.is_number && rhs_tok.text == "0" {
            sink.push(Diagnostic::new(
                Severity::Error,
                DiagnosticId::ZeroDivision,
                Location::new(op_tok.file_index, op_tok.line),
                "division by zero".to_string(),
            ));
        }
    }
}

/// `arr [ c ]` where `c` was declared `char` — signed-char indices go
/// negative on some platforms, and a plain `char` loop variable indexing an
/// array is usually a latent bug.
fn check_char_as_index(tokens: &TokenList, sink: &mut DiagnosticSink) {
    let char_vars = char_declared_vars(tokens);
    if char_vars.is_empty() {
        return;
    }
    let ids: Vec<TokenId> = tokens.iter().collect();
    for w in ids.windows(3) {
        let [lb, idx, rb] = *w else { continue };
        if tokens.get(lb).map_or(true, |t| !t.str_is("[")) || tokens.get(rb).map_or(true, |t| !t.str_is("]")) {
            continue;
        }
        let Some(idx_tok) = tokens.get(idx) else { continue };
        if char_vars.contains(&idx_tok.var_id) {
            sink.push(Diagnostic::new(
                Severity::PossibleStyle,
                DiagnosticId::CharVariableAsIndex,
                Location::new(idx_tok.file_index, idx_tok.line),
                format!("'{}' is a char variable used as an array index", idx_tok.text),
            ));
        }
    }
}

fn char_declared_vars(tokens: &TokenList) -> HashMap<VarId, ()> {
    let mut out = HashMap::new();
    let ids: Vec<TokenId> = tokens.iter().collect();
    for w in ids.windows(2) {
        let [ty, name] = *w else { continue };
        let Some(ty_tok) = tokens.get(ty) else { continue };
        if !ty_tok.str_is("char") {
            continue;
        }
        let Some(name_tok) = tokens.get(name) else { continue };
        if name_tok.var_id.is_some() {
            out.insert(name_tok.var_id, ());
        }
    }
    out
}

/// `p = 0;` (or `NULL`) followed, with no intervening reassignment, by
/// `*p` or `p ->` — a dereference of a pointer proven null.
fn check_null_pointer(tokens: &TokenList, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    for (i, &assign_name) in ids.iter().enumerate() {
        let Some(name_tok) = tokens.get(assign_name) else { continue };
        if !name_tok.var_id.is_some() {
            continue;
        }
        let Some(&eq) = ids.get(i + 1) else { continue };
        if tokens.get(eq).map_or(true, |t| !t.str_is("=")) {
            continue;
        }
        let Some(&rhs) = ids.get(i + 2) else { continue };
        let Some(rhs_tok) = tokens.get(rhs) else { continue };
        let is_null_literal = (rhs_tok.is_number && rhs_tok.text == "0") || rhs_tok.str_is("NULL");
        if !is_null_literal {
            continue;
        }
        let var_id = name_tok.var_id;
        for &cand in &ids[i + 3..] {
            let Some(cand_tok) = tokens.get(cand) else { continue };
            if cand_tok.var_id == var_id {
                let reassigned = tokens
                    .next(cand)
                    .and_then(|n| tokens.get(n))
                    .is_some_and(|t| t.str_is("="));
                if reassigned {
                    break;
                }
                let dereferenced = tokens.prev(cand).and_then(|p| tokens.get(p)).is_some_and(|t| t.str_is("*"))
                    || tokens
                        .next(cand)
                        .and_then(|n| tokens.get(n))
                        .is_some_and(|t| t.str_is("->"));
                if dereferenced {
                    sink.push(Diagnostic::new(
                        Severity::Error,
                        DiagnosticId::NullPointer,
                        Location::new(cand_tok.file_index, cand_tok.line),
                        format!("'{}' is dereferenced but was assigned a null pointer", cand_tok.text),
                    ));
                    break;
                }
            }
        }
    }
}

/// `memset ( dest , size , 0 )` — the value and length arguments are
/// swapped from the standard `memset(dest, value, size)` when the third
/// argument is a literal `0` and the second is not.
fn check_invalid_function_usage(tokens: &TokenList, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter().collect();
    for (i, &call) in ids.iter().enumerate() {
        let Some(tok) = tokens.get(call) else { continue };
        if !tok.str_is("memset") {
            continue;
        }
        let Some(&open) = ids.get(i + 1) else { continue };
        if tokens.get(open).map_or(true, |t| !t.str_is("(")) {
            continue;
        }
        let Some(close) = tokens.link(open) else { continue };
        let args = super::bufferoverrun::call_args(tokens, open, close);
        if args.len() != 3 {
            continue;
        }
        let Some(&third) = args[2].first() else { continue };
        let Some(third_tok) = tokens.get(third) else { continue };
        let Some(&second) = args[1].first() else { continue };
        let Some(second_tok) = tokens.get(second) else { continue };
        if third_tok.is_number && third_tok.text == "0" && !(second_tok.is_number && second_tok.text == "0") {
            sink.push(Diagnostic::new(
                Severity::PossibleStyle,
                DiagnosticId::InvalidFunctionUsage,
                Location::new(tok.file_index, tok.line),
                "memset's value and length arguments look swapped".to_string(),
            ));
        }
    }
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
    fn c_style_cast_is_flagged() {
        let sink = run("void f(void *p){ Foo *g = (Foo *) p; }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::CStylePointerCast));
    }

    #[test]
    fn self_and_condition_is_flagged() {
        let sink = run("void f(int a){ if (a && a) {} }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::RedundantCondition));
    }

    #[test]
    fn code_after_return_is_flagged() {
        let sink = run("void f(){ return; g(); }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::UnreachableCode));
    }

    #[test]
    fn code_at_block_end_after_return_is_clean() {
        let sink = run("void f(){ if (1) { return; } g(); }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::UnreachableCode));
    }

    #[test]
    fn literal_zero_division_is_flagged() {
        let sink = run("void f(int a){ int b; b = a / 0; }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::ZeroDivision));
    }

    #[test]
    fn char_variable_as_index_is_flagged() {
        let sink = run("void f(int *a){ char c; a[c] = 1; }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::CharVariableAsIndex));
    }

    #[test]
    fn null_assignment_then_deref_is_flagged() {
        let sink = run("void f(){ int *p; p = 0; *p = 1; }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::NullPointer));
    }

    #[test]
    fn null_assignment_then_reassignment_is_clean() {
        let sink = run("void f(int *q){ int *p; p = 0; p = q; *p = 1; }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::NullPointer));
    }

    #[test]
    fn swapped_memset_args_is_flagged() {
        let sink = run("void f(char *buf, int n){ memset(buf, n, 0); }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::InvalidFunctionUsage));
    }

    #[test]
    fn variable_used_only_in_nested_block_is_flagged() {
        let sink = run("void f(int cond){ int x; if (cond) { x = 1; g(x); } }");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::VarScope));
    }

    #[test]
    fn variable_used_at_top_level_is_not_flagged() {
        let sink = run("void f(int cond){ int x; x = 1; if (cond) { g(x); } }");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::VarScope));
    }
}
