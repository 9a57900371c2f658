//! Variable-flow lowering (`spec.md` §4.5): walks a function body's tokens
//! and produces a reduced-statement stream threaded through one focus
//! variable at a time.

use crate::builtins::{self, FunctionRole};
use crate::flow::reduced::{AllocKind, ReducedKind, ReducedStmt};
use crate::flow::reducer;
use crate::token::{TokenId, TokenList, VarId};
use crate::tokenizer::Tokenizer;

/// Recursion bound for descending into callees (`spec.md` §9 "bound
/// recursion depth, e.g. 32").
const MAX_CALL_DEPTH: usize = 32;

/// Returns every distinct nonzero [`VarId`] declared or used in
/// `[start, end]`, in first-seen order — the set of focus variables a
/// caller should lower and check individually.
#[must_use]
pub fn focus_variables(tokens: &TokenList, start: TokenId, end: TokenId) -> Vec<VarId> {
    let mut seen = Vec::new();
    let mut cur = Some(start);
    while let Some(id) = cur {
        if let Some(tok) = tokens.get(id) {
            if tok.var_id.is_some() && !seen.contains(&tok.var_id) {
                seen.push(tok.var_id);
            }
        }
        if id == end {
            break;
        }
        cur = tokens.next(id);
    }
    seen
}

pub struct Lowerer<'a> {
    tz: &'a Tokenizer,
    call_stack: Vec<String>,
}

impl<'a> Lowerer<'a> {
    #[must_use]
    pub fn new(tz: &'a Tokenizer) -> Self {
        Self { tz, call_stack: Vec::new() }
    }

    /// Lowers the body `[body_open, body_close]` (a `{ ... }` pair) for
    /// `focus`, returning its reduced statement stream.
    #[must_use]
    pub fn lower(&mut self, body_open: TokenId, body_close: TokenId, focus: VarId) -> Vec<ReducedStmt> {
        let tokens = self.tz.tokens();
        let mut out = Vec::new();
        let mut cur = Some(body_open);
        while let Some(id) = cur {
            cur = self.lower_one(tokens, id, body_close, focus, &mut out);
        }
        out
    }

    /// Emits zero or more [`ReducedStmt`]s for the construct starting at
    /// `id` and returns the position to resume scanning from.
    fn lower_one(
        &mut self,
        tokens: &TokenList,
        id: TokenId,
        body_close: TokenId,
        focus: VarId,
        out: &mut Vec<ReducedStmt>,
    ) -> Option<TokenId> {
        let tok = tokens.get(id)?;
        let text = tok.text.as_str();

        match text {
            "{" => {
                out.push(ReducedStmt::new(ReducedKind::OpenBrace, VarId::NONE, id));
                return tokens.next(id);
            }
            "}" => {
                out.push(ReducedStmt::new(ReducedKind::CloseBrace, VarId::NONE, id));
                if id == body_close {
                    return None;
                }
                return tokens.next(id);
            }
            "else" => {
                out.push(ReducedStmt::new(ReducedKind::Else, VarId::NONE, id));
                return tokens.next(id);
            }
            "do" => {
                out.push(ReducedStmt::new(ReducedKind::Do, VarId::NONE, id));
                return tokens.next(id);
            }
            "break" => {
                out.push(ReducedStmt::new(ReducedKind::Break, VarId::NONE, id));
                return tokens.next(id);
            }
            "continue" => {
                out.push(ReducedStmt::new(ReducedKind::Continue, VarId::NONE, id));
                return tokens.next(id);
            }
            "try" => {
                out.push(ReducedStmt::new(ReducedKind::Try, VarId::NONE, id));
                return tokens.next(id);
            }
            "catch" => {
                out.push(ReducedStmt::new(ReducedKind::Catch, VarId::NONE, id));
                return tokens.next(id);
            }
            "exit" => {
                out.push(ReducedStmt::new(ReducedKind::Exit, VarId::NONE, id));
                return skip_to_semicolon(tokens, id);
            }
            "throw" => {
                out.push(ReducedStmt::new(ReducedKind::Throw, VarId::NONE, id));
                return skip_to_semicolon(tokens, id);
            }
            "default" => {
                out.push(ReducedStmt::new(ReducedKind::Default, VarId::NONE, id));
                return tokens.next(id);
            }
            "case" => {
                out.push(ReducedStmt::new(ReducedKind::Case, VarId::NONE, id));
                return skip_to_colon(tokens, id);
            }
            "switch" => {
                out.push(ReducedStmt::new(ReducedKind::Switch, VarId::NONE, id));
                return skip_parenthesized(tokens, id);
            }
            "for" | "while" => {
                out.push(ReducedStmt::new(ReducedKind::Loop, VarId::NONE, id));
                return skip_parenthesized(tokens, id);
            }
            "if" => {
                return self.lower_if(tokens, id, focus, out);
            }
            "return" => {
                return self.lower_return(tokens, id, focus, out);
            }
            _ => {}
        }

        if tok.var_id == focus && focus.is_some() {
            return self.lower_focus_occurrence(tokens, id, body_close, focus, out);
        }

        Some(tokens.next(id).unwrap_or(id))
    }

    fn lower_if(
        &mut self,
        tokens: &TokenList,
        if_kw: TokenId,
        focus: VarId,
        out: &mut Vec<ReducedStmt>,
    ) -> Option<TokenId> {
        let open = tokens.next(if_kw)?;
        let close = tokens.link(open)?;
        let kind = classify_if_condition(tokens, open, close, focus);
        out.push(ReducedStmt::new(kind, if matches!(kind, ReducedKind::If) { VarId::NONE } else { focus }, if_kw));
        tokens.next(close)
    }

    fn lower_return(
        &mut self,
        tokens: &TokenList,
        ret_kw: TokenId,
        focus: VarId,
        out: &mut Vec<ReducedStmt>,
    ) -> Option<TokenId> {
        let next = tokens.next(ret_kw);
        let is_focus_return =
            focus.is_some() && next.is_some_and(|n| tokens.get(n).is_some_and(|t| t.var_id == focus));
        out.push(ReducedStmt::new(
            if is_focus_return { ReducedKind::ReturnUse } else { ReducedKind::Return },
            if is_focus_return { focus } else { VarId::NONE },
            ret_kw,
        ));
        skip_to_semicolon(tokens, ret_kw)
    }

    /// Handles a token position where the focus variable itself occurs:
    /// declaration, allocation/reallocation assignment, indexed use, plain
    /// use, or a deallocating call.
    fn lower_focus_occurrence(
        &mut self,
        tokens: &TokenList,
        id: TokenId,
        body_close: TokenId,
        focus: VarId,
        out: &mut Vec<ReducedStmt>,
    ) -> Option<TokenId> {
        if let Some(next) = tokens.next(id) {
            match tokens.get(next).map(|t| t.text.as_str()) {
                Some("=") => return self.lower_assignment(tokens, id, next, focus, out),
                Some("[") => {
                    out.push(ReducedStmt::new(ReducedKind::UseIndexed, focus, id));
                    let close = tokens.link(next)?;
                    return tokens.next(close);
                }
                Some(";") | Some(",") => {
                    // A bare declaration occurrence (`T var;`) vs. a
                    // standalone use; declarations are distinguished by
                    // walking back past `*`/`&`/`const` to a type-spec token.
                    if is_declaration_context(tokens, id) {
                        out.push(ReducedStmt::new(ReducedKind::Decl, focus, id));
                    } else {
                        out.push(ReducedStmt::new(ReducedKind::Use, focus, id));
                    }
                }
                _ => out.push(ReducedStmt::new(ReducedKind::Use, focus, id)),
            }
        }
        // Is this occurrence itself the argument to a deallocating call,
        // e.g. `free(var)` / `fclose(var)`, or the operand of `delete`?
        if let Some(prev) = tokens.prev(id) {
            let prev_tok = tokens.get(prev).unwrap();
            if prev_tok.str_is("delete") {
                out.pop(); // replace whatever we just pushed for this occurrence
                out.push(ReducedStmt::new(ReducedKind::Dealloc(AllocKind::HeapScalar), focus, prev));
            } else if prev_tok.str_is("]") {
                if let Some(open_bracket) = tokens.prev(prev) {
                    if tokens.get(open_bracket).is_some_and(|t| t.str_is("[")) {
                        if let Some(before_bracket) = tokens.prev(open_bracket) {
                            if tokens.get(before_bracket).is_some_and(|t| t.str_is("delete")) {
                                out.pop();
                                out.push(ReducedStmt::new(ReducedKind::Dealloc(AllocKind::HeapArray), focus, before_bracket));
                            }
                        }
                    }
                }
            } else if prev_tok.str_is("(") {
                if let Some(name_id) = tokens.prev(prev) {
                    if let Some(name_tok) = tokens.get(name_id) {
                        if name_tok.is_name && !name_tok.is_standard_type {
                            out.pop();
                            out.push(self.classify_call(tokens, &name_tok.text, focus, id));
                        }
                    }
                }
            }
        }
        Some(tokens.next(id).unwrap_or(id))
    }

    fn lower_assignment(
        &mut self,
        tokens: &TokenList,
        var_id: TokenId,
        eq: TokenId,
        focus: VarId,
        out: &mut Vec<ReducedStmt>,
    ) -> Option<TokenId> {
        let rhs = tokens.next(eq)?;
        let semi = skip_to_semicolon(tokens, eq)?;
        let stmt = if tokens.get(rhs).is_some_and(|t| t.str_is("new")) {
            classify_new_expression(tokens, rhs)
        } else if tokens.get(rhs).is_some_and(|t| t.is_name) {
            let name = tokens.get(rhs).unwrap().text.clone();
            if tokens.next(rhs).is_some_and(|n| tokens.get(n).is_some_and(|t| t.str_is("("))) {
                if name == "realloc" {
                    ReducedKind::Realloc(AllocKind::HeapLegacy)
                } else if let Some(FunctionRole::Allocates(kind)) = builtins::classify(&name) {
                    ReducedKind::Alloc(kind)
                } else {
                    ReducedKind::Assign
                }
            } else {
                ReducedKind::Assign
            }
        } else {
            ReducedKind::Assign
        };
        out.push(ReducedStmt::new(stmt, focus, var_id));
        tokens.next(semi)
    }

    /// Classifies a call `name(...)` where `var` is one of its arguments,
    /// returning the single spliced [`ReducedStmt`] for this occurrence.
    fn classify_call(&mut self, tokens: &TokenList, name: &str, var: VarId, origin: TokenId) -> ReducedStmt {
        match builtins::classify(name) {
            Some(FunctionRole::Deallocates(kind)) => ReducedStmt::new(ReducedKind::Dealloc(kind), var, origin),
            Some(FunctionRole::Neutral) => ReducedStmt::new(ReducedKind::Use, var, origin),
            Some(FunctionRole::Allocates(_)) => ReducedStmt::new(ReducedKind::Use, var, origin),
            None => {
                if builtins::is_known_recursive(name) || self.call_stack.contains(&name.to_string()) {
                    return ReducedStmt::new(ReducedKind::Use, var, origin);
                }
                match self.tz.find_function_token_by_name(name) {
                    Some(func_token) if self.call_stack.len() < MAX_CALL_DEPTH => {
                        self.lower_callee(func_token, var, origin)
                    }
                    _ => ReducedStmt::new(ReducedKind::Use, var, origin),
                }
            }
        }
    }

    /// Recursively lowers a callee for the parameter position matching
    /// `var`'s argument slot, reduces the result, and collapses it to a
    /// single qualitative outcome (`spec.md` §4.5).
    fn lower_callee(&mut self, func_token: TokenId, var: VarId, origin: TokenId) -> ReducedStmt {
        let tokens = self.tz.tokens();
        let name = tokens.get(func_token).map(|t| t.text.clone()).unwrap_or_default();
        let Some(open_paren) = tokens.next(func_token) else {
            return ReducedStmt::new(ReducedKind::Use, var, origin);
        };
        let Some(close_paren) = tokens.link(open_paren) else {
            return ReducedStmt::new(ReducedKind::Use, var, origin);
        };
        let Some(body_open) = tokens.next(close_paren) else {
            return ReducedStmt::new(ReducedKind::Use, var, origin);
        };
        if !tokens.get(body_open).is_some_and(|t| t.str_is("{")) {
            return ReducedStmt::new(ReducedKind::Use, var, origin);
        }
        let Some(body_close) = tokens.link(body_open) else {
            return ReducedStmt::new(ReducedKind::Use, var, origin);
        };
        // The first parameter carrying a declared var-ID is our focus
        // inside the callee (arity-aware matching is left to the tokenizer's
        // own parameter var-ID assignment).
        let Some(param_var) = first_param_var(tokens, open_paren, close_paren) else {
            return ReducedStmt::new(ReducedKind::Use, var, origin);
        };

        self.call_stack.push(name);
        let stream = self.lower(body_open, body_close, param_var);
        self.call_stack.pop();
        let reduced = reducer::reduce(stream);
        net_effect(&reduced, var, origin)
    }
}

/// Collapses a reduced callee stream into the single outcome the caller
/// splices at the call site: a release of the argument, a use of it, or (for
/// an argument passed by address that the callee stores) a conservative use.
fn net_effect(stream: &[ReducedStmt], var: VarId, origin: TokenId) -> ReducedStmt {
    if stream.iter().any(|s| s.is_dealloc()) {
        let kind = stream.iter().find_map(ReducedStmt::alloc_kind).unwrap_or(AllocKind::HeapScalar);
        return ReducedStmt::new(ReducedKind::Dealloc(kind), var, origin);
    }
    ReducedStmt::new(ReducedKind::Use, var, origin)
}

/// Finds the var-ID of the first parameter in `(...)` that has one assigned
/// (parameters always do, per the tokenizer's variable-ID pass).
fn first_param_var(tokens: &TokenList, open: TokenId, close: TokenId) -> Option<VarId> {
    let mut cur = tokens.next(open);
    while let Some(id) = cur {
        if id == close {
            break;
        }
        if let Some(tok) = tokens.get(id) {
            if tok.var_id.is_some() {
                return Some(tok.var_id);
            }
        }
        cur = tokens.next(id);
    }
    None
}

fn classify_new_expression(tokens: &TokenList, new_kw: TokenId) -> ReducedKind {
    let mut cur = tokens.next(new_kw);
    // Skip `(nothrow)` if present.
    if cur.is_some_and(|c| tokens.get(c).is_some_and(|t| t.str_is("("))) {
        let open = cur.unwrap();
        if let Some(close) = tokens.link(open) {
            cur = tokens.next(close);
        }
    }
    // Skip the type name.
    let Some(_type_tok) = cur else { return ReducedKind::Alloc(AllocKind::HeapScalar) };
    let after_type = tokens.next(cur.unwrap());
    if after_type.is_some_and(|a| tokens.get(a).is_some_and(|t| t.str_is("["))) {
        ReducedKind::Alloc(AllocKind::HeapArray)
    } else {
        ReducedKind::Alloc(AllocKind::HeapScalar)
    }
}

fn classify_if_condition(tokens: &TokenList, open: TokenId, close: TokenId, focus: VarId) -> ReducedKind {
    if !focus.is_some() {
        return ReducedKind::If;
    }
    let inner = tokens.next(open);
    if inner == Some(close) {
        return ReducedKind::If;
    }
    let inner = inner.unwrap();
    // `if (var)`
    if tokens.get(inner).is_some_and(|t| t.var_id == focus) && tokens.next(inner) == Some(close) {
        return ReducedKind::IfVar;
    }
    // `if (!var)`
    if tokens.get(inner).is_some_and(|t| t.str_is("!")) {
        if let Some(var_pos) = tokens.next(inner) {
            if tokens.get(var_pos).is_some_and(|t| t.var_id == focus) && tokens.next(var_pos) == Some(close) {
                return ReducedKind::IfNotVar;
            }
        }
    }
    // Does the condition mention the variable at all through some other shape?
    let mut cur = Some(inner);
    while let Some(id) = cur {
        if id == close {
            break;
        }
        if tokens.get(id).is_some_and(|t| t.var_id == focus) {
            return ReducedKind::IfValueDependent;
        }
        cur = tokens.next(id);
    }
    ReducedKind::If
}

fn is_declaration_context(tokens: &TokenList, var_id: TokenId) -> bool {
    let mut cur = tokens.prev(var_id);
    while let Some(id) = cur {
        let tok = tokens.get(id).unwrap();
        if tok.str_is("*") || tok.str_is("&") || tok.str_is("const") {
            cur = tokens.prev(id);
            continue;
        }
        return tok.is_standard_type;
    }
    false
}

fn skip_to_semicolon(tokens: &TokenList, from: TokenId) -> Option<TokenId> {
    let mut depth = 0i32;
    let mut cur = Some(from);
    while let Some(id) = cur {
        match tokens.get(id).map(|t| t.text.as_str()) {
            Some("(") | Some("[") => depth += 1,
            Some(")") | Some("]") => depth -= 1,
            Some(";") if depth == 0 => return tokens.next(id),
            _ => {}
        }
        cur = tokens.next(id);
    }
    None
}

fn skip_to_colon(tokens: &TokenList, from: TokenId) -> Option<TokenId> {
    let mut cur = Some(from);
    while let Some(id) = cur {
        if tokens.get(id).is_some_and(|t| t.str_is(":")) {
            return tokens.next(id);
        }
        cur = tokens.next(id);
    }
    None
}

fn skip_parenthesized(tokens: &TokenList, keyword: TokenId) -> Option<TokenId> {
    let open = tokens.next(keyword)?;
    if !tokens.get(open).is_some_and(|t| t.str_is("(")) {
        return tokens.next(keyword);
    }
    let close = tokens.link(open)?;
    tokens.next(close)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn lower_first_local(src: &str) -> Vec<ReducedStmt> {
        let tz = Tokenizer::new(src, 0, 8).unwrap();
        let body_open = tz.tokens().iter().find(|&id| tz.tokens().get(id).unwrap().str_is("{")).unwrap();
        let body_close = tz.tokens().link(body_open).unwrap();
        let focus = focus_variables(tz.tokens(), body_open, body_close)
            .into_iter()
            .next()
            .expect("at least one declared variable");
        let mut lowerer = Lowerer::new(&tz);
        lowerer.lower(body_open, body_close, focus)
    }

    #[test]
    fn malloc_assignment_lowers_to_alloc() {
        let stream = lower_first_local("void f(){ char *p = malloc(10); }");
        assert!(stream.iter().any(|s| matches!(s.kind, ReducedKind::Alloc(AllocKind::HeapScalar))));
    }

    #[test]
    fn new_expression_lowers_to_alloc_scalar() {
        let stream = lower_first_local("void f(){ int *p = new int; }");
        assert!(stream.iter().any(|s| matches!(s.kind, ReducedKind::Alloc(AllocKind::HeapScalar))));
    }

    #[test]
    fn free_call_lowers_to_dealloc() {
        let stream = lower_first_local("void f(){ char *p = malloc(1); free(p); }");
        assert!(stream.iter().any(|s| matches!(s.kind, ReducedKind::Dealloc(AllocKind::HeapScalar))));
    }

    #[test]
    fn if_var_condition_is_recognized() {
        let stream = lower_first_local("void f(){ char *p = malloc(1); if (p) { free(p); } }");
        assert!(stream.iter().any(|s| matches!(s.kind, ReducedKind::IfVar)));
    }

    #[test]
    fn loop_alloc_is_visible_for_leak_witness() {
        let stream = lower_first_local("void f(){ char *p; while (1) { p = malloc(1); } }");
        assert!(stream.iter().any(|s| matches!(s.kind, ReducedKind::Loop)));
        assert!(stream.iter().any(|s| matches!(s.kind, ReducedKind::Alloc(_))));
    }

    #[test]
    fn neutral_call_on_var_emits_use() {
        let stream = lower_first_local("void f(){ char *p = malloc(1); strlen(p); free(p); }");
        assert!(stream.iter().any(|s| matches!(s.kind, ReducedKind::Use)));
    }
}
