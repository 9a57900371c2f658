//! Rewrites the token stream to canonical form (`spec.md` §4.4). Each
//! rewrite is a small, idempotent pass; [`simplify`] runs every pass in
//! sequence and repeats the whole sequence until a pass produces no change,
//! matching the "outer loop exits when a pass produces no change" and
//! "every rewrite strictly reduces (token count, matching-pattern count)"
//! termination invariants.

use crate::pattern::{Pattern, TokenId0};
use crate::token::{Token, TokenId, TokenList, VarId};
use crate::tokenizer::Tokenizer;

/// A cap on outer fixed-point iterations, a backstop against an
/// accidentally non-terminating rewrite rather than a normal exit path.
const MAX_OUTER_ITERATIONS: usize = 200;

/// Runs every rewrite pass to a fixed point. Returns the number of outer
/// iterations it took (useful for the idempotence test in `spec.md` §8:
/// running this twice should report the second run converging in a single
/// no-op iteration).
pub fn simplify(tz: &mut Tokenizer) -> usize {
    let mut iterations = 0;
    loop {
        iterations += 1;
        let mut changed = false;
        changed |= strip_casts(tz.tokens_mut());
        changed |= reduce_parens(tz.tokens_mut());
        changed |= fold_constants(tz);
        changed |= fold_conditional_literals(tz.tokens_mut());
        changed |= lower_ternary(tz.tokens_mut());
        changed |= rewrite_array_decl_init(tz.tokens_mut());
        changed |= normalize_else_if(tz.tokens_mut());
        changed |= hoist_assignment_in_condition(tz.tokens_mut());
        changed |= normalize_negation(tz.tokens_mut());
        changed |= demote_post_increment(tz.tokens_mut());
        changed |= split_comma_statements(tz.tokens_mut());
        changed |= flatten_namespaces(tz.tokens_mut());
        changed |= fold_redundant_arithmetic(tz.tokens_mut());
        changed |= expand_templates(tz);
        changed |= switch_to_if(tz.tokens_mut());
        if !changed || iterations >= MAX_OUTER_ITERATIONS {
            break;
        }
    }
    tz.reindex_functions();
    iterations
}

fn ids(tokens: &TokenList) -> Vec<TokenId> {
    tokens.iter().collect()
}

fn text(tokens: &TokenList, id: TokenId) -> String {
    tokens.get(id).map(|t| t.text.clone()).unwrap_or_default()
}

/// `(T *) e` / `(const T *) e` → `e`.
fn strip_casts(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for &open in &list {
        if tokens.get(open).is_none() || text(tokens, open) != "(" {
            continue;
        }
        let Some(close) = tokens.link(open) else { continue };
        // Reject call-like parens: `(` preceded by a name is a call/grouping
        // target, not a cast, unless preceded by nothing/operator/`;`/`{`.
        if let Some(prev) = tokens.prev(open) {
            if tokens.get(prev).is_some_and(|t| t.is_name && !is_cast_keyword_context(&t.text)) {
                continue;
            }
        }
        if !looks_like_cast_body(tokens, open, close) {
            continue;
        }
        let Some(after_close) = tokens.next(close) else { continue };
        let after_tok = tokens.get(after_close).unwrap();
        let is_castable_operand = after_tok.is_name
            || after_tok.is_number
            || after_tok.is_string
            || after_tok.str_is("(")
            || after_tok.str_is("&");
        if !is_castable_operand {
            continue;
        }
        tokens.erase_range(open, close);
        changed = true;
    }
    changed
}

fn is_cast_keyword_context(_s: &str) -> bool {
    false
}

/// `( [const] %type% [*]+ )` with nothing else inside.
fn looks_like_cast_body(tokens: &TokenList, open: TokenId, close: TokenId) -> bool {
    let mut cur = tokens.next(open);
    let mut saw_type = false;
    while let Some(id) = cur {
        if id == close {
            return saw_type;
        }
        let tok = tokens.get(id).unwrap();
        if tok.str_is("const") || tok.str_is("*") || tok.str_is("unsigned") || tok.str_is("struct") {
            cur = tokens.next(id);
            continue;
        }
        if tok.is_name && !saw_type {
            saw_type = true;
            cur = tokens.next(id);
            continue;
        }
        return false;
    }
    false
}

/// `(expr)` collapses to `expr` when it wraps a single atom (or is itself
/// already parenthesized); `return (x);` → `return x;`; `if ((x))` → `if (x)`.
fn reduce_parens(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for &open in &list {
        if tokens.get(open).is_none() || text(tokens, open) != "(" {
            continue;
        }
        let Some(close) = tokens.link(open) else { continue };
        let inner_start = tokens.next(open);
        let Some(inner_start) = inner_start else { continue };
        if inner_start == close {
            continue; // `()`
        }
        let single_atom = tokens.next(inner_start) == Some(close)
            && tokens.get(inner_start).is_some_and(|t| t.is_name || t.is_number || t.is_string);
        let double_paren = text(tokens, inner_start) == "("
            && tokens.link(inner_start) == tokens.prev(close);
        if !single_atom && !double_paren {
            continue;
        }
        // Only unwrap when the enclosing context doesn't need the parens for
        // precedence: after `return`, `if`, `while`, or as the whole RHS.
        let Some(prev) = tokens.prev(open) else { continue };
        let prev_tok = tokens.get(prev).unwrap();
        if !(prev_tok.is_one_of(&["return", "if", "while", "=", "("]) ) {
            continue;
        }
        if double_paren {
            let inner_close = tokens.link(inner_start).unwrap();
            tokens.erase(inner_start);
            tokens.erase(inner_close);
        } else {
            tokens.erase(close);
            tokens.erase(open);
        }
        changed = true;
    }
    changed
}

/// Integer constant folding over two literals, nested-paren collapse is
/// handled by [`reduce_parens`], and `sizeof` resolution via the tokenizer's
/// `size_of_type` map / a known array's declared extent.
fn fold_constants(tz: &mut Tokenizer) -> bool {
    let mut changed = fold_sizeof(tz);
    changed |= fold_arithmetic(tz.tokens_mut());
    changed
}

fn fold_arithmetic(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for window in list.windows(3) {
        let [a, op, b] = *window else { continue };
        if tokens.get(a).is_none() || tokens.get(op).is_none() || tokens.get(b).is_none() {
            continue;
        }
        let (a_tok, op_tok, b_tok) = (tokens.get(a).unwrap(), tokens.get(op).unwrap(), tokens.get(b).unwrap());
        if !(a_tok.is_number && b_tok.is_number) {
            continue;
        }
        let (Ok(av), Ok(bv)) = (a_tok.text.parse::<i64>(), b_tok.text.parse::<i64>()) else { continue };
        let result = match op_tok.text.as_str() {
            "+" => av.checked_add(bv),
            "-" => av.checked_sub(bv),
            "*" => av.checked_mul(bv),
            "/" if bv != 0 => av.checked_div(bv),
            "%" if bv != 0 => av.checked_rem(bv),
            _ => None,
        };
        let Some(result) = result else { continue };
        tokens.get_mut(a).unwrap().text = result.to_string();
        tokens.erase(op);
        tokens.erase(b);
        changed = true;
    }
    changed
}

/// `sizeof ( type )` and `sizeof ( array-var )` for a variable declared
/// `T name [ N ] ;` earlier in the same translation unit (`spec.md` §4.4 /
/// §9 "Open question — array-element count in `sizeof`": declaration-site
/// textual matching only, no cross-file unification).
fn fold_sizeof(tz: &mut Tokenizer) -> bool {
    let mut changed = false;
    let list = ids(tz.tokens());
    for &kw in &list {
        if tz.tokens().get(kw).is_none() || text(tz.tokens(), kw) != "sizeof" {
            continue;
        }
        let Some(open) = tz.tokens().next(kw) else { continue };
        if text(tz.tokens(), open) != "(" {
            continue;
        }
        let Some(close) = tz.tokens().link(open) else { continue };
        let Some(inner) = tz.tokens().next(open) else { continue };
        if inner == close {
            continue;
        }
        let size = if tz.tokens().next(inner) == Some(close) {
            let inner_tok = tz.tokens().get(inner).unwrap();
            if inner_tok.is_standard_type {
                tz.size_of_type(&inner_tok.text)
            } else if inner_tok.is_name {
                array_extent_bytes(tz, &inner_tok.text)
            } else {
                None
            }
        } else {
            None
        };
        let Some(size) = size else { continue };
        tz.tokens_mut().get_mut(kw).unwrap().text = size.to_string();
        tz.tokens_mut().erase_range(open, close);
        changed = true;
    }
    changed
}

/// Looks backwards from the whole stream for `T name [ N ] ;` and returns
/// `N * size_of(T)`.
fn array_extent_bytes(tz: &Tokenizer, name: &str) -> Option<u32> {
    let toks = tz.tokens();
    let list = ids(toks);
    for w in list.windows(5) {
        let [ty, n, lb, extent, rb] = *w else { continue };
        if text(toks, n) != name || text(toks, lb) != "[" || text(toks, rb) != "]" {
            continue;
        }
        if toks.link(lb) != Some(rb) {
            continue;
        }
        let ty_tok = toks.get(ty)?;
        let extent_tok = toks.get(extent)?;
        if !ty_tok.is_standard_type || !extent_tok.is_number {
            continue;
        }
        let elem = tz.size_of_type(&ty_tok.text)?;
        let count: u32 = extent_tok.text.parse().ok()?;
        return Some(elem * count);
    }
    None
}

/// `if (true) X else Y` → `{ X }`; `if (false) X else Y` → `{ Y }`;
/// `true ? a : b` → `a`; `false ? a : b` → `b`. Runs after folding so
/// `if (0 == 0) ...` simplifies too (negation normalization turns that into
/// `if (!0)`/`if (!x)`, then this pass only needs to special-case the
/// literal spellings `true`/`false`/`1`/`0` directly in an `if` condition).
fn fold_conditional_literals(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for &if_kw in &list {
        if tokens.get(if_kw).is_none() || text(tokens, if_kw) != "if" {
            continue;
        }
        let Some(open) = tokens.next(if_kw) else { continue };
        if text(tokens, open) != "(" {
            continue;
        }
        let Some(close) = tokens.link(open) else { continue };
        let Some(cond) = tokens.next(open) else { continue };
        if tokens.next(cond) != Some(close) {
            continue;
        }
        let literal = match text(tokens, cond).as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        };
        let Some(taken) = literal else { continue };
        let Some(then_start) = tokens.next(close) else { continue };
        let then_end = statement_extent(tokens, then_start);
        let else_range = tokens.next(then_end).filter(|&n| text(tokens, n) == "else").map(|else_kw| {
            let else_body_start = tokens.next(else_kw).unwrap();
            let else_body_end = statement_extent(tokens, else_body_start);
            (else_kw, else_body_start, else_body_end)
        });

        if taken {
            if let Some((else_kw, _, else_end)) = else_range {
                tokens.erase_range(else_kw, else_end);
            }
            tokens.erase_range(if_kw, close);
        } else if let Some((else_kw, _, _)) = else_range {
            // Remove `if (...) then-branch else`, keeping only the else-body.
            tokens.erase_range(if_kw, close);
            tokens.erase_range(then_start, else_kw);
        } else {
            tokens.erase_range(if_kw, then_end);
        }
        changed = true;
    }
    changed
}

/// Returns the last token of the statement starting at `start`: for a
/// brace-delimited block, its matching `}`; otherwise the next top-level
/// `;`. Used to find statement boundaries for `if`/`else` rewrites.
fn statement_extent(tokens: &TokenList, start: TokenId) -> TokenId {
    if text(tokens, start) == "{" {
        return tokens.link(start).unwrap_or(start);
    }
    let mut depth = 0i32;
    let mut cur = Some(start);
    while let Some(id) = cur {
        let t = text(tokens, id);
        match t.as_str() {
            "(" | "[" => depth += 1,
            ")" | "]" => depth -= 1,
            ";" if depth == 0 => return id,
            _ => {}
        }
        cur = tokens.next(id);
    }
    start
}

/// `x = c ? a : b;` → `if (c) { x = a; } else { x = b; }` (outside of
/// constant folding, which `fold_conditional_literals` already handles for
/// literal conditions).
fn lower_ternary(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for &eq in &list {
        if tokens.get(eq).is_none() || text(tokens, eq) != "=" {
            continue;
        }
        let Some(lhs) = tokens.prev(eq) else { continue };
        if !tokens.get(lhs).is_some_and(|t| t.is_name) {
            continue;
        }
        let Some(cond_start) = tokens.next(eq) else { continue };
        let semi = statement_extent(tokens, cond_start);
        if text(tokens, semi) != ";" {
            continue;
        }
        // Find a top-level `?` between cond_start and semi.
        let mut depth = 0i32;
        let mut qmark = None;
        let mut cur = Some(cond_start);
        while let Some(id) = cur {
            if id == semi {
                break;
            }
            match text(tokens, id).as_str() {
                "(" => depth += 1,
                ")" => depth -= 1,
                "?" if depth == 0 => {
                    qmark = Some(id);
                    break;
                }
                _ => {}
            }
            cur = tokens.next(id);
        }
        let Some(qmark) = qmark else { continue };
        // Find the matching top-level `:`.
        let mut depth = 0i32;
        let mut colon = None;
        let mut cur = tokens.next(qmark);
        while let Some(id) = cur {
            if id == semi {
                break;
            }
            match text(tokens, id).as_str() {
                "(" => depth += 1,
                ")" => depth -= 1,
                ":" if depth == 0 => {
                    colon = Some(id);
                    break;
                }
                _ => {}
            }
            cur = tokens.next(id);
        }
        let Some(colon) = colon else { continue };

        let var_name = text(tokens, lhs);
        let a_tokens = range_texts(tokens, tokens.next(qmark).unwrap(), tokens.prev(colon).unwrap());
        let b_tokens = range_texts(tokens, tokens.next(colon).unwrap(), tokens.prev(semi).unwrap());
        let cond_tokens = range_texts(tokens, cond_start, tokens.prev(qmark).unwrap());
        let (file_index, line) = {
            let t = tokens.get(lhs).unwrap();
            (t.file_index, t.line)
        };

        tokens.erase_range(lhs, semi);
        // `lhs` is erased now; re-anchor on its predecessor in the
        // pre-erase snapshot so the replacement lands in the same spot.
        let before = list
            .iter()
            .position(|&x| x == lhs)
            .and_then(|i| i.checked_sub(1))
            .map(|i| list[i]);

        let mut new_tokens = vec!["if".to_string(), "(".to_string()];
        new_tokens.extend(cond_tokens);
        new_tokens.push(")".to_string());
        new_tokens.push("{".to_string());
        new_tokens.push(var_name.clone());
        new_tokens.push("=".to_string());
        new_tokens.extend(a_tokens);
        new_tokens.push(";".to_string());
        new_tokens.push("}".to_string());
        new_tokens.push("else".to_string());
        new_tokens.push("{".to_string());
        new_tokens.push(var_name);
        new_tokens.push("=".to_string());
        new_tokens.extend(b_tokens);
        new_tokens.push(";".to_string());
        new_tokens.push("}".to_string());

        insert_token_texts(tokens, before, &new_tokens, file_index, line);
        changed = true;
        break; // token ids after this point are stale; re-scan next outer iteration
    }
    changed
}

fn range_texts(tokens: &TokenList, start: TokenId, end: TokenId) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = Some(start);
    while let Some(id) = cur {
        out.push(text(tokens, id));
        if id == end {
            break;
        }
        cur = tokens.next(id);
    }
    out
}

/// Inserts plain-text tokens after `after` (or at the head of the stream if
/// `after` is `None`), linking brackets among the freshly inserted tokens.
fn insert_token_texts(
    tokens: &mut TokenList,
    after: Option<TokenId>,
    texts: &[String],
    file_index: usize,
    line: usize,
) {
    let mut cursor = after;
    let mut bracket_stack: Vec<TokenId> = Vec::new();
    let mut inserted = Vec::new();
    for t in texts {
        let tok = Token::new(t.clone(), file_index, line);
        let id = match cursor {
            Some(c) => tokens.insert_after(c, tok),
            None => {
                // No anchor: push to front by inserting before the current head.
                match tokens.first() {
                    Some(head) => tokens.insert_before(head, tok),
                    None => tokens.push_back(tok),
                }
            }
        };
        inserted.push(id);
        cursor = Some(id);
        match t.as_str() {
            "(" | "{" | "[" => bracket_stack.push(id),
            ")" | "}" | "]" => {
                if let Some(open) = bracket_stack.pop() {
                    tokens.set_link(open, id);
                }
            }
            _ => {}
        }
    }
}

/// `char str[] = "abc";` → `char *str; str = "abc";`.
fn rewrite_array_decl_init(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for w in list.windows(6) {
        let [ty, name, lb, rb, eq, strlit] = *w else { continue };
        if !(tokens.get(ty).is_some_and(|t| t.is_standard_type)
            && tokens.get(name).is_some_and(|t| t.is_name)
            && text(tokens, lb) == "["
            && text(tokens, rb) == "]"
            && tokens.link(lb) == Some(rb)
            && text(tokens, eq) == "="
            && tokens.get(strlit).is_some_and(|t| t.is_string))
        {
            continue;
        }
        let Some(semi) = tokens.next(strlit) else { continue };
        if text(tokens, semi) != ";" {
            continue;
        }
        let (file_index, line) = {
            let t = tokens.get(ty).unwrap();
            (t.file_index, t.line)
        };
        let name_text = text(tokens, name);
        let str_text = text(tokens, strlit);
        let before = list.iter().position(|&x| x == ty).and_then(|i| i.checked_sub(1)).map(|i| list[i]);
        tokens.erase_range(ty, semi);
        // This rewrite only fires for `char` arrays (the window match above
        // requires a string-literal initializer), so the rebuilt type is
        // always `char`.
        let pieces = vec![
            "char".to_string(),
            "*".to_string(),
            name_text.clone(),
            ";".to_string(),
            name_text,
            "=".to_string(),
            str_text,
            ";".to_string(),
        ];
        insert_token_texts(tokens, before, &pieces, file_index, line);
        changed = true;
        break;
    }
    changed
}

/// `else if (…) …` → `else { if (…) … }`.
fn normalize_else_if(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for &else_kw in &list {
        if tokens.get(else_kw).is_none() || text(tokens, else_kw) != "else" {
            continue;
        }
        let Some(if_kw) = tokens.next(else_kw) else { continue };
        if text(tokens, if_kw) != "if" {
            continue;
        }
        // Find the extent of this whole `if [else ...]` chain to close the brace after it.
        let Some(open) = tokens.next(if_kw) else { continue };
        if text(tokens, open) != "(" {
            continue;
        }
        let Some(close) = tokens.link(open) else { continue };
        let Some(then_start) = tokens.next(close) else { continue };
        let mut end = statement_extent(tokens, then_start);
        if let Some(next) = tokens.next(end) {
            if text(tokens, next) == "else" {
                let else2_body = tokens.next(next).unwrap();
                end = statement_extent(tokens, else2_body);
            }
        }
        let (file_index, line) = {
            let t = tokens.get(else_kw).unwrap();
            (t.file_index, t.line)
        };
        tokens.insert_after(else_kw, Token::new("{", file_index, line));
        let close_line = tokens.get(end).map(|t| t.line).unwrap_or(line);
        let new_close = tokens.insert_after(end, Token::new("}", file_index, close_line));
        let open_brace = tokens.next(else_kw).unwrap();
        tokens.set_link(open_brace, new_close);
        changed = true;
        break;
    }
    changed
}

/// `if (a = b)` → `a = b; if (a)`; `while (a = b) S` → `a = b; while (a) { S; a = b; }`.
fn hoist_assignment_in_condition(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for &kw in &list {
        if tokens.get(kw).is_none() {
            continue;
        }
        let kw_text = text(tokens, kw);
        if kw_text != "if" && kw_text != "while" {
            continue;
        }
        let Some(open) = tokens.next(kw) else { continue };
        if text(tokens, open) != "(" {
            continue;
        }
        let Some(close) = tokens.link(open) else { continue };
        let Some(var) = tokens.next(open) else { continue };
        if !tokens.get(var).is_some_and(|t| t.is_name) {
            continue;
        }
        let Some(eq) = tokens.next(var) else { continue };
        if text(tokens, eq) != "=" || tokens.next(eq) == Some(close) {
            continue;
        }
        if tokens.prev(close) == Some(eq) {
            continue; // `(x = )` malformed, ignore
        }
        let rhs_tokens = range_texts(tokens, tokens.next(eq).unwrap(), tokens.prev(close).unwrap());
        let var_name = text(tokens, var);
        let (file_index, line) = {
            let t = tokens.get(kw).unwrap();
            (t.file_index, t.line)
        };
        let before = list.iter().position(|&x| x == kw).and_then(|i| i.checked_sub(1)).map(|i| list[i]);

        if kw_text == "if" {
            // Replace condition with just the variable, and hoist the
            // assignment as its own statement before `if`.
            tokens.erase_range(var, close);
            let new_close = tokens.insert_after(open, Token::new(var_name.clone(), file_index, line));
            tokens.set_link(open, new_close);
            let mut assign = vec![var_name, "=".to_string()];
            assign.extend(rhs_tokens);
            assign.push(";".to_string());
            insert_token_texts(tokens, before, &assign, file_index, line);
        } else {
            let Some(body_start) = tokens.next(close) else { continue };
            let body_end = statement_extent(tokens, body_start);
            let body_is_block = text(tokens, body_start) == "{";
            let body_tokens = if body_is_block {
                range_texts(tokens, tokens.next(body_start).unwrap(), tokens.prev(body_end).unwrap())
            } else {
                range_texts(tokens, body_start, body_end)
            };

            tokens.erase_range(var, close);
            let new_close = tokens.insert_after(open, Token::new(var_name.clone(), file_index, line));
            tokens.set_link(open, new_close);
            tokens.erase_range(body_start, body_end);

            let mut assign = vec![var_name.clone(), "=".to_string()];
            assign.extend(rhs_tokens.clone());
            assign.push(";".to_string());
            insert_token_texts(tokens, before, &assign, file_index, line);

            let mut new_body = vec!["{".to_string()];
            new_body.extend(body_tokens);
            if !body_is_block {
                new_body.push(";".to_string());
            }
            new_body.extend(assign.clone());
            new_body.push("}".to_string());
            insert_token_texts(tokens, Some(new_close), &new_body, file_index, line);
        }
        changed = true;
        break;
    }
    changed
}

/// `if (0 == x)` → `if (!x)`; `if (not x)` → `if (!x)`.
fn normalize_negation(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let pat_zero_eq = Pattern::compile("if ( 0 == %var% )");
    let pat_not = Pattern::compile("if ( not %var% )");
    let list = ids(tokens);
    for &id in &list {
        if tokens.get(id).is_none() {
            continue;
        }
        use crate::pattern::MatchResult;
        if let MatchResult::Matched { .. } = pat_zero_eq.match_at(tokens, TokenId0(id), VarId::NONE) {
            rewrite_negated_if(tokens, id, 3); // skip `if ( 0 ==`, keep var
            changed = true;
            continue;
        }
        if let MatchResult::Matched { .. } = pat_not.match_at(tokens, TokenId0(id), VarId::NONE) {
            rewrite_negated_if(tokens, id, 1); // skip `if ( not`, keep var
            changed = true;
        }
    }
    changed
}

/// Removes the `skip` tokens right after `if (` and inserts a `!` before the
/// remaining variable token.
fn rewrite_negated_if(tokens: &mut TokenList, if_kw: TokenId, skip_after_open: usize) {
    let open = tokens.next(if_kw).unwrap();
    let mut cur = open;
    for _ in 0..skip_after_open {
        let next = tokens.next(cur).unwrap();
        tokens.erase(next);
    }
    let (file_index, line) = {
        let t = tokens.get(open).unwrap();
        (t.file_index, t.line)
    };
    tokens.insert_after(open, Token::new("!", file_index, line));
}

/// `a++;` as a statement → `++a;` (freed value never otherwise used).
fn demote_post_increment(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for w in list.windows(4) {
        let [before, var, incdec, semi] = *w else { continue };
        let op = text(tokens, incdec);
        if (op != "++" && op != "--") || text(tokens, semi) != ";" {
            continue;
        }
        if !tokens.get(var).is_some_and(|t| t.is_name) {
            continue;
        }
        if !tokens.get(before).is_some_and(|t| t.is_one_of(&[";", "{", "}"])) {
            continue;
        }
        let (file_index, line) = {
            let t = tokens.get(var).unwrap();
            (t.file_index, t.line)
        };
        tokens.erase(incdec);
        tokens.insert_before(var, Token::new(op, file_index, line));
        changed = true;
    }
    changed
}

/// Top-level `a, b;` → `a; b;` when `,` is not inside a call, template, or
/// array initializer (i.e. at paren/bracket depth 0 within the statement).
fn split_comma_statements(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    let mut depth = 0i32;
    for &id in &list {
        if tokens.get(id).is_none() {
            continue;
        }
        match text(tokens, id).as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => depth -= 1,
            // Depth 0 excludes commas inside `(...)`/`[...]`/a `for(;;)`
            // header's own parens, so only statement-level commas split.
            "," if depth == 0 => {
                tokens.get_mut(id).unwrap().text = ";".to_string();
                changed = true;
            }
            _ => {}
        }
    }
    changed
}

/// `namespace N { … }` → `…` (no name mangling).
fn flatten_namespaces(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for &kw in &list {
        if tokens.get(kw).is_none() || text(tokens, kw) != "namespace" {
            continue;
        }
        let Some(after_kw) = tokens.next(kw) else { continue };
        let (name_tok, brace) = if text(tokens, after_kw) == "{" {
            (None, after_kw)
        } else if tokens.get(after_kw).is_some_and(|t| t.is_name) {
            (Some(after_kw), tokens.next(after_kw).unwrap())
        } else {
            continue;
        };
        if text(tokens, brace) != "{" {
            continue;
        }
        let Some(close) = tokens.link(brace) else { continue };
        tokens.erase(close);
        tokens.erase(brace);
        if let Some(name) = name_tok {
            tokens.erase(name);
        }
        tokens.erase(kw);
        changed = true;
        break;
    }
    changed
}

/// `+ +` → `+`, `+ -` → `-`, `- -` → `+`.
fn fold_redundant_arithmetic(tokens: &mut TokenList) -> bool {
    let mut changed = false;
    let list = ids(tokens);
    for w in list.windows(2) {
        let [a, b] = *w else { continue };
        if tokens.get(a).is_none() || tokens.get(b).is_none() {
            continue;
        }
        let (at, bt) = (text(tokens, a), text(tokens, b));
        let folded = match (at.as_str(), bt.as_str()) {
            ("+", "+") => Some("+"),
            ("+", "-") => Some("-"),
            ("-", "-") => Some("+"),
            _ => None,
        };
        if let Some(result) = folded {
            // Only fold unary-looking sequences (preceded by an operator,
            // `(`, `return`, or nothing) to avoid touching `a + +b`'s sibling
            // binary case incorrectly when both are genuinely binary.
            if tokens
                .prev(a)
                .map(|p| tokens.get(p).unwrap().is_name || tokens.get(p).unwrap().is_number)
                .unwrap_or(false)
            {
                tokens.get_mut(a).unwrap().text = result.to_string();
                tokens.erase(b);
                changed = true;
            }
        }
    }
    changed
}

/// One-level template expansion: for a single-type-parameter function
/// template `template < %var% > %type% name ( ... ) { ... }` referenced at
/// a use site as `name < ConcreteType > (`, clones the definition with the
/// parameter substituted, appends the clone, and rewrites the use site to
/// call the clone directly. `spec.md` §4.4: "one level only — nested
/// generic parameters are not resolved."
fn expand_templates(tz: &mut Tokenizer) -> bool {
    let tokens = tz.tokens_mut();
    let list = ids(tokens);
    for &tmpl_kw in &list {
        if tokens.get(tmpl_kw).is_none() || text(tokens, tmpl_kw) != "template" {
            continue;
        }
        let Some(lt) = tokens.next(tmpl_kw) else { continue };
        if text(tokens, lt) != "<" {
            continue;
        }
        let Some(param) = tokens.next(lt) else { continue };
        if !tokens.get(param).is_some_and(|t| t.is_name) {
            continue;
        }
        let Some(gt) = tokens.next(param) else { continue };
        if text(tokens, gt) != ">" {
            continue;
        }
        let Some(decl_start) = tokens.next(gt) else { continue };
        // Find the function name: first name token followed by `(`.
        let mut name_id = None;
        let mut cur = Some(decl_start);
        while let Some(id) = cur {
            if text(tokens, id) == "{" || text(tokens, id) == ";" {
                break;
            }
            if tokens.get(id).is_some_and(|t| t.is_name) {
                if let Some(next) = tokens.next(id) {
                    if text(tokens, next) == "(" {
                        name_id = Some(id);
                        break;
                    }
                }
            }
            cur = tokens.next(id);
        }
        let Some(name_id) = name_id else { continue };
        let func_name = text(tokens, name_id);
        let param_name = text(tokens, param);

        // Find the end of the definition: matching `}` of its body.
        let open_paren = tokens.next(name_id).unwrap();
        let close_paren = match tokens.link(open_paren) {
            Some(c) => c,
            None => continue,
        };
        let Some(body_open) = tokens.next(close_paren) else { continue };
        if text(tokens, body_open) != "{" {
            continue;
        }
        let Some(body_close) = tokens.link(body_open) else { continue };

        // Find a use site `name < ConcreteType >` followed by `(`, after the
        // definition, that hasn't already been expanded.
        let mangled_marker = format!("{func_name}__tmpl_use");
        let mut use_site = None;
        let mut concrete = None;
        let mut scan = tokens.next(body_close);
        while let Some(id) = scan {
            if text(tokens, id) == func_name {
                if let Some(next) = tokens.next(id) {
                    if text(tokens, next) == "<" {
                        if let Some(arg) = tokens.next(next) {
                            if let Some(close_angle) = tokens.next(arg) {
                                if text(tokens, close_angle) == ">" {
                                    use_site = Some((id, next, arg, close_angle));
                                    concrete = Some(text(tokens, arg));
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            scan = tokens.next(id);
        }
        let (Some((call_name, call_lt, call_arg, call_gt)), Some(concrete_ty)) = (use_site, concrete) else {
            continue;
        };
        let _ = mangled_marker;

        let clone_name = format!("{func_name}_{concrete_ty}");
        // Rename the call site in place first (ids stable, no shift yet).
        tokens.erase_range(call_lt, call_gt);
        tokens.get_mut(call_name).unwrap().text = clone_name.clone();

        // Clone the definition's token texts (return-type through body),
        // substituting the template parameter name for the concrete type,
        // and the function name for the mangled clone name.
        let def_texts = range_texts(tokens, decl_start, body_close)
            .into_iter()
            .map(|t| {
                if t == param_name {
                    concrete_ty.clone()
                } else if t == func_name {
                    clone_name.clone()
                } else {
                    t
                }
            })
            .collect::<Vec<_>>();
        let (file_index, line) = {
            let t = tokens.get(body_close).unwrap();
            (t.file_index, t.line)
        };
        insert_token_texts(tokens, Some(body_close), &def_texts, file_index, line);
        return true;
    }
    false
}

/// A conservative `switch { case A: … break; case B: … break; default: … }`
/// (no fallthrough, no nested control flow between a `case` and its
/// terminating `break`) rewrites to an `if/else-if/else` chain. Per
/// `spec.md` §9's open question, falls through (no rewrite) on anything
/// less regular.
fn switch_to_if(tokens: &mut TokenList) -> bool {
    let list = ids(tokens);
    for &switch_kw in &list {
        if tokens.get(switch_kw).is_none() || text(tokens, switch_kw) != "switch" {
            continue;
        }
        let Some(open) = tokens.next(switch_kw) else { continue };
        if text(tokens, open) != "(" {
            continue;
        }
        let Some(close) = tokens.link(open) else { continue };
        let Some(body_open) = tokens.next(close) else { continue };
        if text(tokens, body_open) != "{" {
            continue;
        }
        let Some(body_close) = tokens.link(body_open) else { continue };

        let Some(clauses) = parse_switch_clauses(tokens, body_open, body_close) else { continue };
        if clauses.is_empty() {
            continue;
        }

        let cond_tokens = range_texts(tokens, tokens.next(open).unwrap(), tokens.prev(close).unwrap());
        let (file_index, line) = {
            let t = tokens.get(switch_kw).unwrap();
            (t.file_index, t.line)
        };

        let mut out = Vec::new();
        for (i, clause) in clauses.iter().enumerate() {
            match &clause.label {
                Some(value) => {
                    if i > 0 {
                        out.push("else".to_string());
                    }
                    out.push("if".to_string());
                    out.push("(".to_string());
                    out.extend(cond_tokens.clone());
                    out.push("==".to_string());
                    out.push(value.clone());
                    out.push(")".to_string());
                    out.push("{".to_string());
                    out.extend(clause.body.clone());
                    out.push("}".to_string());
                }
                None => {
                    out.push("else".to_string());
                    out.push("{".to_string());
                    out.extend(clause.body.clone());
                    out.push("}".to_string());
                }
            }
        }

        let before = list
            .iter()
            .position(|&x| x == switch_kw)
            .and_then(|i| i.checked_sub(1))
            .map(|i| list[i]);
        tokens.erase_range(switch_kw, body_close);
        insert_token_texts(tokens, before, &out, file_index, line);
        return true;
    }
    false
}

struct SwitchClause {
    label: Option<String>, // `None` for `default`
    body: Vec<String>,
}

/// Parses `{ case A : … break ; case B : … break ; default : … }` requiring
/// every non-default clause to end in an explicit `break ;` and contain no
/// nested `if`/`for`/`while`/`switch`/`do` — the conservative check from
/// `spec.md` §9. Returns `None` if the body doesn't match that shape.
fn parse_switch_clauses(tokens: &TokenList, body_open: TokenId, body_close: TokenId) -> Option<Vec<SwitchClause>> {
    let mut clauses = Vec::new();
    let mut cur = tokens.next(body_open)?;
    loop {
        let label = match text(tokens, cur).as_str() {
            "case" => {
                let value_id = tokens.next(cur)?;
                let colon = tokens.next(value_id)?;
                if text(tokens, colon) != ":" {
                    return None;
                }
                cur = tokens.next(colon)?;
                Some(text(tokens, value_id))
            }
            "default" => {
                let colon = tokens.next(cur)?;
                if text(tokens, colon) != ":" {
                    return None;
                }
                cur = tokens.next(colon)?;
                None
            }
            _ => return None,
        };

        let mut body = Vec::new();
        let mut found_break = false;
        loop {
            if cur == body_close {
                // `default` clause may legitimately run to the closing brace
                // without a `break`.
                if label.is_none() {
                    found_break = true;
                }
                break;
            }
            let t = text(tokens, cur);
            if t == "case" || t == "default" {
                break;
            }
            if ["if", "for", "while", "switch", "do"].contains(&t.as_str()) {
                return None; // nested control flow: bail per the conservative check
            }
            if t == "break" {
                let next = tokens.next(cur)?;
                if text(tokens, next) == ";" {
                    found_break = true;
                    cur = tokens.next(next)?;
                    break;
                }
            }
            body.push(t);
            cur = tokens.next(cur)?;
        }
        if !found_break {
            return None;
        }
        clauses.push(SwitchClause { label, body });
        if cur == body_close {
            break;
        }
    }
    Some(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::Tokenizer;

    fn run(src: &str) -> Tokenizer {
        let mut tz = Tokenizer::new(src, 0, 8).unwrap();
        simplify(&mut tz);
        tz
    }

    #[test]
    fn strips_pointer_cast() {
        let tz = run("void f(){ int *p = (int *) q; }");
        assert_eq!(tz.tokens().stringify(), "void f ( ) { int * p = q ; }");
    }

    #[test]
    fn reduces_return_parens() {
        let tz = run("int f(){ return (x); }");
        assert_eq!(tz.tokens().stringify(), "int f ( ) { return x ; }");
    }

    #[test]
    fn folds_integer_arithmetic() {
        let tz = run("int f(){ int x = 2 + 3; }");
        assert_eq!(tz.tokens().stringify(), "int f ( ) { int x = 5 ; }");
    }

    #[test]
    fn folds_sizeof_known_type() {
        let tz = run("int f(){ int n = sizeof(int); }");
        assert_eq!(tz.tokens().stringify(), "int f ( ) { int n = 4 ; }");
    }

    #[test]
    fn removes_dead_if_false_branch() {
        let tz = run("void f(){ if (false) { g(); } }");
        assert_eq!(tz.tokens().stringify(), "void f ( ) { }");
    }

    #[test]
    fn keeps_true_branch_only() {
        let tz = run("void f(){ if (true) { g(); } else { h(); } }");
        assert_eq!(tz.tokens().stringify(), "void f ( ) { { g ( ) ; } }");
    }

    #[test]
    fn normalizes_zero_equals_negation() {
        let tz = run("void f(){ if (0 == x) { g(); } }");
        assert_eq!(tz.tokens().stringify(), "void f ( ) { if ( ! x ) { g ( ) ; } }");
    }

    #[test]
    fn demotes_post_increment_statement() {
        let tz = run("void f(){ a++; }");
        assert_eq!(tz.tokens().stringify(), "void f ( ) { ++ a ; }");
    }

    #[test]
    fn splits_top_level_comma_statement() {
        let tz = run("void f(){ a = 1, b = 2; }");
        assert_eq!(tz.tokens().stringify(), "void f ( ) { a = 1 ; b = 2 ; }");
    }

    #[test]
    fn flattens_namespace() {
        let tz = run("namespace n { int x; }");
        assert_eq!(tz.tokens().stringify(), "int x ;");
    }

    #[test]
    fn redundant_arithmetic_plus_minus() {
        let tz = run("void f(){ int x = a + -b; }");
        assert_eq!(tz.tokens().stringify(), "void f ( ) { int x = a - b ; }");
    }

    #[test]
    fn rewrites_char_array_string_init() {
        let tz = run(r#"void f(){ char str[] = "abc"; }"#);
        assert_eq!(
            tz.tokens().stringify(),
            r#"void f ( ) { char * str ; str = "abc" ; }"#
        );
    }

    #[test]
    fn simplifier_reaches_a_fixed_point() {
        let mut tz = Tokenizer::new("void f(){ int x = (1 + 2); }", 0, 8).unwrap();
        simplify(&mut tz);
        let once = tz.tokens().stringify();
        simplify(&mut tz);
        let twice = tz.tokens().stringify();
        assert_eq!(once, twice);
    }
}
