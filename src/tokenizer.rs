//! Lexes preprocessed source into a [`TokenList`], then links brackets and
//! assigns variable identities (`spec.md` §4.3).
//!
//! Steps, in order, exactly as `spec.md` §4.3 mandates: lex → combine
//! adjacent strings → link brackets → assign variable IDs.

use std::collections::HashMap;

use crate::errors::{CcError, CcResult};
use crate::token::{Token, TokenId, TokenList, VarId};

/// Multi-character operators, longest first so the lexer matches greedily.
const MULTI_CHAR_OPS: &[&str] = &[
    "<<=", ">>=", "...", "->", "::", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "++", "--",
    "+=", "-=", "*=", "/=", "%=", "&=", "^=", "|=",
];

const SINGLE_CHAR_PUNCT: &str = "(){}[];,.?:~!+-*/%<>=&|^#";

/// `size_of_type` seed values (`spec.md` §4.3, plus the float/double/long
/// long entries recovered from `original_source` for constant folding over
/// common idioms — see `SPEC_FULL.md` §4).
fn default_size_of_type(pointer_width: u32) -> HashMap<String, u32> {
    let mut m = HashMap::new();
    m.insert("bool".to_string(), 1);
    m.insert("char".to_string(), 1);
    m.insert("short".to_string(), 2);
    m.insert("int".to_string(), 4);
    m.insert("long".to_string(), 8);
    m.insert("float".to_string(), 4);
    m.insert("double".to_string(), 8);
    m.insert("long long".to_string(), 8);
    m.insert("pointer".to_string(), pointer_width);
    m
}

/// Owns the token stream for one analysis run (`spec.md` §3 "Ownership").
#[derive(Debug)]
pub struct Tokenizer {
    pub tokens: TokenList,
    functions: HashMap<String, TokenId>,
    size_of_type: HashMap<String, u32>,
}

impl Tokenizer {
    /// Lexes `source` (already preprocessed) and runs bracket linking +
    /// variable-ID assignment. `pointer_width` is 4 or 8 per `spec.md` §4.3.
    pub fn new(source: &str, file_index: usize, pointer_width: u32) -> CcResult<Self> {
        let tokens = lex(source, file_index)?;
        let mut tokenizer = Self {
            tokens,
            functions: HashMap::new(),
            size_of_type: default_size_of_type(pointer_width),
        };
        combine_adjacent_strings(&mut tokenizer.tokens);
        link_brackets(&mut tokenizer.tokens)?;
        assign_variable_ids(&mut tokenizer.tokens);
        tokenizer.index_functions();
        Ok(tokenizer)
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenList {
        &self.tokens
    }

    pub fn tokens_mut(&mut self) -> &mut TokenList {
        &mut self.tokens
    }

    #[must_use]
    pub fn find_function_token_by_name(&self, name: &str) -> Option<TokenId> {
        self.functions.get(name).copied()
    }

    #[must_use]
    pub fn size_of_type(&self, name: &str) -> Option<u32> {
        self.size_of_type.get(name).copied()
    }

    pub fn set_size_of_type(&mut self, name: impl Into<String>, size: u32) {
        self.size_of_type.insert(name.into(), size);
    }

    /// Rebuilds the function-name index; call after the simplifier mutates
    /// the stream (e.g. template expansion clones a function definition).
    pub fn reindex_functions(&mut self) {
        self.index_functions();
    }

    /// `(body_open, body_close)` for every indexed function definition, for
    /// `crate::flow`'s per-function leak analysis. A constructor's member
    /// initializer list (`: a(1), b(2)`) sits between the parameter list and
    /// the body, so this walks past it to find the actual `{`.
    #[must_use]
    pub fn function_bodies(&self) -> Vec<(TokenId, TokenId)> {
        let mut out = Vec::new();
        for &name_id in self.functions.values() {
            let Some(open_paren) = self.tokens.next(name_id) else { continue };
            let Some(close_paren) = self.tokens.link(open_paren) else { continue };
            let mut cur = self.tokens.next(close_paren);
            while let Some(id) = cur {
                if self.tokens.get(id).is_some_and(|t| t.str_is("{")) {
                    break;
                }
                cur = self.tokens.next(id);
            }
            let Some(body_open) = cur else { continue };
            let Some(body_close) = self.tokens.link(body_open) else { continue };
            out.push((body_open, body_close));
        }
        out
    }

    fn index_functions(&mut self) {
        self.functions.clear();
        // A function definition is `%type% name ( ... ) {`, recognized by
        // finding `name (` immediately followed, after the matched `)`, by
        // `{` (distinguishing a definition from a declaration or a call).
        let ids: Vec<TokenId> = self.tokens.iter().collect();
        for (i, &id) in ids.iter().enumerate() {
            let tok = self.tokens.get(id).unwrap();
            if !tok.is_name || tok.is_standard_type {
                continue;
            }
            let Some(&next_id) = ids.get(i + 1) else { continue };
            let Some(next_tok) = self.tokens.get(next_id) else { continue };
            if !next_tok.str_is("(") {
                continue;
            }
            let Some(close_paren) = self.tokens.link(next_id) else { continue };
            let Some(after) = self.tokens.next(close_paren) else { continue };
            let after_tok = self.tokens.get(after).unwrap();
            if after_tok.str_is("{") || after_tok.str_is(":") {
                self.functions.insert(tok.text.clone(), id);
            }
        }
    }
}

fn lex(source: &str, file_index: usize) -> CcResult<TokenList> {
    let mut list = TokenList::new();
    let bytes: Vec<char> = source.chars().collect();
    let mut i = 0usize;
    let mut line = 1usize;

    while i < bytes.len() {
        let c = bytes[i];
        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        // Wide string/char prefix: fold L"..." / L'...' to the narrow form.
        if c == 'L' && i + 1 < bytes.len() && (bytes[i + 1] == '"' || bytes[i + 1] == '\'') {
            i += 1;
            continue;
        }
        if c == '"' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != '"' {
                if bytes[i] == '\\' && i + 1 < bytes.len() {
                    i += 1;
                }
                i += 1;
            }
            if i >= bytes.len() {
                return Err(CcError::Fatal(format!("unterminated string literal at line {line}")));
            }
            i += 1; // closing quote
            let text: String = bytes[start..i].iter().collect();
            list.push_back(Token::new(text, file_index, line));
            continue;
        }
        if c == '\'' {
            let start = i;
            i += 1;
            while i < bytes.len() && bytes[i] != '\'' {
                if bytes[i] == '\\' && i + 1 < bytes.len() {
                    i += 1;
                }
                i += 1;
            }
            if i >= bytes.len() {
                return Err(CcError::Fatal(format!("unterminated char literal at line {line}")));
            }
            i += 1;
            let text: String = bytes[start..i].iter().collect();
            list.push_back(Token::new(text, file_index, line));
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            if c == '0' && i + 1 < bytes.len() && (bytes[i + 1] == 'x' || bytes[i + 1] == 'X') {
                i += 2;
                while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                    i += 1;
                }
            } else {
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == '.' {
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if i < bytes.len() && (bytes[i] == 'e' || bytes[i] == 'E') {
                    let mark = i;
                    i += 1;
                    if i < bytes.len() && (bytes[i] == '+' || bytes[i] == '-') {
                        i += 1;
                    }
                    if i < bytes.len() && bytes[i].is_ascii_digit() {
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    } else {
                        i = mark; // not actually an exponent
                    }
                }
            }
            while i < bytes.len() && "uUlLfF".contains(bytes[i]) {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            list.push_back(Token::new(text, file_index, line));
            continue;
        }
        if c == '_' || c.is_alphabetic() {
            let start = i;
            while i < bytes.len() && (bytes[i] == '_' || bytes[i].is_alphanumeric()) {
                i += 1;
            }
            let text: String = bytes[start..i].iter().collect();
            list.push_back(Token::new(text, file_index, line));
            continue;
        }
        if let Some(op) = MULTI_CHAR_OPS.iter().find(|op| matches(&bytes, i, op)) {
            list.push_back(Token::new(*op, file_index, line));
            i += op.chars().count();
            continue;
        }
        if SINGLE_CHAR_PUNCT.contains(c) {
            list.push_back(Token::new(c.to_string(), file_index, line));
            i += 1;
            continue;
        }
        // Unrecognized character: keep it as its own token rather than
        // failing the whole translation unit (best-effort, `spec.md` §7).
        list.push_back(Token::new(c.to_string(), file_index, line));
        i += 1;
    }
    Ok(list)
}

fn matches(bytes: &[char], pos: usize, op: &str) -> bool {
    let op_chars: Vec<char> = op.chars().collect();
    if pos + op_chars.len() > bytes.len() {
        return false;
    }
    bytes[pos..pos + op_chars.len()] == op_chars[..]
}

fn combine_adjacent_strings(tokens: &mut TokenList) {
    let mut cur = tokens.first();
    while let Some(id) = cur {
        let next = tokens.next(id);
        if let (Some(a), Some(b)) = (next, next.and_then(|n| tokens.get(n))) {
            let a_is_string = tokens.get(id).is_some_and(|t| t.is_string);
            if a_is_string && b.is_string {
                let combined = {
                    let a_text = tokens.get(id).unwrap().text.clone();
                    let b_text = b.text.clone();
                    format!("{}{}", &a_text[..a_text.len() - 1], &b_text[1..])
                };
                tokens.get_mut(id).unwrap().text = combined;
                tokens.erase(a);
                continue; // re-check the same id against its new neighbour
            }
        }
        cur = next;
    }
}

fn link_brackets(tokens: &mut TokenList) -> CcResult<()> {
    let mut stack: Vec<TokenId> = Vec::new();
    let ids: Vec<TokenId> = tokens.iter().collect();
    for id in ids {
        let text = tokens.get(id).unwrap().text.clone();
        match text.as_str() {
            "(" | "{" | "[" => stack.push(id),
            ")" | "}" | "]" => {
                let expected_open = match text.as_str() {
                    ")" => "(",
                    "}" => "{",
                    _ => "[",
                };
                let Some(open) = stack.pop() else {
                    return Err(CcError::Fatal(format!(
                        "unmatched closing '{text}' at line {}",
                        tokens.get(id).unwrap().line
                    )));
                };
                if tokens.get(open).unwrap().text != expected_open {
                    return Err(CcError::Fatal(format!(
                        "mismatched brackets: '{}' closed by '{text}' at line {}",
                        tokens.get(open).unwrap().text,
                        tokens.get(id).unwrap().line
                    )));
                }
                tokens.set_link(open, id);
            }
            _ => {}
        }
    }
    if let Some(unclosed) = stack.pop() {
        return Err(CcError::Fatal(format!(
            "unmatched opening '{}' at line {}",
            tokens.get(unclosed).unwrap().text,
            tokens.get(unclosed).unwrap().line
        )));
    }
    Ok(())
}

/// Walks lexical scopes (brace depth) assigning a fresh [`VarId`] to every
/// declaration site matching `type-spec var;` / `type-spec *var;` /
/// `type-spec var = ...`, and to parameters in a function's parameter list,
/// visible through the function body (`spec.md` §4.3).
///
/// A `( … )` opens its own scope so a parameter (or a C++ condition
/// declaration, `if (int x = f())`) never lands in the enclosing scope —
/// otherwise a parameter with the same name as an outer variable would
/// permanently overwrite that outer entry, since only the `{`-scope pushed
/// for the body is ever popped. When a `)` is immediately followed by `{`,
/// its scope is merged with the following body instead of being popped at
/// the `)`, so parameters stay visible through the body and both are
/// discarded together at the body's `}`.
fn assign_variable_ids(tokens: &mut TokenList) {
    let mut next_id: u32 = 1;
    let mut scopes: Vec<HashMap<String, VarId>> = vec![HashMap::new()];
    let mut pending_merge = false;

    let ids: Vec<TokenId> = tokens.iter().collect();
    let mut idx = 0usize;
    while idx < ids.len() {
        let id = ids[idx];
        let text = tokens.get(id).unwrap().text.clone();
        match text.as_str() {
            "{" => {
                if pending_merge {
                    pending_merge = false;
                } else {
                    scopes.push(HashMap::new());
                }
                idx += 1;
                continue;
            }
            "}" => {
                scopes.pop();
                if scopes.is_empty() {
                    scopes.push(HashMap::new());
                }
                idx += 1;
                continue;
            }
            "(" => {
                scopes.push(HashMap::new());
                idx += 1;
                continue;
            }
            ")" => {
                let followed_by_body = ids.get(idx + 1).is_some_and(|&next| tokens.get(next).is_some_and(|t| t.str_is("{")));
                if followed_by_body {
                    pending_merge = true;
                } else {
                    scopes.pop();
                    if scopes.is_empty() {
                        scopes.push(HashMap::new());
                    }
                }
                idx += 1;
                continue;
            }
            _ => {}
        }

        let is_decl_start = {
            let tok = tokens.get(id).unwrap();
            (tok.is_standard_type || tok.is_name) && looks_like_type_start(tokens, &ids, idx)
        };
        if is_decl_start {
            if let Some((var_idx, var_id_pos)) = find_declared_name(tokens, &ids, idx) {
                let var_id = VarId(next_id);
                next_id += 1;
                scopes
                    .last_mut()
                    .unwrap()
                    .insert(tokens.get(var_id_pos).unwrap().text.clone(), var_id);
                tokens.get_mut(var_id_pos).unwrap().var_id = var_id;
                idx = var_idx;
                continue;
            }
        }

        // Resolve any name token against the visible scope stack (innermost first).
        if tokens.get(id).unwrap().is_name {
            let name = tokens.get(id).unwrap().text.clone();
            for scope in scopes.iter().rev() {
                if let Some(&vid) = scope.get(&name) {
                    tokens.get_mut(id).unwrap().var_id = vid;
                    break;
                }
            }
        }
        idx += 1;
    }
}

/// Heuristic: a standard-type keyword, or a name token immediately followed
/// (skipping `*`/`&`/`const`) by another name and then `;`, `=`, `,`, or `[`,
/// looks like the start of a declaration.
fn looks_like_type_start(tokens: &TokenList, ids: &[TokenId], idx: usize) -> bool {
    let tok = tokens.get(ids[idx]).unwrap();
    if tok.is_standard_type {
        return true;
    }
    // A bare identifier only counts as a user type name when it is
    // immediately followed by `*`/name (a declarator), not by `(` (a call)
    // or an operator.
    let mut j = idx + 1;
    while j < ids.len() {
        let t = tokens.get(ids[j]).unwrap();
        if t.str_is("*") || t.str_is("&") || t.str_is("const") {
            j += 1;
            continue;
        }
        return t.is_name;
    }
    false
}

/// From a declaration-start position, scans forward past `*`/`&`/`const` to
/// the declared name, and confirms it is followed by `;`, `=`, `,`, or `[`.
/// Returns `(index_after_name, name_token_id)` on success.
fn find_declared_name(tokens: &TokenList, ids: &[TokenId], idx: usize) -> Option<(usize, TokenId)> {
    let mut j = idx + 1;
    while j < ids.len() {
        let t = tokens.get(ids[j]).unwrap();
        if t.str_is("*") || t.str_is("&") || t.str_is("const") {
            j += 1;
            continue;
        }
        break;
    }
    let name_idx = j;
    let name_id = *ids.get(name_idx)?;
    if !tokens.get(name_id).unwrap().is_name {
        return None;
    }
    let after = ids.get(name_idx + 1).map(|id| tokens.get(*id).unwrap());
    let confirmed = after.is_some_and(|t| t.is_one_of(&[";", "=", ",", "[", ")"]));
    if confirmed {
        Some((name_idx + 1, name_id))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tz(src: &str) -> Tokenizer {
        Tokenizer::new(src, 0, 8).unwrap()
    }

    #[test]
    fn lexes_identifiers_numbers_and_operators() {
        let t = tz("int x = 10 + y;");
        let texts: Vec<_> = t
            .tokens()
            .iter()
            .map(|id| t.tokens().get(id).unwrap().text.clone())
            .collect();
        assert_eq!(texts, vec!["int", "x", "=", "10", "+", "y", ";"]);
    }

    #[test]
    fn multi_char_operators_are_single_tokens() {
        let t = tz("a >>= b; c->d; e::f;");
        let texts: Vec<_> = t
            .tokens()
            .iter()
            .map(|id| t.tokens().get(id).unwrap().text.clone())
            .collect();
        assert!(texts.contains(&">>=".to_string()));
        assert!(texts.contains(&"->".to_string()));
        assert!(texts.contains(&"::".to_string()));
    }

    #[test]
    fn adjacent_strings_are_concatenated() {
        let t = tz(r#""abc" "def""#);
        assert_eq!(t.tokens().len(), 1);
        let id = t.tokens().first().unwrap();
        assert_eq!(t.tokens().get(id).unwrap().text, "\"abcdef\"");
    }

    #[test]
    fn bracket_links_are_bijective() {
        let t = tz("void f() { if (x) { y(); } }");
        assert!(t.tokens().links_are_bijective());
    }

    #[test]
    fn unmatched_bracket_is_fatal() {
        let result = Tokenizer::new("void f() {", 0, 8);
        assert!(result.is_err());
    }

    #[test]
    fn variable_ids_are_scope_stable() {
        let t = tz("void f() { int x; { int x; x = 1; } x = 2; }");
        let ids: Vec<TokenId> = t.tokens().iter().collect();
        let texts: Vec<String> = ids
            .iter()
            .map(|&id| t.tokens().get(id).unwrap().text.clone())
            .collect();
        let var_ids: Vec<VarId> = ids.iter().map(|&id| t.tokens().get(id).unwrap().var_id).collect();
        // Find the two `x` occurrences used as plain names (assignment targets).
        let assign_positions: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter(|(_, t)| t.as_str() == "x")
            .map(|(i, _)| i)
            .collect();
        assert!(assign_positions.len() >= 4);
        // inner `x = 1` and outer `x = 2` must differ.
        let inner_use = assign_positions[2];
        let outer_use = assign_positions[3];
        assert_ne!(var_ids[inner_use], var_ids[outer_use]);
        assert!(var_ids[inner_use].is_some());
        assert!(var_ids[outer_use].is_some());
    }

    #[test]
    fn function_table_finds_definitions() {
        let t = tz("int add(int a, int b) { return a + b; }");
        assert!(t.find_function_token_by_name("add").is_some());
    }

    #[test]
    fn parameter_does_not_clobber_outer_scope() {
        let t = tz("int x; void f(int x){ x = 5; } void g(){ x = 10; }");
        let ids: Vec<TokenId> = t.tokens().iter().collect();
        let texts: Vec<String> = ids.iter().map(|&id| t.tokens().get(id).unwrap().text.clone()).collect();
        let var_ids: Vec<VarId> = ids.iter().map(|&id| t.tokens().get(id).unwrap().var_id).collect();
        let x_positions: Vec<usize> = texts.iter().enumerate().filter(|(_, t)| t.as_str() == "x").map(|(i, _)| i).collect();
        // `int x;`, `f(int x)`, `x = 5` (param use), `g`'s `x = 10` (global use).
        assert!(x_positions.len() >= 4);
        let global_decl = x_positions[0];
        let param_use = x_positions[2];
        let global_use = x_positions[3];
        assert_eq!(var_ids[global_decl], var_ids[global_use]);
        assert_ne!(var_ids[global_decl], var_ids[param_use]);
    }

    #[test]
    fn size_of_type_seed_values() {
        let t = tz("int x;");
        assert_eq!(t.size_of_type("int"), Some(4));
        assert_eq!(t.size_of_type("long"), Some(8));
        assert_eq!(t.size_of_type("pointer"), Some(8));
    }
}
