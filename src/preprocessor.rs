//! Textual preprocessing (`spec.md` §4.1): comment stripping, backslash-newline
//! joining, `#define`/`#if`/`#ifdef` handling, and configuration enumeration.
//! Runs once per source file, ahead of `crate::tokenizer`, and produces one
//! fully-expanded source string per reachable **configuration** — the set of
//! optional macros defined along some path through the conditional nest.

use std::collections::HashMap;

use log::warn;

/// A function-style or object-style macro definition.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Macro {
    params: Option<Vec<String>>,
    body: String,
}

/// One reachable combination of defined macro names, canonically joined with
/// `;` (`spec.md` §4.1). The empty configuration is always produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Configuration(String);

impl Configuration {
    #[must_use]
    pub fn label(&self) -> &str {
        &self.0
    }

    fn from_defines(defines: &[String]) -> Self {
        let mut names: Vec<&str> = defines.iter().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        Self(names.join(";"))
    }
}

/// Preprocesses `source`, returning every reachable configuration mapped to
/// its fully-expanded text. Disabled lines are blanked, never removed, so
/// line numbers in the output match the input exactly (`spec.md` §4.1).
#[must_use]
pub fn preprocess(source: &str, predefined: &[String]) -> HashMap<Configuration, String> {
    let joined = join_backslash_newlines(source);
    let stripped = strip_comments(&joined);

    let mut configs: HashMap<Configuration, String> = HashMap::new();
    let base_defines: Vec<String> = predefined.to_vec();
    let (text, _macros) = expand_branch(&stripped, &base_defines, &HashMap::new());
    configs.insert(Configuration::from_defines(&base_defines), text);

    for extra_set in collect_macro_sets(&stripped) {
        let mut defines = base_defines.clone();
        defines.extend(extra_set);
        let (text, _) = expand_branch(&stripped, &defines, &HashMap::new());
        configs.insert(Configuration::from_defines(&defines), text);
    }

    configs
}

/// Joins physical lines ending in `\` into one logical line, keeping the
/// line count stable by emitting a blank line in the continuation's place.
fn join_backslash_newlines(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut lines = source.split('\n').peekable();
    while let Some(line) = lines.next() {
        if let Some(stripped) = line.strip_suffix('\\') {
            out.push_str(stripped);
            out.push(' ');
            // the continuation line contributes no text of its own but must
            // still occupy a line in the output.
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Replaces `//` and `/* */` comments with single spaces, preserving
/// newlines inside block comments so downstream line numbers stay correct.
/// String and char literals are opaque: comment markers inside them are
/// left alone.
fn strip_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut i = 0;
    let mut in_string: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(quote) = in_string {
            out.push(b as char);
            if b == b'\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1] as char);
                i += 2;
                continue;
            }
            if b == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => {
                in_string = Some(b);
                out.push(b as char);
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    if bytes[i] == b'\n' {
                        out.push('\n');
                    } else {
                        out.push(' ');
                    }
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => {
                out.push(b as char);
                i += 1;
            }
        }
    }
    out
}

/// Directive kind relevant to configuration enumeration, classified without
/// regard to whether it would actually be taken (that's `expand_branch`'s
/// job — this function only cares about the static nesting shape). `Open`
/// starts a new chain; `Elif` continues one; both carry the single macro
/// name they test when recognizable (`spec.md` §4.1's
/// `#if defined(X)` → `#ifdef X` normalization covers `#elif` the same way).
enum CondDirective {
    Open(Option<String>),
    Elif(Option<String>),
    Else,
    Endif,
    Other,
}

fn classify_directive(line: &str) -> CondDirective {
    let Some(rest) = line.strip_prefix('#') else { return CondDirective::Other };
    let rest = rest.trim_start();
    if let Some(n) = rest.strip_prefix("ifdef") {
        CondDirective::Open(extract_name(n))
    } else if let Some(n) = rest.strip_prefix("ifndef") {
        CondDirective::Open(extract_name(n))
    } else if let Some(n) = rest.strip_prefix("elif") {
        CondDirective::Elif(extract_defined_name(n))
    } else if let Some(n) = rest.strip_prefix("if") {
        CondDirective::Open(extract_defined_name(n))
    } else if rest.trim_start().starts_with("else") {
        CondDirective::Else
    } else if rest.trim_start().starts_with("endif") {
        CondDirective::Endif
    } else {
        CondDirective::Other
    }
}

fn extract_name(rest: &str) -> Option<String> {
    let name = rest.trim().split(|c: char| !(c.is_alphanumeric() || c == '_')).next().unwrap_or("");
    (!name.is_empty()).then(|| name.to_string())
}

fn extract_defined_name(rest: &str) -> Option<String> {
    let n = rest.trim();
    if let Some(inner) = n.strip_prefix("defined(").and_then(|s| s.strip_suffix(')')) {
        extract_name(inner)
    } else if let Some(inner) = n.strip_prefix("defined ") {
        extract_name(inner)
    } else {
        None
    }
}

/// Walks the conditional-nesting tree of `source` and enumerates every
/// actually-reachable combination of optional macro names — i.e. for a
/// nested `#ifdef ABC { #ifdef DEF { ... } }`, both `[ABC]` and
/// `[ABC, DEF]` are produced, never a standalone `[DEF]` (`spec.md` §4.1,
/// resolved against `original_source`'s `testpreprocessor.cpp` `test3`).
/// Each returned `Vec` becomes one extra configuration alongside the always
/// -present empty one.
fn collect_macro_sets(source: &str) -> Vec<Vec<String>> {
    let lines: Vec<&str> = source.lines().map(str::trim).collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if matches!(classify_directive(lines[i]), CondDirective::Open(_)) {
            walk_conditional_chain(&lines, &mut i, &[], &mut out);
        } else {
            i += 1;
        }
    }
    out
}

enum ChainEnd {
    /// A sibling `#elif`/`#else` ended this branch's body; `*i` still
    /// points at it so the chain loop continues from there.
    Sibling,
    /// The chain's matching `#endif`; `*i` still points at it.
    Endif,
    Unterminated,
}

/// Consumes one whole `#if.../#elif.../#else/#endif` chain starting at
/// `lines[*i]` (assumed to be the opening branch directive), recursing into
/// every branch with that branch's own name appended to `prefix`. Each
/// `#elif` starts a fresh branch from `prefix` again (its name never
/// combines with an earlier sibling's — only nesting combines names).
fn walk_conditional_chain(lines: &[&str], i: &mut usize, prefix: &[String], out: &mut Vec<Vec<String>>) {
    loop {
        let name = match classify_directive(lines[*i]) {
            CondDirective::Open(name) | CondDirective::Elif(name) => name,
            _ => None,
        };
        *i += 1;
        let mut branch_prefix = prefix.to_vec();
        if let Some(n) = name {
            branch_prefix.push(n);
        }
        if !branch_prefix.is_empty() {
            out.push(branch_prefix.clone());
        }
        match scan_branch_body(lines, i, &branch_prefix, out) {
            ChainEnd::Sibling => continue,
            ChainEnd::Endif => {
                *i += 1;
                break;
            }
            ChainEnd::Unterminated => break,
        }
    }
}

/// Scans a branch's body, recursing into any nested chain, until hitting —
/// at this nesting depth — a sibling `#elif`/`#else` (returns so
/// `walk_conditional_chain`'s loop can continue from it) or the matching
/// `#endif` (`*i` left pointing at whichever line ended the scan).
fn scan_branch_body(lines: &[&str], i: &mut usize, prefix: &[String], out: &mut Vec<Vec<String>>) -> ChainEnd {
    while *i < lines.len() {
        match classify_directive(lines[*i]) {
            CondDirective::Open(_) => walk_conditional_chain(lines, i, prefix, out),
            CondDirective::Elif(_) | CondDirective::Else => return ChainEnd::Sibling,
            CondDirective::Endif => return ChainEnd::Endif,
            CondDirective::Other => *i += 1,
        }
    }
    ChainEnd::Unterminated
}

/// Walks `source` once for a fixed `defines` set: resolves conditional
/// nesting, blanks disabled lines, expands `#define`d macros, and emits
/// `#include "x.h"` pass-through markers. `#include <...>` is dropped.
fn expand_branch(source: &str, defines: &[String], seed_macros: &HashMap<String, Macro>) -> (String, HashMap<String, Macro>) {
    let mut macros = seed_macros.clone();
    let mut out_lines: Vec<String> = Vec::with_capacity(source.lines().count());
    // Stack of (branch currently taken, any sibling branch already taken).
    let mut stack: Vec<(bool, bool)> = Vec::new();

    for raw in source.lines() {
        let trimmed = raw.trim_start();
        if let Some(rest) = trimmed.strip_prefix('#') {
            let directive = rest.trim_start();
            let active_before = stack.iter().all(|(taken, _)| *taken);
            if let Some(cond) = directive.strip_prefix("ifdef") {
                let name = cond.trim();
                let taken = active_before && is_defined(name, defines, &macros);
                stack.push((taken, taken));
            } else if let Some(cond) = directive.strip_prefix("ifndef") {
                let name = cond.trim();
                let taken = active_before && !is_defined(name, defines, &macros);
                stack.push((taken, taken));
            } else if let Some(cond) = directive.strip_prefix("if") {
                let cond = normalize_if_defined(cond.trim());
                let taken = active_before && eval_if_condition(&cond, defines, &macros);
                stack.push((taken, taken));
            } else if let Some(cond) = directive.strip_prefix("elif") {
                let parent_active = stack.len() < 2 || stack[..stack.len() - 1].iter().all(|(t, _)| *t);
                if let Some((taken, any_taken)) = stack.last_mut() {
                    if *any_taken || !parent_active {
                        *taken = false;
                    } else {
                        let cond = normalize_if_defined(cond.trim());
                        *taken = eval_if_condition(&cond, defines, &macros);
                        if *taken {
                            *any_taken = true;
                        }
                    }
                } else {
                    warn!("#elif without matching #if, line treated as blank");
                }
            } else if directive.trim_start().starts_with("else") {
                let parent_active = stack.len() < 2 || stack[..stack.len() - 1].iter().all(|(t, _)| *t);
                if let Some((taken, any_taken)) = stack.last_mut() {
                    *taken = parent_active && !*any_taken;
                } else {
                    warn!("#else without matching #if, line treated as blank");
                }
            } else if directive.trim_start().starts_with("endif") {
                if stack.pop().is_none() {
                    warn!("#endif without matching #if, line treated as blank");
                }
            } else if active_before {
                if let Some(def_rest) = directive.strip_prefix("define") {
                    match parse_define(def_rest.trim()) {
                        Some((name, mac)) => {
                            macros.insert(name, mac);
                        }
                        None => warn!("malformed #define: {raw}"),
                    }
                } else if let Some(def_rest) = directive.strip_prefix("undef") {
                    macros.remove(def_rest.trim());
                } else if let Some(inc_rest) = directive.strip_prefix("include") {
                    let inc = inc_rest.trim();
                    if let Some(path) = inc.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
                        out_lines.push(format!("#pragma cclint_include \"{path}\""));
                        continue;
                    }
                    // `#include <...>`: ignored, no system-header resolution.
                } else if directive.trim_start().starts_with("pragma") || directive.trim_start().starts_with("error") {
                    // recognized but inert for analysis purposes
                } else {
                    warn!("unrecognized preprocessor directive, skipped: {raw}");
                }
            }
            out_lines.push(String::new());
            continue;
        }

        if active_before_or_toplevel(&stack) {
            out_lines.push(expand_macros_in_line(raw, &macros));
        } else {
            out_lines.push(String::new());
        }
    }

    (out_lines.join("\n"), macros)
}

fn active_before_or_toplevel(stack: &[(bool, bool)]) -> bool {
    stack.iter().all(|(taken, _)| *taken)
}

fn is_defined(name: &str, defines: &[String], macros: &HashMap<String, Macro>) -> bool {
    defines.iter().any(|d| d == name) || macros.contains_key(name)
}

/// `#if defined(X)` / `#if defined X` → treated identically to `#ifdef X`
/// (`spec.md` §4.1's `#if defined(X)` → `#ifdef X` normalization); anything
/// else is evaluated as a literal `0`/`1`/name lookup.
fn normalize_if_defined(cond: &str) -> String {
    cond.to_string()
}

fn eval_if_condition(cond: &str, defines: &[String], macros: &HashMap<String, Macro>) -> bool {
    let cond = cond.trim();
    if cond == "1" {
        return true;
    }
    if cond == "0" {
        return false;
    }
    if let Some(inner) = cond.strip_prefix("defined(").and_then(|s| s.strip_suffix(')')) {
        return is_defined(inner.trim(), defines, macros);
    }
    if let Some(inner) = cond.strip_prefix("defined ") {
        return is_defined(inner.trim(), defines, macros);
    }
    if let Some(inner) = cond.strip_prefix('!') {
        return !eval_if_condition(inner, defines, macros);
    }
    is_defined(cond, defines, macros)
}

fn parse_define(rest: &str) -> Option<(String, Macro)> {
    let rest = rest.trim();
    let name_end = rest.find(|c: char| !(c.is_alphanumeric() || c == '_'))?;
    if name_end == 0 {
        return None;
    }
    let name = rest[..name_end].to_string();
    let remainder = &rest[name_end..];
    if let Some(after_paren) = remainder.strip_prefix('(') {
        let close = after_paren.find(')')?;
        let params: Vec<String> = after_paren[..close]
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        let body = after_paren[close + 1..].trim().to_string();
        Some((name, Macro { params: Some(params), body }))
    } else {
        Some((name, Macro { params: None, body: remainder.trim().to_string() }))
    }
}

/// Substitutes every object-style macro, and every function-style macro
/// invocation whose argument count matches its definition's arity
/// (`spec.md` §4.1: "mismatched arity leaves the call untouched").
fn expand_macros_in_line(line: &str, macros: &HashMap<String, Macro>) -> String {
    if macros.is_empty() {
        return line.to_string();
    }
    let mut out = String::with_capacity(line.len());
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b == b'"' || b == b'\'' {
            let quote = b;
            out.push(b as char);
            i += 1;
            while i < bytes.len() {
                out.push(bytes[i] as char);
                if bytes[i] == b'\\' && i + 1 < bytes.len() {
                    i += 1;
                    out.push(bytes[i] as char);
                } else if bytes[i] == quote {
                    i += 1;
                    break;
                }
                i += 1;
            }
            continue;
        }
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let ident = &line[start..i];
            if let Some(mac) = macros.get(ident) {
                match &mac.params {
                    None => out.push_str(&mac.body),
                    Some(params) => {
                        let mut j = i;
                        while j < bytes.len() && bytes[j] == b' ' {
                            j += 1;
                        }
                        if j < bytes.len() && bytes[j] == b'(' {
                            if let Some((args, after)) = read_call_args(&line[j..]) {
                                if args.len() == params.len() {
                                    out.push_str(&substitute_params(&mac.body, params, &args));
                                    i = j + after;
                                    continue;
                                }
                            }
                        }
                        out.push_str(ident);
                    }
                }
            } else {
                out.push_str(ident);
            }
            continue;
        }
        out.push(b as char);
        i += 1;
    }
    out
}

/// Reads one balanced, comma-separated argument list starting at `s[0] == '('`,
/// returning the argument texts and the byte offset just past the closing `)`.
fn read_call_args(s: &str) -> Option<(Vec<String>, usize)> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'(') {
        return None;
    }
    let mut depth = 0i32;
    let mut args = Vec::new();
    let mut cur = String::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => {
                depth += 1;
                if depth > 1 {
                    cur.push('(');
                }
            }
            b')' => {
                depth -= 1;
                if depth == 0 {
                    if !cur.trim().is_empty() || !args.is_empty() {
                        args.push(cur.trim().to_string());
                    }
                    return Some((args, i + 1));
                }
                cur.push(')');
            }
            b',' if depth == 1 => {
                args.push(cur.trim().to_string());
                cur.clear();
            }
            c => cur.push(c as char),
        }
        i += 1;
    }
    None
}

fn substitute_params(body: &str, params: &[String], args: &[String]) -> String {
    let map: HashMap<&str, &str> = params.iter().map(String::as_str).zip(args.iter().map(String::as_str)).collect();
    let mut out = String::with_capacity(body.len());
    let bytes = body.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_alphabetic() || b == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let ident = &body[start..i];
            out.push_str(map.get(ident).copied().unwrap_or(ident));
            continue;
        }
        out.push(b as char);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_configuration_always_present() {
        let configs = preprocess("int a;\n", &[]);
        assert!(configs.keys().any(|c| c.label().is_empty()));
    }

    #[test]
    fn disabled_branch_is_blanked_not_removed() {
        let configs = preprocess("a\n#ifdef FOO\nb\n#endif\nc\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        let lines: Vec<&str> = empty.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[2], "");
    }

    #[test]
    fn ifdef_produces_an_extra_configuration() {
        let configs = preprocess("#ifdef FOO\nint x;\n#endif\n", &[]);
        assert!(configs.contains_key(&Configuration::from_defines(&["FOO".to_string()])));
    }

    #[test]
    fn if_defined_normalizes_like_ifdef() {
        let configs = preprocess("#if defined(FOO)\nint x;\n#endif\n", &["FOO".to_string()]);
        let cfg = Configuration::from_defines(&["FOO".to_string()]);
        let text = configs.get(&cfg).unwrap();
        assert!(text.contains("int x;"));
    }

    #[test]
    fn if_0_drops_its_body() {
        let configs = preprocess("#if 0\nint x;\n#endif\nint y;\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        assert!(!empty.contains("int x;"));
        assert!(empty.contains("int y;"));
    }

    #[test]
    fn nested_ifdef_produces_a_combined_configuration() {
        let configs = preprocess("#ifdef ABC\na\n#ifdef DEF\nb\n#endif\nc\n#endif\n", &[]);
        assert_eq!(configs.len(), 3);
        assert!(configs.contains_key(&Configuration::from_defines(&[])));
        assert!(configs.contains_key(&Configuration::from_defines(&["ABC".to_string()])));
        let combined = Configuration::from_defines(&["ABC".to_string(), "DEF".to_string()]);
        let text = configs.get(&combined).expect("ABC;DEF configuration must be reachable");
        assert!(text.contains('b'));
        let abc_only = configs.get(&Configuration::from_defines(&["ABC".to_string()])).unwrap();
        assert!(!abc_only.contains('b'));
    }

    #[test]
    fn object_macro_expands() {
        let configs = preprocess("#define SIZE 10\nint a[SIZE];\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        assert!(empty.contains("int a[10];"));
    }

    #[test]
    fn function_macro_expands_with_matching_arity() {
        let configs = preprocess("#define MAX(a,b) ((a)>(b)?(a):(b))\nint c = MAX(x,y);\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        assert!(empty.contains("((x)>(y)?(x):(y))"));
    }

    #[test]
    fn function_macro_mismatched_arity_is_untouched() {
        let configs = preprocess("#define MAX(a,b) ((a)>(b)?(a):(b))\nint c = MAX(x);\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        assert!(empty.contains("MAX(x)"));
    }

    #[test]
    fn line_comment_becomes_space_preserving_line_count() {
        let text = "int a; // trailing\nint b;\n";
        let stripped = strip_comments(text);
        assert_eq!(stripped.lines().count(), 2);
        assert!(stripped.starts_with("int a; "));
    }

    #[test]
    fn block_comment_preserves_inner_newlines() {
        let text = "int a; /* one\ntwo */ int b;\n";
        let stripped = strip_comments(text);
        assert_eq!(stripped.lines().count(), 2);
    }

    #[test]
    fn hash_inside_string_literal_is_not_a_directive() {
        let configs = preprocess("const char *s = \"#define X 1\";\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        assert!(empty.contains("#define X 1"));
    }

    #[test]
    fn backslash_newline_joins_logical_line() {
        let joined = join_backslash_newlines("int a = 1 + \\\n2;\n");
        assert_eq!(joined.lines().count(), 2);
        assert!(joined.lines().next().unwrap().contains("1 + 2;") || joined.lines().next().unwrap().contains("1 +  2;"));
    }

    #[test]
    fn include_with_literal_path_becomes_pass_through_marker() {
        let configs = preprocess("#include \"x.h\"\nint a;\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        assert!(empty.contains("cclint_include \"x.h\""));
    }

    #[test]
    fn include_with_angle_brackets_is_ignored() {
        let configs = preprocess("#include <stdio.h>\nint a;\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        assert!(!empty.contains("stdio.h"));
    }

    #[test]
    fn elif_produces_alternative_configuration() {
        let configs = preprocess("#if defined(A)\nint x;\n#elif defined(B)\nint y;\n#endif\n", &[]);
        assert!(configs.contains_key(&Configuration::from_defines(&["A".to_string()])));
    }

    #[test]
    fn malformed_define_is_skipped_not_fatal() {
        let configs = preprocess("#define\nint a;\n", &[]);
        let empty = configs.get(&Configuration::from_defines(&[])).unwrap();
        assert!(empty.contains("int a;"));
    }
}
