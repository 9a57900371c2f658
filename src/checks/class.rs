//! Class checks (`spec.md` §4.8): missing member initialization in
//! constructors/`operator=`, missing virtual destructors, and
//! `operator=`'s return type, plus the unused-private-function check (which
//! needs the same class/access-specifier parsing).

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{Diagnostic, DiagnosticId, DiagnosticSink, Location, Severity};
use crate::token::{TokenId, TokenList, VarId};
use crate::tokenizer::Tokenizer;

struct Member {
    name: String,
    var_id: VarId,
    /// A member needs an explicit initializer when it isn't itself a class
    /// type with its own default constructor: a primitive (`is_standard_type`)
    /// or a pointer (`spec.md` §4.8 "non-class, pointer type").
    needs_init: bool,
    line: usize,
}

struct ClassDef {
    name: String,
    base: Option<String>,
    body_open: TokenId,
    body_close: TokenId,
    members: Vec<Member>,
}

pub fn check(tz: &Tokenizer, sink: &mut DiagnosticSink) {
    let tokens = tz.tokens();
    let classes = find_classes(tokens);
    let by_name: HashMap<&str, &ClassDef> = classes.iter().map(|c| (c.name.as_str(), c)).collect();

    for class in &classes {
        check_constructors_and_assign(tokens, class, sink);
        check_virtual_destructor(tokens, class, &by_name, sink);
        check_unused_private_functions(tokens, class, sink);
    }
}

fn find_classes(tokens: &TokenList) -> Vec<ClassDef> {
    let mut out = Vec::new();
    let ids: Vec<TokenId> = tokens.iter().collect();
    let mut i = 0;
    while i < ids.len() {
        let id = ids[i];
        let tok = tokens.get(id).unwrap();
        if tok.str_is("class") || tok.str_is("struct") {
            if let Some(def) = parse_class_header(tokens, &ids, i) {
                i = ids.iter().position(|&x| x == def.body_close).unwrap_or(i) + 1;
                out.push(def);
                continue;
            }
        }
        i += 1;
    }
    out
}

/// `class Name [ : public Base ] {`; returns the class definition with its
/// member-variable list already collected, or `None` if this isn't a
/// definition (e.g. a forward declaration `class Name;`).
fn parse_class_header(tokens: &TokenList, ids: &[TokenId], start: usize) -> Option<ClassDef> {
    let name_tok = tokens.get(*ids.get(start + 1)?)?;
    if !name_tok.is_name {
        return None;
    }
    let name = name_tok.text.clone();
    let mut j = start + 2;
    let mut base = None;
    if tokens.get(*ids.get(j)?).is_some_and(|t| t.str_is(":")) {
        j += 1;
        if tokens.get(*ids.get(j)?).is_some_and(|t| t.is_one_of(&["public", "private", "protected"])) {
            j += 1;
        }
        let base_tok = tokens.get(*ids.get(j)?)?;
        if base_tok.is_name {
            base = Some(base_tok.text.clone());
            j += 1;
        }
    }
    let open = *ids.get(j)?;
    if !tokens.get(open).is_some_and(|t| t.str_is("{")) {
        return None;
    }
    let close = tokens.link(open)?;
    let members = collect_members(tokens, ids, open, close);
    Some(ClassDef { name, base, body_open: open, body_close: close, members })
}

/// Member variable declarations directly in the class body (depth 1 inside
/// `{…}`, not inside a nested class/struct/function body).
fn collect_members(tokens: &TokenList, ids: &[TokenId], open: TokenId, close: TokenId) -> Vec<Member> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let start = ids.iter().position(|&x| x == open).unwrap();
    let end = ids.iter().position(|&x| x == close).unwrap();
    let mut k = start + 1;
    while k < end {
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
                // skip a function signature/body entirely: not a field.
                if let Some(paren_close) = tokens.link(id) {
                    k = ids.iter().position(|&x| x == paren_close).unwrap_or(k) + 1;
                    continue;
                }
            }
            _ => {}
        }
        if depth == 0 && tok.is_name && tok.var_id.is_some() && !is_function_like(tokens, ids, k) {
            let mut is_static = false;
            let mut pointer = false;
            let mut scan = k;
            while scan > start + 1 {
                scan -= 1;
                let t = tokens.get(ids[scan]).unwrap();
                if t.str_is("static") {
                    is_static = true;
                }
                if t.str_is("*") {
                    pointer = true;
                }
                if t.str_is(";") || t.str_is("{") || t.str_is("}") || t.str_is(":") {
                    break;
                }
            }
            if !is_static {
                let type_tok = ids[start + 1..k].iter().rev().find_map(|&x| {
                    let t = tokens.get(x)?;
                    (!t.str_is("*") && !t.str_is("&") && !t.str_is("const") && !t.str_is("static")).then_some(t)
                });
                let needs_init = pointer || type_tok.is_some_and(|t| t.is_standard_type);
                out.push(Member { name: tok.text.clone(), var_id: tok.var_id, needs_init, line: tok.line });
            }
        }
        k += 1;
    }
    out
}

/// True when the name at `ids[k]` is immediately followed by `(` — i.e. a
/// method declaration/definition, not a field.
fn is_function_like(tokens: &TokenList, ids: &[TokenId], k: usize) -> bool {
    ids.get(k + 1).is_some_and(|&n| tokens.get(n).is_some_and(|t| t.str_is("(")))
}

fn check_constructors_and_assign(tokens: &TokenList, class: &ClassDef, sink: &mut DiagnosticSink) {
    if class.members.iter().all(|m| !m.needs_init) {
        return;
    }
    let ids: Vec<TokenId> = tokens.iter_from(class.body_open).take_while(|&id| id != class.body_close).collect();
    let mut i = 0;
    let mut found_ctor = false;
    while i < ids.len() {
        let id = ids[i];
        let tok = tokens.get(id).unwrap();
        let is_ctor = tok.str_is(&class.name);
        let is_assign = tok.str_is("operator=") || (tok.str_is("operator") && ids.get(i + 1).is_some_and(|&n| tokens.get(n).is_some_and(|t| t.str_is("="))));
        if !is_ctor && !is_assign {
            i += 1;
            continue;
        }
        let Some(&open) = ids.get(i + 1).filter(|&&n| tokens.get(n).is_some_and(|t| t.str_is("("))) else {
            i += 1;
            continue;
        };
        let Some(close) = tokens.link(open) else {
            i += 1;
            continue;
        };
        let mut after = tokens.next(close);
        let mut initlist_start = None;
        if tokens.get(after.unwrap_or(open)).is_some_and(|t| t.str_is(":")) {
            initlist_start = after;
            while let Some(a) = after {
                if tokens.get(a).is_some_and(|t| t.str_is("{")) {
                    break;
                }
                after = tokens.next(a);
            }
        }
        let Some(body_open) = after.filter(|&a| tokens.get(a).is_some_and(|t| t.str_is("{"))) else {
            i += 1;
            continue;
        };
        let Some(body_close) = tokens.link(body_open) else {
            i += 1;
            continue;
        };
        if is_ctor {
            found_ctor = true;
        }
        let initialized = collect_initialized(tokens, initlist_start, body_open, body_close, class);
        if initialized.contains(&VarId(0)) {
            // blanket init (`memset(this, …)` / `*this = other`): nothing to report.
            i = ids.iter().position(|&x| x == body_close).unwrap_or(i) + 1;
            continue;
        }
        for m in &class.members {
            if m.needs_init && !initialized.contains(&m.var_id) {
                sink.push(Diagnostic::new(
                    Severity::Style,
                    DiagnosticId::UninitMember,
                    Location::new(tok.file_index, m.line),
                    format!("member variable '{}::{}' is not initialized", class.name, m.name),
                ));
            }
        }
        if is_assign {
            check_operator_eq_return(tokens, body_open, body_close, sink, tok.file_index, tok.line);
        }
        i = ids.iter().position(|&x| x == body_close).unwrap_or(i) + 1;
    }
    if !found_ctor && class.members.iter().any(|m| m.needs_init) {
        sink.push(Diagnostic::new(
            Severity::Style,
            DiagnosticId::NoConstructor,
            Location::new(0, 0),
            format!("class '{}' has no constructor to initialize its members", class.name),
        ));
    }
}

/// `VarId(0)` (the none-sentinel) is reused here as a "blanket initialized
/// everything" marker — never a real member's id, so it cannot collide.
fn collect_initialized(
    tokens: &TokenList,
    initlist_start: Option<TokenId>,
    body_open: TokenId,
    body_close: TokenId,
    class: &ClassDef,
) -> HashSet<VarId> {
    let mut out = HashSet::new();
    if let Some(start) = initlist_start {
        let mut cur = Some(start);
        while let Some(id) = cur {
            if id == body_open {
                break;
            }
            let tok = tokens.get(id).unwrap();
            if tok.var_id.is_some() && tokens.next(id).is_some_and(|n| tokens.get(n).is_some_and(|t| t.str_is("("))) {
                out.insert(tok.var_id);
            }
            cur = tokens.next(id);
        }
    }
    let mut cur = tokens.next(body_open);
    while let Some(id) = cur {
        if id == body_close {
            break;
        }
        let tok = tokens.get(id).unwrap();
        if tok.str_is("memset") {
            if let Some(open) = tokens.next(id).filter(|&n| tokens.get(n).is_some_and(|t| t.str_is("("))) {
                if tokens.next(open).is_some_and(|n| tokens.get(n).is_some_and(|t| t.str_is("this"))) {
                    out.insert(VarId(0));
                }
            }
        }
        if tok.str_is("this") {
            // `*this = other;` blanket-assigns the whole object.
            if tokens.prev(id).is_some_and(|p| tokens.get(p).is_some_and(|t| t.str_is("*")))
                && tokens.next(id).is_some_and(|n| tokens.get(n).is_some_and(|t| t.str_is("=")))
            {
                out.insert(VarId(0));
            }
            // `this->name = …`
            if let Some(arrow) = tokens.next(id).filter(|&n| tokens.get(n).is_some_and(|t| t.str_is("->"))) {
                if let Some(member_id) = tokens.next(arrow) {
                    let member_tok = tokens.get(member_id).unwrap();
                    if member_tok.var_id.is_some() && tokens.next(member_id).is_some_and(|n| tokens.get(n).is_some_and(|t| t.str_is("="))) {
                        out.insert(member_tok.var_id);
                    }
                }
            }
        }
        if tok.var_id.is_some() && class.members.iter().any(|m| m.var_id == tok.var_id) {
            if tokens.next(id).is_some_and(|n| tokens.get(n).is_some_and(|t| t.str_is("="))) {
                out.insert(tok.var_id);
            }
            // `name.clear()` / `name.Clear()`.
            if let Some(dot) = tokens.next(id).filter(|&n| tokens.get(n).is_some_and(|t| t.str_is("."))) {
                if let Some(call) = tokens.next(dot) {
                    let call_tok = tokens.get(call).unwrap();
                    if call_tok.is_one_of(&["clear", "Clear"]) {
                        out.insert(tok.var_id);
                    }
                }
            }
        }
        cur = tokens.next(id);
    }
    out
}

fn check_operator_eq_return(tokens: &TokenList, body_open: TokenId, body_close: TokenId, sink: &mut DiagnosticSink, file_index: usize, line: usize) {
    let mut cur = tokens.next(body_open);
    let mut returns_this = false;
    while let Some(id) = cur {
        if id == body_close {
            break;
        }
        let tok = tokens.get(id).unwrap();
        if tok.str_is("return") {
            if let Some(next) = tokens.next(id) {
                let next_tok = tokens.get(next).unwrap();
                if next_tok.str_is("*") {
                    if let Some(after) = tokens.next(next) {
                        if tokens.get(after).is_some_and(|t| t.str_is("this")) {
                            returns_this = true;
                        }
                    }
                }
            }
        }
        cur = tokens.next(id);
    }
    if !returns_this {
        sink.push(Diagnostic::new(
            Severity::Style,
            DiagnosticId::OperatorEqRetType,
            Location::new(file_index, line),
            "operator= does not return *this".to_string(),
        ));
    }
}

fn check_virtual_destructor(tokens: &TokenList, class: &ClassDef, by_name: &HashMap<&str, &ClassDef>, sink: &mut DiagnosticSink) {
    let Some(base_name) = &class.base else { return };
    let Some(base) = by_name.get(base_name.as_str()) else { return };
    let dtor_name = format!("~{base_name}");
    let ids: Vec<TokenId> = tokens.iter_from(base.body_open).take_while(|&id| id != base.body_close).collect();
    let mut dtor_found = None;
    for (i, &id) in ids.iter().enumerate() {
        let tok = tokens.get(id).unwrap();
        if tok.str_is(&dtor_name) {
            let is_virtual = i >= 1 && tokens.get(ids[i - 1]).is_some_and(|t| t.str_is("virtual"));
            dtor_found = Some(is_virtual);
            break;
        }
    }
    match dtor_found {
        Some(true) | None => {}
        Some(false) => {
            sink.push(Diagnostic::new(
                Severity::Style,
                DiagnosticId::NoVirtualDestructor,
                Location::new(0, 0),
                format!("class '{base_name}' has a non-virtual destructor but is used as a base of '{}'", class.name),
            ));
        }
    }
}

fn check_unused_private_functions(tokens: &TokenList, class: &ClassDef, sink: &mut DiagnosticSink) {
    let ids: Vec<TokenId> = tokens.iter_from(class.body_open).skip(1).take_while(|&id| id != class.body_close).collect();
    let mut access = "private";
    let mut private_fns: HashMap<String, usize> = HashMap::new();
    let mut depth = 0i32;
    let mut i = 0;
    while i < ids.len() {
        let id = ids[i];
        let tok = tokens.get(id).unwrap();
        match tok.text.as_str() {
            "{" => {
                depth += 1;
                i += 1;
                continue;
            }
            "}" => {
                depth -= 1;
                i += 1;
                continue;
            }
            "public" | "protected" | "private" if depth == 0 => {
                access = match tok.text.as_str() {
                    "public" => "public",
                    "protected" => "protected",
                    _ => "private",
                };
                i += 1;
                continue;
            }
            _ => {}
        }
        if depth == 0 && tok.is_name && is_function_like(tokens, &ids, i) && access == "private" && tok.text != class.name && tok.text != format!("~{}", class.name) {
            private_fns.entry(tok.text.clone()).or_insert(tok.line);
        }
        i += 1;
    }
    if private_fns.is_empty() {
        return;
    }
    // Only occurrences inside some method's body (depth >= 1 here, since
    // `depth` counts braces relative to the class body) are uses; the
    // declaration itself sits at depth 0 followed directly by its `(`.
    let mut referenced: HashSet<String> = HashSet::new();
    let mut depth = 0i32;
    let mut j = 0;
    while j < ids.len() {
        let id = ids[j];
        let tok = tokens.get(id).unwrap();
        match tok.text.as_str() {
            "{" => {
                depth += 1;
                j += 1;
                continue;
            }
            "}" => {
                depth -= 1;
                j += 1;
                continue;
            }
            _ => {}
        }
        if depth >= 1 && tok.is_name && private_fns.contains_key(&tok.text) {
            let next = ids.get(j + 1).and_then(|&n| tokens.get(n));
            let prev = if j > 0 { tokens.get(ids[j - 1]) } else { None };
            let looks_like_a_call = next.is_some_and(|t| t.str_is("("));
            let looks_like_a_value = prev.is_some_and(|t| t.is_one_of(&["&", "=", ",", "return"]));
            if looks_like_a_call || looks_like_a_value {
                referenced.insert(tok.text.clone());
            }
        }
        j += 1;
    }
    for (name, line) in &private_fns {
        if !referenced.contains(name) {
            sink.push(Diagnostic::new(
                Severity::Style,
                DiagnosticId::UnusedPrivateFunction,
                Location::new(0, *line),
                format!("private member function '{}::{}' is never used", class.name, name),
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
    fn uninitialized_scalar_member_is_flagged() {
        let sink = run("class F{ int i; public: F(){} };");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::UninitMember));
    }

    #[test]
    fn initializer_list_covers_member() {
        let sink = run("class F{ int i; public: F(): i(0) {} };");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::UninitMember));
    }

    #[test]
    fn direct_assignment_in_body_covers_member() {
        let sink = run("class F{ int i; public: F(){ i = 0; } };");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::UninitMember));
    }

    #[test]
    fn class_typed_member_is_not_flagged() {
        let sink = run("class F{ G g; public: F(){} };");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::UninitMember));
    }

    #[test]
    fn missing_virtual_destructor_is_flagged() {
        let sink = run("class B{ public: ~B(){} }; class D : public B{ public: D(){} };");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::NoVirtualDestructor));
    }

    #[test]
    fn virtual_destructor_is_clean() {
        let sink = run("class B{ public: virtual ~B(){} }; class D : public B{ public: D(){} };");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::NoVirtualDestructor));
    }

    #[test]
    fn unused_private_function_is_flagged() {
        let sink = run("class F{ private: void helper(){} public: void run(){} };");
        assert!(sink.records().iter().any(|d| d.id == DiagnosticId::UnusedPrivateFunction));
    }

    #[test]
    fn private_function_called_from_public_method_is_not_flagged() {
        let sink = run("class F{ private: void helper(){} public: void run(){ helper(); } };");
        assert!(!sink.records().iter().any(|d| d.id == DiagnosticId::UnusedPrivateFunction));
    }
}
