//! The pattern matcher: a small, compiled DSL for matching token sequences
//! (`spec.md` §2 "Pattern matcher", §4.2). `spec.md` §9 asks for "a compiled
//! matcher (parse pattern once, produce a step-machine) rather than
//! re-parsing on every scan" — [`Pattern::compile`] does the parse once and
//! [`Pattern::match_at`]/[`Pattern::find_match`] are pure step functions over
//! that compiled form.

use crate::token::{TokenList, VarId};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Elem {
    /// An exact literal word, e.g. `if`, `{`, `;`.
    Literal(String),
    /// `%var%`: any name token.
    AnyVar,
    /// `%type%`: any name token that is not the reserved word `delete`.
    AnyType,
    /// `%num%`: any numeric literal.
    AnyNum,
    /// `%str%`: any string literal.
    AnyStr,
    /// `%bool%`: the words `true` or `false`.
    AnyBool,
    /// `%any%`: any single token.
    AnyToken,
    /// `%varid%`: a name whose variable-ID equals the id passed to the match call.
    VarId,
    /// `%var1%`: a name with the same text as the first `%var%`/`%var1%`
    /// captured earlier in this same pattern.
    BackrefVar,
    /// `a|b|c`, where an empty alternative (`|a|`) matches zero tokens.
    Alternatives(Vec<Option<String>>),
    /// `[abc]`: a single-character token whose character is in the set.
    CharSet(Vec<char>),
    /// `!!x`: the position is valid and the token text is not `x`.
    NotExact(String),
}

/// A pattern, parsed once from its space-separated textual form.
#[derive(Debug, Clone)]
pub struct Pattern {
    elems: Vec<Elem>,
}

fn parse_elem(word: &str) -> Elem {
    match word {
        "%var%" => Elem::AnyVar,
        "%type%" => Elem::AnyType,
        "%num%" => Elem::AnyNum,
        "%str%" => Elem::AnyStr,
        "%bool%" => Elem::AnyBool,
        "%any%" => Elem::AnyToken,
        "%varid%" => Elem::VarId,
        "%var1%" => Elem::BackrefVar,
        _ if word.starts_with("!!") && word.len() > 2 => Elem::NotExact(word[2..].to_string()),
        _ if word.starts_with('[') && word.ends_with(']') && word.len() >= 2 => {
            Elem::CharSet(word[1..word.len() - 1].chars().collect())
        }
        _ if word.contains('|') => {
            let alts = word
                .split('|')
                .map(|a| if a.is_empty() { None } else { Some(a.to_string()) })
                .collect();
            Elem::Alternatives(alts)
        }
        _ => Elem::Literal(word.to_string()),
    }
}

impl Pattern {
    /// Parses a space-separated pattern once into a step-machine.
    #[must_use]
    pub fn compile(pattern: &str) -> Self {
        let elems = pattern.split_whitespace().map(parse_elem).collect();
        Self { elems }
    }

    /// Attempts to match the whole pattern starting exactly at `start`.
    /// Returns the token id immediately after the match (which may be "one
    /// past the end" conceptually represented as `None` internally, but
    /// since we need a concrete id we return the id of the last matched
    /// token plus bookkeeping via `find_match`'s caller). For simplicity and
    /// testability we return `Some(last_matched_id)` on match, or the
    /// position where the match would continue when it consumes zero
    /// trailing tokens (alternatives with empty choice).
    #[must_use]
    pub fn match_at(&self, tokens: &TokenList, start: TokenId0, varid: VarId) -> MatchResult {
        let mut cursor = Some(start.0);
        let mut backref: Option<String> = None;
        let mut last_consumed: Option<crate::token::TokenId> = None;

        for elem in &self.elems {
            match elem {
                Elem::Alternatives(alts) => {
                    // Try non-empty alternatives first (greedy); an empty
                    // alternative (`|a|`) is zero-width and only taken when
                    // no non-empty alternative matches the current token.
                    let mut matched = false;
                    for alt in alts.iter().flatten() {
                        if let Some(pos) = cursor {
                            if tokens.get(pos).is_some_and(|t| t.str_is(alt)) {
                                last_consumed = Some(pos);
                                cursor = tokens.next(pos);
                                matched = true;
                                break;
                            }
                        }
                    }
                    if !matched && !alts.iter().any(Option::is_none) {
                        return MatchResult::NoMatch;
                    }
                    // else: zero-width match, position unchanged.
                }
                _ => {
                    let Some(pos) = cursor else {
                        return MatchResult::NoMatch;
                    };
                    let Some(tok) = tokens.get(pos) else {
                        return MatchResult::NoMatch;
                    };
                    let ok = match elem {
                        Elem::Literal(word) => tok.str_is(word),
                        Elem::AnyVar => tok.is_name,
                        Elem::AnyType => tok.is_name && tok.text != "delete",
                        Elem::AnyNum => tok.is_number,
                        Elem::AnyStr => tok.is_string,
                        Elem::AnyBool => tok.is_boolean,
                        Elem::AnyToken => true,
                        Elem::VarId => tok.is_name && varid.is_some() && tok.var_id == varid,
                        Elem::BackrefVar => {
                            tok.is_name && backref.as_deref() == Some(tok.text.as_str())
                        }
                        Elem::CharSet(chars) => {
                            tok.text.chars().count() == 1
                                && chars.contains(&tok.text.chars().next().unwrap())
                        }
                        Elem::NotExact(word) => !tok.str_is(word),
                        Elem::Alternatives(_) => unreachable!("handled above"),
                    };
                    if !ok {
                        return MatchResult::NoMatch;
                    }
                    if matches!(elem, Elem::AnyVar | Elem::BackrefVar) && backref.is_none() {
                        backref = Some(tok.text.clone());
                    }
                    last_consumed = Some(pos);
                    cursor = tokens.next(pos);
                }
            }
        }

        match last_consumed {
            Some(id) => MatchResult::Matched { last: id },
            None => MatchResult::MatchedEmpty,
        }
    }

    /// Returns the first position at or after `start` matching the whole
    /// pattern, or `None`.
    #[must_use]
    pub fn find_match(
        &self,
        tokens: &TokenList,
        start: crate::token::TokenId,
        varid: VarId,
    ) -> Option<crate::token::TokenId> {
        let mut cur = Some(start);
        while let Some(pos) = cur {
            if self.match_at(tokens, TokenId0(pos), varid).is_match() {
                return Some(pos);
            }
            cur = tokens.next(pos);
        }
        None
    }
}

/// Thin wrapper so `match_at`'s signature reads `TokenId0` at call sites
/// without importing `crate::token::TokenId` twice; `.0` is the real id.
#[derive(Debug, Clone, Copy)]
pub struct TokenId0(pub crate::token::TokenId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    Matched { last: crate::token::TokenId },
    MatchedEmpty,
}

impl MatchResult {
    #[must_use]
    pub fn is_match(self) -> bool {
        !matches!(self, MatchResult::NoMatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{Token, TokenList};

    fn build(words: &[&str]) -> TokenList {
        let mut list = TokenList::new();
        for (i, w) in words.iter().enumerate() {
            list.push_back(Token::new(*w, 0, i + 1));
        }
        list
    }

    #[test]
    fn literal_pattern_matches_exact_sequence() {
        let list = build(&["if", "(", "x", ")"]);
        let pat = Pattern::compile("if (");
        let first = list.first().unwrap();
        assert!(pat.match_at(&list, TokenId0(first), VarId::NONE).is_match());
    }

    #[test]
    fn var_pattern_matches_any_name() {
        let list = build(&["foo", "="]);
        let pat = Pattern::compile("%var% =");
        let first = list.first().unwrap();
        assert!(pat.match_at(&list, TokenId0(first), VarId::NONE).is_match());
    }

    #[test]
    fn type_pattern_excludes_delete() {
        let list = build(&["delete", "p"]);
        let pat = Pattern::compile("%type%");
        let first = list.first().unwrap();
        assert!(!pat.match_at(&list, TokenId0(first), VarId::NONE).is_match());
    }

    #[test]
    fn alternatives_match_any_branch() {
        let list = build(&["break", ";"]);
        let pat = Pattern::compile("break|continue ;");
        let first = list.first().unwrap();
        assert!(pat.match_at(&list, TokenId0(first), VarId::NONE).is_match());
    }

    #[test]
    fn empty_alternative_consumes_zero_tokens() {
        // `|const|` followed by `%type%` should match `int` directly.
        let list = build(&["int", "x"]);
        let pat = Pattern::compile("|const| %type%");
        let first = list.first().unwrap();
        assert!(pat.match_at(&list, TokenId0(first), VarId::NONE).is_match());
    }

    #[test]
    fn charset_matches_single_char_punctuators() {
        let list = build(&["+"]);
        let pat = Pattern::compile("[+-]");
        let first = list.first().unwrap();
        assert!(pat.match_at(&list, TokenId0(first), VarId::NONE).is_match());
    }

    #[test]
    fn not_exact_excludes_given_word() {
        let list = build(&["x"]);
        let pat = Pattern::compile("!!delete");
        let first = list.first().unwrap();
        assert!(pat.match_at(&list, TokenId0(first), VarId::NONE).is_match());

        let list2 = build(&["delete"]);
        let first2 = list2.first().unwrap();
        assert!(!pat.match_at(&list2, TokenId0(first2), VarId::NONE).is_match());
    }

    #[test]
    fn varid_pattern_requires_matching_id() {
        let mut list = build(&["x"]);
        let id = list.first().unwrap();
        list.get_mut(id).unwrap().var_id = VarId(7);
        let pat = Pattern::compile("%varid%");
        assert!(pat.match_at(&list, TokenId0(id), VarId(7)).is_match());
        assert!(!pat.match_at(&list, TokenId0(id), VarId(8)).is_match());
    }

    #[test]
    fn find_match_scans_forward() {
        let list = build(&["int", "x", "=", "1", ";"]);
        let pat = Pattern::compile("= %num%");
        let first = list.first().unwrap();
        let found = pat.find_match(&list, first, VarId::NONE);
        assert!(found.is_some());
    }

    #[test]
    fn deterministic_and_idempotent() {
        let list = build(&["if", "(", "x", ")"]);
        let pat = Pattern::compile("if (");
        let first = list.first().unwrap();
        let r1 = pat.match_at(&list, TokenId0(first), VarId::NONE).is_match();
        let r2 = pat.match_at(&list, TokenId0(first), VarId::NONE).is_match();
        assert_eq!(r1, r2);
    }
}
