//! The token stream: a doubly-linked sequence of [`Token`]s owned by one
//! arena ([`TokenList`]) per [`crate::tokenizer::Tokenizer`].
//!
//! `spec.md` §9 calls out the original's raw linked pointers with manual
//! `new`/`delete` as a design smell to remove: here every `prev`/`next`/
//! `link` field is an `Option<TokenId>` handle into one `Vec` arena, so
//! there is nothing to leak or dangle, and "delete" just unlinks a slot
//! rather than freeing memory — matching `spec.md` §9's "indices or
//! generational handles replace pointers".

use std::fmt;

/// A stable handle into a [`TokenList`]'s arena. Never reused after a token
/// is erased, so a stale `TokenId` is simply absent rather than aliasing a
/// different token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenId(pub u32);

/// A per-function variable identity (`spec.md` §3 "Variable identity").
/// `0` means "no declared variable" (e.g. a keyword or punctuator token).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VarId(pub u32);

impl VarId {
    pub const NONE: VarId = VarId(0);

    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub is_name: bool,
    pub is_number: bool,
    pub is_boolean: bool,
    pub is_standard_type: bool,
    pub is_string: bool,
    pub is_char: bool,
    pub file_index: usize,
    pub line: usize,
    pub var_id: VarId,
    pub link: Option<TokenId>,
}

/// The standard type-name vocabulary the tokenizer recognizes; any other
/// identifier is a plain name.
const STANDARD_TYPES: &[&str] = &[
    "void", "bool", "char", "short", "int", "long", "float", "double", "signed", "unsigned",
    "size_t", "wchar_t",
];

impl Token {
    #[must_use]
    pub fn new(text: impl Into<String>, file_index: usize, line: usize) -> Self {
        let text = text.into();
        let is_name = text
            .chars()
            .next()
            .is_some_and(|c| c == '_' || c.is_alphabetic());
        let is_number = {
            let mut chars = text.chars();
            let first = if text.starts_with('-') {
                chars.next();
                chars.next()
            } else {
                chars.next()
            };
            first.is_some_and(|c| c.is_ascii_digit())
        };
        let is_boolean = text == "true" || text == "false";
        let is_standard_type = STANDARD_TYPES.contains(&text.as_str());
        let is_string = text.starts_with('"') && text.ends_with('"') && text.len() >= 2;
        let is_char = text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2;
        Self {
            text,
            is_name,
            is_number,
            is_boolean,
            is_standard_type,
            is_string,
            is_char,
            file_index,
            line,
            var_id: VarId::NONE,
            link: None,
        }
    }

    #[must_use]
    pub fn str_is(&self, s: &str) -> bool {
        self.text == s
    }

    #[must_use]
    pub fn is_one_of(&self, options: &[&str]) -> bool {
        options.contains(&self.text.as_str())
    }
}

#[derive(Debug, Clone)]
struct Slot {
    token: Option<Token>, // None once erased
    prev: Option<TokenId>,
    next: Option<TokenId>,
}

/// Owns every [`Token`] for one [`crate::tokenizer::Tokenizer`] run. Tokens
/// are mutated only through these methods (`spec.md` §3's "external
/// components only read" invariant); callers outside this module get `&Token`.
#[derive(Debug, Clone, Default)]
pub struct TokenList {
    slots: Vec<Slot>,
    head: Option<TokenId>,
    tail: Option<TokenId>,
}

impl TokenList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn first(&self) -> Option<TokenId> {
        self.head
    }

    #[must_use]
    pub fn last(&self) -> Option<TokenId> {
        self.tail
    }

    #[must_use]
    pub fn get(&self, id: TokenId) -> Option<&Token> {
        self.slots.get(id.0 as usize).and_then(|s| s.token.as_ref())
    }

    #[must_use]
    pub fn get_mut(&mut self, id: TokenId) -> Option<&mut Token> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(|s| s.token.as_mut())
    }

    #[must_use]
    pub fn next(&self, id: TokenId) -> Option<TokenId> {
        self.slots.get(id.0 as usize).and_then(|s| s.next)
    }

    #[must_use]
    pub fn prev(&self, id: TokenId) -> Option<TokenId> {
        self.slots.get(id.0 as usize).and_then(|s| s.prev)
    }

    #[must_use]
    pub fn link(&self, id: TokenId) -> Option<TokenId> {
        self.get(id).and_then(|t| t.link)
    }

    pub fn set_link(&mut self, a: TokenId, b: TokenId) {
        if let Some(t) = self.get_mut(a) {
            t.link = Some(b);
        }
        if let Some(t) = self.get_mut(b) {
            t.link = Some(a);
        }
    }

    /// Appends a new token at the end of the stream, returning its id.
    pub fn push_back(&mut self, token: Token) -> TokenId {
        let id = TokenId(self.slots.len() as u32);
        self.slots.push(Slot {
            token: Some(token),
            prev: self.tail,
            next: None,
        });
        if let Some(tail) = self.tail {
            self.slots[tail.0 as usize].next = Some(id);
        } else {
            self.head = Some(id);
        }
        self.tail = Some(id);
        id
    }

    /// Inserts `token` immediately after `after`, returning the new id.
    pub fn insert_after(&mut self, after: TokenId, token: Token) -> TokenId {
        let next = self.next(after);
        let id = TokenId(self.slots.len() as u32);
        self.slots.push(Slot {
            token: Some(token),
            prev: Some(after),
            next,
        });
        if let Some(n) = next {
            self.slots[n.0 as usize].prev = Some(id);
        } else {
            self.tail = Some(id);
        }
        self.slots[after.0 as usize].next = Some(id);
        id
    }

    /// Inserts `token` immediately before `before`, returning the new id.
    pub fn insert_before(&mut self, before: TokenId, token: Token) -> TokenId {
        match self.prev(before) {
            Some(p) => self.insert_after(p, token),
            None => {
                let id = TokenId(self.slots.len() as u32);
                self.slots.push(Slot {
                    token: Some(token),
                    prev: None,
                    next: Some(before),
                });
                self.slots[before.0 as usize].prev = Some(id);
                self.head = Some(id);
                id
            }
        }
    }

    /// Unlinks and removes a single token. O(1).
    pub fn erase(&mut self, id: TokenId) {
        let (prev, next) = {
            let slot = &self.slots[id.0 as usize];
            (slot.prev, slot.next)
        };
        match prev {
            Some(p) => self.slots[p.0 as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n.0 as usize].prev = prev,
            None => self.tail = prev,
        }
        self.slots[id.0 as usize].token = None;
        self.slots[id.0 as usize].prev = None;
        self.slots[id.0 as usize].next = None;
    }

    /// Erases `[start, end]` inclusive, in one pass. O(range length).
    pub fn erase_range(&mut self, start: TokenId, end: TokenId) {
        let mut cur = Some(start);
        while let Some(id) = cur {
            let next = self.next(id);
            self.erase(id);
            if id == end {
                break;
            }
            cur = next;
        }
    }

    /// Forward iterator of live token ids starting at (and including) `from`.
    pub fn iter_from(&self, from: TokenId) -> impl Iterator<Item = TokenId> + '_ {
        let mut cur = Some(from);
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.next(id);
            Some(id)
        })
    }

    /// Whole-stream forward iterator.
    pub fn iter(&self) -> impl Iterator<Item = TokenId> + '_ {
        let mut cur = self.head;
        std::iter::from_fn(move || {
            let id = cur?;
            cur = self.next(id);
            Some(id)
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Reconstructs the canonical text of the stream with single spaces
    /// between tokens, for round-trip/idempotence tests (`spec.md` §8).
    #[must_use]
    pub fn stringify(&self) -> String {
        self.iter()
            .map(|id| self.get(id).unwrap().text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Validates the bracket-link bijection invariant from `spec.md` §8:
    /// every `(`/`{`/`[` token's link points at its partner, and vice versa.
    #[must_use]
    pub fn links_are_bijective(&self) -> bool {
        for id in self.iter() {
            let tok = self.get(id).unwrap();
            if let Some(link) = tok.link {
                match self.link(link) {
                    Some(back) if back == id => {}
                    _ => return false,
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tok(s: &str) -> Token {
        Token::new(s, 0, 1)
    }

    #[test]
    fn push_and_iterate_preserves_order() {
        let mut list = TokenList::new();
        list.push_back(tok("int"));
        list.push_back(tok("x"));
        list.push_back(tok(";"));
        let texts: Vec<_> = list
            .iter()
            .map(|id| list.get(id).unwrap().text.clone())
            .collect();
        assert_eq!(texts, vec!["int", "x", ";"]);
    }

    #[test]
    fn erase_is_local_and_keeps_stream_unjagged() {
        let mut list = TokenList::new();
        let a = list.push_back(tok("int"));
        let b = list.push_back(tok("x"));
        let c = list.push_back(tok(";"));
        list.erase(b);
        assert_eq!(list.next(a), Some(c));
        assert_eq!(list.prev(c), Some(a));
        assert_eq!(list.stringify(), "int ;");
    }

    #[test]
    fn set_link_is_mutual() {
        let mut list = TokenList::new();
        let lparen = list.push_back(tok("("));
        let rparen = list.push_back(tok(")"));
        list.set_link(lparen, rparen);
        assert!(list.links_are_bijective());
        assert_eq!(list.link(lparen), Some(rparen));
        assert_eq!(list.link(rparen), Some(lparen));
    }

    #[test]
    fn classification_flags_match_spec() {
        assert!(tok("_foo").is_name);
        assert!(tok("foo").is_name);
        assert!(!tok("123").is_name);
        assert!(tok("123").is_number);
        assert!(tok("-5").is_number);
        assert!(tok("true").is_boolean);
        assert!(!tok("True").is_boolean);
        assert!(tok("int").is_standard_type);
        assert!(!tok("Foo").is_standard_type);
        assert!(tok("\"abc\"").is_string);
        assert!(tok("'a'").is_char);
    }

    #[test]
    fn insert_before_head_updates_head() {
        let mut list = TokenList::new();
        let b = list.push_back(tok("b"));
        let a = list.insert_before(b, tok("a"));
        assert_eq!(list.first(), Some(a));
        assert_eq!(list.stringify(), "a b");
    }
}
