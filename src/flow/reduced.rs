//! The reduced statement language the leak analyzer walks (`spec.md` §3
//! "Reduced statement", §4.5). A reduced-statement stream is a finite,
//! fully materialized `Vec`, never a live iterator, so the reducer
//! (`crate::flow::reducer`) can rewrite it in place and the leak engine
//! (`crate::flow::leak`) can scan it with simple windows.

use crate::token::{TokenId, VarId};

/// What kind of resource an allocation/deallocation concerns. `Many` is a
/// fusion sentinel (`spec.md` §3): when two or more concrete kinds flow into
/// the same variable across paths, downgrade to `Many` so the mismatch
/// check goes silent rather than misreport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocKind {
    HeapScalar,
    HeapArray,
    /// A legacy-style allocator this build recognizes for compatibility but
    /// does not distinguish further (`spec.md`'s `HeapLegacy`).
    HeapLegacy,
    /// The kernel/Glib allocator family (`kmalloc`/`kzalloc`/`g_malloc`, …),
    /// released by its own matching closer (`kfree`/`g_free`) rather than
    /// the C standard library's `free` (`spec.md`'s `HeapExtern`). Tracked
    /// like `HeapLegacy` for leak purposes, but a distinct kind so crossing
    /// families (e.g. `kmalloc` released with plain `free`) is still a
    /// mismatch.
    HeapExtern,
    File,
    FileDescriptor,
    Pipe,
    Directory,
    Many,
}

impl AllocKind {
    /// Fuses two observed kinds for the same variable across paths
    /// (`spec.md` §3). Equal kinds stay themselves; anything else becomes
    /// the silence-inducing `Many`.
    #[must_use]
    pub fn fuse(self, other: AllocKind) -> AllocKind {
        if self == other {
            self
        } else {
            AllocKind::Many
        }
    }

    /// Whether `dealloc_kind` is an acceptable release for `self`
    /// (`spec.md` §4.7 rule 7). `Many` on either side silences the check.
    #[must_use]
    pub fn matches_dealloc(self, dealloc_kind: AllocKind) -> bool {
        self == AllocKind::Many || dealloc_kind == AllocKind::Many || self == dealloc_kind
    }

    /// Whether this is a handle-style resource (file/descriptor/pipe/
    /// directory) rather than plain heap memory — `resourceLeak` is reported
    /// for these instead of `memleak`/`memleakall` (`original_source`'s
    /// `CheckMemoryLeak::leakError`).
    #[must_use]
    pub fn is_resource(self) -> bool {
        matches!(self, AllocKind::File | AllocKind::FileDescriptor | AllocKind::Pipe | AllocKind::Directory)
    }
}

/// One element of the reduced statement stream (`spec.md` §3's tagged
/// variant; `spec.md` §9 "tagged variants in place of `struct` chains with a
/// `next` pointer" — there is no pointer here, just a plain `Vec<ReducedStmt>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReducedKind {
    OpenBrace,
    CloseBrace,
    Decl,
    Alloc(AllocKind),
    Dealloc(AllocKind),
    Realloc(AllocKind),
    Assign,
    Use,
    /// `var[…]` — an indexed read, which survives reduction for
    /// use-after-free detection (`spec.md` §4.5).
    UseIndexed,
    If,
    /// `if (var)` — condition is exactly the variable.
    IfVar,
    /// `if (!var)` — condition is exactly the negated variable.
    IfNotVar,
    /// `if` whose condition mentions the variable through some other
    /// operator (`spec.md`'s `ifv`).
    IfValueDependent,
    Else,
    Switch,
    Case,
    Default,
    Loop,
    Do,
    Break,
    Continue,
    Return,
    /// `return var;` — a return that transfers ownership out, read as a use
    /// that does not itself constitute a leak witness.
    ReturnUse,
    Exit,
    Throw,
    Try,
    Catch,
}

/// One emission in the reduced stream: its kind, the variable it concerns
/// (if any — control-flow markers like `OpenBrace` carry `VarId::NONE`), and
/// the originating token for diagnostic locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducedStmt {
    pub kind: ReducedKind,
    pub var: VarId,
    pub origin: TokenId,
}

impl ReducedStmt {
    #[must_use]
    pub fn new(kind: ReducedKind, var: VarId, origin: TokenId) -> Self {
        Self { kind, var, origin }
    }

    #[must_use]
    pub fn is_alloc(&self) -> bool {
        matches!(self.kind, ReducedKind::Alloc(_))
    }

    #[must_use]
    pub fn is_dealloc(&self) -> bool {
        matches!(self.kind, ReducedKind::Dealloc(_))
    }

    #[must_use]
    pub fn alloc_kind(&self) -> Option<AllocKind> {
        match self.kind {
            ReducedKind::Alloc(k) | ReducedKind::Dealloc(k) | ReducedKind::Realloc(k) => Some(k),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmt(kind: ReducedKind) -> ReducedStmt {
        ReducedStmt::new(kind, VarId(1), TokenId(0))
    }

    #[test]
    fn fuse_of_equal_kinds_is_identity() {
        assert_eq!(AllocKind::HeapScalar.fuse(AllocKind::HeapScalar), AllocKind::HeapScalar);
    }

    #[test]
    fn fuse_of_differing_kinds_is_many() {
        assert_eq!(AllocKind::HeapScalar.fuse(AllocKind::File), AllocKind::Many);
    }

    #[test]
    fn many_silences_mismatch_check() {
        assert!(AllocKind::Many.matches_dealloc(AllocKind::File));
        assert!(AllocKind::HeapScalar.matches_dealloc(AllocKind::Many));
    }

    #[test]
    fn concrete_mismatch_is_detected() {
        assert!(!AllocKind::HeapScalar.matches_dealloc(AllocKind::File));
    }

    #[test]
    fn alloc_kind_accessor_covers_all_resource_variants() {
        assert_eq!(stmt(ReducedKind::Alloc(AllocKind::File)).alloc_kind(), Some(AllocKind::File));
        assert_eq!(stmt(ReducedKind::Dealloc(AllocKind::Pipe)).alloc_kind(), Some(AllocKind::Pipe));
        assert_eq!(stmt(ReducedKind::Use).alloc_kind(), None);
    }

    #[test]
    fn is_resource_covers_handle_kinds_only() {
        assert!(AllocKind::File.is_resource());
        assert!(AllocKind::FileDescriptor.is_resource());
        assert!(AllocKind::Pipe.is_resource());
        assert!(AllocKind::Directory.is_resource());
        assert!(!AllocKind::HeapLegacy.is_resource());
        assert!(!AllocKind::Many.is_resource());
    }
}
