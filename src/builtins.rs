//! Built-in function classification tables (`spec.md` §6). Reproduced
//! exactly as listed there, since the test suite's scenarios depend on the
//! set being bit-identical. Modeled as `phf` static sets/maps — grounded on
//! `thag_rs::ast::FILTER_WORDS`'s use of `phf::phf_set!` for a compile-time
//! keyword table.

use phf::{phf_map, phf_set};

use crate::flow::reduced::AllocKind;

/// What a call to a known function means for the variable it returns into,
/// or the variable passed as its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionRole {
    /// Returns a freshly allocated resource of the given kind.
    Allocates(AllocKind),
    /// Releases the resource passed as its first pointer/handle argument.
    Deallocates(AllocKind),
    /// Known not to affect allocation state of a variable passed to it
    /// (string/memory/I/O/arithmetic library calls, `spec.md` §4.5).
    Neutral,
}

/// Allocators returning heap memory (`spec.md` §6). The C standard-library
/// family (`malloc`/`free`) and the kernel/Glib family (`kmalloc`/`kfree`,
/// `g_malloc`/`g_free`) are kept as distinct [`AllocKind`]s even though both
/// are "heap scalar" memory: mixing them (e.g. `kmalloc` released with
/// plain `free`) is exactly the kind of mismatch `spec.md` §4.7 rule 7 is
/// for. `new`/`new[]` are handled syntactically by the tokenizer (they are
/// keywords, not call expressions) and get their own [`AllocKind::HeapScalar`]
/// / [`AllocKind::HeapArray`] — see `flow::lowering`.
pub static ALLOCATORS: phf::Map<&'static str, AllocKind> = phf_map! {
    "malloc" => AllocKind::HeapLegacy,
    "calloc" => AllocKind::HeapLegacy,
    "strdup" => AllocKind::HeapLegacy,
    "strndup" => AllocKind::HeapLegacy,
    "realloc" => AllocKind::HeapLegacy,
    "kmalloc" => AllocKind::HeapExtern,
    "kzalloc" => AllocKind::HeapExtern,
    "kcalloc" => AllocKind::HeapExtern,
    "g_new" => AllocKind::HeapExtern,
    "g_new0" => AllocKind::HeapExtern,
    "g_malloc" => AllocKind::HeapExtern,
    "g_malloc0" => AllocKind::HeapExtern,
    "g_try_malloc" => AllocKind::HeapExtern,
    "g_try_malloc0" => AllocKind::HeapExtern,
    "g_strdup" => AllocKind::HeapExtern,
    "g_strndup" => AllocKind::HeapExtern,
    "g_realloc" => AllocKind::HeapExtern,
    "fopen" => AllocKind::File,
    "tmpfile" => AllocKind::File,
    "open" => AllocKind::FileDescriptor,
    "openat" => AllocKind::FileDescriptor,
    "creat" => AllocKind::FileDescriptor,
    "mkstemp" => AllocKind::FileDescriptor,
    "mkostemp" => AllocKind::FileDescriptor,
    "popen" => AllocKind::Pipe,
    "opendir" => AllocKind::Directory,
    "fdopendir" => AllocKind::Directory,
};

/// Closers (`spec.md` §6). `delete`/`delete[]` are also recognized
/// syntactically (`delete` is a keyword, not a call) — see `flow::lowering`.
pub static CLOSERS: phf::Map<&'static str, AllocKind> = phf_map! {
    "free" => AllocKind::HeapLegacy,
    "kfree" => AllocKind::HeapExtern,
    "g_free" => AllocKind::HeapExtern,
    "fclose" => AllocKind::File,
    "fcloseall" => AllocKind::File,
    "close" => AllocKind::FileDescriptor,
    "pclose" => AllocKind::Pipe,
    "closedir" => AllocKind::Directory,
};

/// Functions neutral for leak tracking: calling them with `var` as an
/// argument does not count as a use that prevents the "no dealloc, no use"
/// leak witness, nor as an allocation or deallocation.
pub static NEUTRAL: phf::Set<&'static str> = phf_set! {
    // string family
    "strlen", "strcmp", "strncmp", "strcpy", "strncpy", "strcat", "strncat",
    "strchr", "strrchr", "strstr", "strtok", "sprintf", "snprintf", "vsprintf",
    "vsnprintf", "strtol", "strtoul", "strtod", "atoi", "atol", "atof",
    // memory family
    "memcpy", "memmove", "memset", "memcmp", "memchr",
    // I/O family
    "printf", "fprintf", "puts", "fputs", "putchar", "fread", "fwrite",
    "fgets", "fputc", "fgetc", "fflush", "fseek", "ftell", "rewind", "feof",
    "ferror", "perror", "read", "write", "ioctl", "fcntl", "lseek",
    // arithmetic / misc library calls
    "abs", "labs", "floor", "ceil", "pow", "sqrt", "rand", "srand", "exit",
    "assert", "qsort", "bsearch",
};

/// Function names the leak analyzer treats as recursive and therefore
/// refuses to descend into (`spec.md` §4.5 "known-recursive"); a var-carrying
/// argument to one of these is conservatively a `use`.
pub static KNOWN_RECURSIVE: phf::Set<&'static str> = phf_set! {
    "qsort", "bsearch",
};

#[must_use]
pub fn classify(name: &str) -> Option<FunctionRole> {
    if let Some(kind) = ALLOCATORS.get(name) {
        return Some(FunctionRole::Allocates(*kind));
    }
    if let Some(kind) = CLOSERS.get(name) {
        return Some(FunctionRole::Deallocates(*kind));
    }
    if NEUTRAL.contains(name) {
        return Some(FunctionRole::Neutral);
    }
    None
}

#[must_use]
pub fn is_known_recursive(name: &str) -> bool {
    KNOWN_RECURSIVE.contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malloc_allocates_heap_legacy() {
        assert_eq!(
            classify("malloc"),
            Some(FunctionRole::Allocates(AllocKind::HeapLegacy))
        );
    }

    #[test]
    fn free_deallocates_heap_legacy() {
        assert_eq!(
            classify("free"),
            Some(FunctionRole::Deallocates(AllocKind::HeapLegacy))
        );
    }

    #[test]
    fn kmalloc_and_malloc_are_distinct_families() {
        assert_ne!(classify("kmalloc"), classify("malloc"));
        assert_eq!(
            classify("kmalloc"),
            Some(FunctionRole::Allocates(AllocKind::HeapExtern))
        );
    }

    #[test]
    fn fopen_and_fclose_pair_on_file_kind() {
        assert_eq!(classify("fopen"), Some(FunctionRole::Allocates(AllocKind::File)));
        assert_eq!(classify("fclose"), Some(FunctionRole::Deallocates(AllocKind::File)));
    }

    #[test]
    fn unknown_function_is_none() {
        assert_eq!(classify("frobnicate"), None);
    }

    #[test]
    fn strcpy_is_neutral() {
        assert_eq!(classify("strcpy"), Some(FunctionRole::Neutral));
    }
}
