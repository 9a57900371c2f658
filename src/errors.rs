//! Crate-wide error type.
//!
//! Distinct from [`crate::diagnostics::Diagnostic`]: a `Diagnostic` is an
//! analysis *result* (a possible bug in the code under inspection). A
//! [`CcError`] is a failure of the analyzer itself — a file couldn't be
//! read, a config file didn't parse, the CLI was malformed — that prevents
//! any diagnostics from being produced at all.

use std::borrow::Cow;
use std::fmt;
use std::io;

pub type CcResult<T> = Result<T, CcError>;

#[derive(Debug)]
pub enum CcError {
    /// Wraps a plain message built from a `&'static str`.
    FromStr(Cow<'static, str>),
    /// An I/O failure reading a source, include, or config file.
    Io(io::Error),
    /// A fatal tokenizer error: unmatched bracket, directive that could not
    /// be parsed at all. The translation unit that produced it is abandoned.
    Fatal(String),
    /// Malformed CLI arguments.
    Clap(clap::error::Error),
    /// A `cclint.toml` that failed to deserialize.
    Config(toml::de::Error),
    /// Source bytes that are not valid UTF-8.
    Utf8(std::string::FromUtf8Error),
}

impl From<io::Error> for CcError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<clap::error::Error> for CcError {
    fn from(err: clap::error::Error) -> Self {
        Self::Clap(err)
    }
}

impl From<toml::de::Error> for CcError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err)
    }
}

impl From<std::string::FromUtf8Error> for CcError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::Utf8(err)
    }
}

impl From<String> for CcError {
    fn from(s: String) -> Self {
        Self::FromStr(Cow::Owned(s))
    }
}

impl From<&'static str> for CcError {
    fn from(s: &'static str) -> Self {
        Self::FromStr(Cow::Borrowed(s))
    }
}

impl fmt::Display for CcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FromStr(s) => write!(f, "{s}"),
            Self::Io(e) => write!(f, "{e}"),
            Self::Fatal(msg) => write!(f, "fatal: {msg}"),
            Self::Clap(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "cclint.toml: {e}"),
            Self::Utf8(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Clap(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Utf8(e) => Some(e),
            Self::FromStr(_) | Self::Fatal(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_str_is_displayed_verbatim() {
        let err: CcError = "bad things happened".into();
        assert_eq!(err.to_string(), "bad things happened");
    }

    #[test]
    fn io_error_displays_inner_message() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err: CcError = io_err.into();
        assert!(err.to_string().contains("no such file"));
    }
}
