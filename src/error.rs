//! Error type shared by the parsing entry points.

use thiserror::Error;

/// Convenience alias used by the parsing entry points.
pub type Result<T> = std::result::Result<T, ParseError>;

/// Errors emitted while turning document text into a plan tree.
///
/// Parsing is all-or-nothing at the document level: anything beneath the
/// well-formedness check degrades to defaults instead of failing, so a
/// missing element or an unparseable attribute never surfaces here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input is not well-formed XML. Carries the underlying parser's
    /// diagnostic text; no partial document is produced.
    #[error("malformed XML: {0}")]
    Malformed(String),
    /// The input bytes could not be decoded as UTF-8 or UTF-16 text.
    #[error("undecodable input: {0}")]
    Encoding(String),
}
