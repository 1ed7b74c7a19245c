//! Error type for the text-processing crate.

use std::path::PathBuf;

/// Errors raised while configuring or loading text-processing state.
///
/// Composition itself never fails; these come from setup (bad placeholder,
/// unreadable denylist) and from decoding RT+ payloads.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// A substitution character is not printable ASCII.
    #[error("invalid {what} character {ch:?}: must be printable ASCII")]
    InvalidChar {
        /// Which setting was rejected (`placeholder`, `mask`).
        what: &'static str,
        /// The offending character.
        ch: char,
    },

    /// An RT+ content type code is out of range or ambiguous.
    #[error("invalid RT+ content type: {0}")]
    InvalidContentType(String),

    /// A denylist file could not be read.
    #[error("failed to read denylist {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A JSON denylist was not an array of strings.
    #[error("failed to parse denylist {path}: {source}")]
    Json {
        /// The file that failed.
        path: PathBuf,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    /// A built-in cleanup pattern failed to compile.
    #[error("cleanup pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// An RT+ payload did not follow the `RT+TAG` grammar.
    #[error("invalid RT+ payload: {0}")]
    InvalidPayload(String),
}

/// A convenience `Result` alias using [`TextError`].
pub type Result<T> = std::result::Result<T, TextError>;

/// Reject anything but printable ASCII (0x20..=0x7E) for substitution chars.
pub(crate) fn ensure_printable(what: &'static str, ch: char) -> Result<char> {
    if ch == ' ' || ch.is_ascii_graphic() {
        Ok(ch)
    } else {
        Err(TextError::InvalidChar { what, ch })
    }
}
