//! Unicode to printable-ASCII transliteration.
//!
//! RDS receivers only render a narrow ASCII subset reliably, and the
//! encoder's `TEXT=` command accepts nothing else. [`Normalizer`] maps every
//! code point onto printable ASCII (0x20..=0x7E):
//!
//! - printable ASCII passes through untouched
//! - tab, newline, carriage return and form feed become a space
//! - other ASCII control characters and DEL become the placeholder
//! - non-ASCII code points are transliterated with [`deunicode`]; a code
//!   point with no transliteration becomes the placeholder
//!
//! The mapping is lossy and deterministic. It works one code point at a
//! time, so normalizing two strings and joining them gives the same result
//! as joining and then normalizing.

use crate::error::{Result, ensure_printable};

/// Placeholder used when a code point has no ASCII approximation.
pub const DEFAULT_PLACEHOLDER: char = '?';

/// Result of normalizing one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// The printable-ASCII output.
    pub text: String,
    /// Whether the output differs from the input.
    pub changed: bool,
    /// Distinct non-ASCII or control characters that were rewritten, in
    /// order of first appearance.
    pub replaced: Vec<char>,
}

/// Transliterates arbitrary text to printable ASCII.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    placeholder: char,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            placeholder: DEFAULT_PLACEHOLDER,
        }
    }
}

impl Normalizer {
    /// Create a normalizer with a custom placeholder.
    ///
    /// The placeholder must itself be printable ASCII.
    pub fn new(placeholder: char) -> Result<Self> {
        Ok(Normalizer {
            placeholder: ensure_printable("placeholder", placeholder)?,
        })
    }

    /// The placeholder substituted for unmappable code points.
    pub fn placeholder(&self) -> char {
        self.placeholder
    }

    /// Normalize `input` to printable ASCII.
    ///
    /// # Example
    ///
    /// ```
    /// use rdslink_text::normalize::Normalizer;
    ///
    /// let out = Normalizer::default().normalize("Beyoncé");
    /// assert_eq!(out.text, "Beyonce");
    /// assert!(out.changed);
    /// assert_eq!(out.replaced, vec!['é']);
    /// ```
    pub fn normalize(&self, input: &str) -> Normalized {
        let mut text = String::with_capacity(input.len());
        let mut replaced: Vec<char> = Vec::new();

        for ch in input.chars() {
            if ch == ' ' || ch.is_ascii_graphic() {
                text.push(ch);
                continue;
            }

            if !replaced.contains(&ch) {
                replaced.push(ch);
            }

            match ch {
                '\t' | '\n' | '\r' | '\x0C' => text.push(' '),
                c if c.is_ascii() => text.push(self.placeholder),
                c => self.transliterate(c, &mut text),
            }
        }

        Normalized {
            changed: !replaced.is_empty(),
            text,
            replaced,
        }
    }

    fn transliterate(&self, ch: char, out: &mut String) {
        let before = out.len();
        if let Some(ascii) = deunicode::deunicode_char(ch) {
            // Transliterations are ASCII but not always printable.
            out.extend(
                ascii
                    .chars()
                    .filter(|c| *c == ' ' || c.is_ascii_graphic()),
            );
        }
        if out.len() == before {
            out.push(self.placeholder);
        }
    }
}
