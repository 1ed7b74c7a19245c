//! Shared vocabulary for text processing and reporting.
//!
//! These types cross crate boundaries: the composer in `rdslink-text`
//! produces them and the pipeline and notification sinks in `rdslink`
//! consume them.

use std::fmt;

/// Maximum RadioText length accepted by the encoder's `TEXT=` command.
pub const MAX_TEXT_LEN: usize = 64;

/// Separator placed between the artist and title in composed text.
pub const SEPARATOR: &str = " - ";

/// A half-open character range `[start, start + len)` inside a string.
///
/// Composed text is ASCII-only, so character and byte offsets coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// Offset of the first character.
    pub start: usize,
    /// Number of characters covered.
    pub len: usize,
}

impl Span {
    /// Create a span.
    pub const fn new(start: usize, len: usize) -> Self {
        Span { start, len }
    }

    /// One past the last covered offset.
    pub const fn end(&self) -> usize {
        self.start + self.len
    }

    /// Whether the span covers nothing.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Clip this span so it does not extend past `limit`.
    ///
    /// A span that starts at or beyond the limit collapses to length zero
    /// and keeps its start offset.
    pub fn clip(self, limit: usize) -> Self {
        if self.start >= limit {
            Span::new(self.start, 0)
        } else {
            Span::new(self.start, self.len.min(limit - self.start))
        }
    }

    /// Slice `text` by this span, returning `""` when out of range.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        text.get(self.start..self.end()).unwrap_or("")
    }
}

/// Which metadata field a span or tag refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// The performing artist.
    Artist,
    /// The track title.
    Title,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Artist => write!(f, "artist"),
            Field::Title => write!(f, "title"),
        }
    }
}

/// Why composed text differs from the raw input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// Non-ASCII or control characters were transliterated or replaced.
    Normalized,
    /// Denylisted words were masked.
    Censored,
    /// Both of the above.
    Both,
}

impl Reason {
    /// Combine the two independent change flags into a reason, if any.
    pub fn from_flags(normalized: bool, censored: bool) -> Option<Self> {
        match (normalized, censored) {
            (true, true) => Some(Reason::Both),
            (true, false) => Some(Reason::Normalized),
            (false, true) => Some(Reason::Censored),
            (false, false) => None,
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reason::Normalized => write!(f, "normalized"),
            Reason::Censored => write!(f, "censored"),
            Reason::Both => write!(f, "both"),
        }
    }
}

/// A non-fatal loss of fidelity while preparing a track for the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degradation {
    /// The processed text exceeded [`MAX_TEXT_LEN`] and was cut.
    Truncated {
        /// Length before the cut.
        original_len: usize,
    },
    /// A field ended up with no visible characters, so its RT+ tag is omitted.
    TagDropped(Field),
    /// An RT+ tag length exceeded its bit field and was clamped.
    Clamped {
        /// The field whose tag was clamped.
        field: Field,
        /// The computed length.
        requested: usize,
        /// The length actually sent.
        sent: u8,
    },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degradation::Truncated { original_len } => {
                write!(f, "truncated from {original_len} to {MAX_TEXT_LEN} characters")
            }
            Degradation::TagDropped(field) => write!(f, "{field} tag dropped"),
            Degradation::Clamped {
                field,
                requested,
                sent,
            } => write!(f, "{field} tag length clamped from {requested} to {sent}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_end_and_empty() {
        let s = Span::new(11, 9);
        assert_eq!(s.end(), 20);
        assert!(!s.is_empty());
        assert!(Span::new(3, 0).is_empty());
    }

    #[test]
    fn span_clip_inside_limit_is_unchanged() {
        assert_eq!(Span::new(0, 8).clip(64), Span::new(0, 8));
    }

    #[test]
    fn span_clip_crossing_limit_shrinks() {
        assert_eq!(Span::new(60, 10).clip(64), Span::new(60, 4));
    }

    #[test]
    fn span_clip_past_limit_collapses() {
        assert_eq!(Span::new(70, 5).clip(64), Span::new(70, 0));
        assert_eq!(Span::new(64, 5).clip(64), Span::new(64, 0));
    }

    #[test]
    fn span_slice() {
        let text = "Owl City - Fireflies";
        assert_eq!(Span::new(0, 8).slice(text), "Owl City");
        assert_eq!(Span::new(11, 9).slice(text), "Fireflies");
        assert_eq!(Span::new(30, 2).slice(text), "");
    }

    #[test]
    fn reason_from_flags() {
        assert_eq!(Reason::from_flags(false, false), None);
        assert_eq!(Reason::from_flags(true, false), Some(Reason::Normalized));
        assert_eq!(Reason::from_flags(false, true), Some(Reason::Censored));
        assert_eq!(Reason::from_flags(true, true), Some(Reason::Both));
    }

    #[test]
    fn degradation_display() {
        assert_eq!(
            Degradation::Truncated { original_len: 80 }.to_string(),
            "truncated from 80 to 64 characters"
        );
        assert_eq!(
            Degradation::TagDropped(Field::Title).to_string(),
            "title tag dropped"
        );
        assert_eq!(
            Degradation::Clamped {
                field: Field::Title,
                requested: 40,
                sent: 31
            }
            .to_string(),
            "title tag length clamped from 40 to 31"
        );
    }
}
