//! Building the RadioText line for one track.
//!
//! [`Composer::compose`] turns a raw `(artist, title)` pair into a
//! [`ComposedMessage`]: printable ASCII, at most [`MAX_TEXT_LEN`]
//! characters, with the artist and title [`Span`]s located in the final
//! text. The steps are, in order:
//!
//! 1. optional metadata cleanup of each field
//! 2. per-field normalization to printable ASCII
//! 3. joining as `"{artist} - {title}"`
//! 4. profanity masking (same-length, so spans do not move)
//! 5. optional uppercasing (also same-length)
//! 6. truncation to [`MAX_TEXT_LEN`], clipping any span that crosses the cut
//!
//! Spans always describe the text that is actually sent. A field that ends
//! up with no visible characters gets a zero-length span and a
//! [`Degradation::TagDropped`] entry.
//!
//! With cleanup, uppercasing and filtering off, any printable-ASCII input
//! whose joined form fits in 64 characters comes out unchanged.

use rdslink_core::{Degradation, Field, MAX_TEXT_LEN, Reason, SEPARATOR, Span};

use crate::cleanup::MetadataCleaner;
use crate::error::Result;
use crate::normalize::{DEFAULT_PLACEHOLDER, Normalizer};
use crate::profanity::ProfanityFilter;

/// Settings for a [`Composer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposerConfig {
    /// Substitute for code points with no ASCII approximation.
    pub placeholder: char,
    /// Uppercase the composed text.
    pub uppercase: bool,
    /// Strip catalogue decorations before normalizing.
    pub metadata_cleanup: bool,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        ComposerConfig {
            placeholder: DEFAULT_PLACEHOLDER,
            uppercase: false,
            metadata_cleanup: false,
        }
    }
}

/// The outcome of composing one track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    /// The text to send with `TEXT=`.
    pub text: String,
    /// Location of the artist inside `text`.
    pub artist: Span,
    /// Location of the title inside `text`.
    pub title: Span,
    /// The raw input joined the same way, for reporting.
    pub original: String,
    /// Why `text` differs from `original`, if it does beyond truncation and
    /// uppercasing.
    pub reason: Option<Reason>,
    /// Distinct characters the normalizer rewrote.
    pub replaced: Vec<char>,
    /// Words masked by the profanity filter, as they appeared.
    pub censored: Vec<String>,
    /// Non-fatal losses of fidelity.
    pub degradations: Vec<Degradation>,
}

impl ComposedMessage {
    /// Whether normalization, cleanup or masking altered the input.
    pub fn changed(&self) -> bool {
        self.reason.is_some()
    }

    /// Whether the processed text was cut to fit [`MAX_TEXT_LEN`].
    pub fn truncated(&self) -> bool {
        self.degradations
            .iter()
            .any(|d| matches!(d, Degradation::Truncated { .. }))
    }

    /// The span for `field`.
    pub fn span(&self, field: Field) -> Span {
        match field {
            Field::Artist => self.artist,
            Field::Title => self.title,
        }
    }

    /// The visible artist text.
    pub fn artist_text(&self) -> &str {
        self.artist.slice(&self.text)
    }

    /// The visible title text.
    pub fn title_text(&self) -> &str {
        self.title.slice(&self.text)
    }
}

/// Composes RadioText lines from track metadata.
///
/// Cheap to clone; the denylist is shared.
#[derive(Debug, Clone)]
pub struct Composer {
    normalizer: Normalizer,
    filter: ProfanityFilter,
    cleaner: Option<MetadataCleaner>,
    uppercase: bool,
}

impl Default for Composer {
    fn default() -> Self {
        Composer {
            normalizer: Normalizer::default(),
            filter: ProfanityFilter::disabled(),
            cleaner: None,
            uppercase: false,
        }
    }
}

impl Composer {
    /// Create a composer.
    ///
    /// Fails if the placeholder is not printable ASCII or the cleanup
    /// patterns fail to compile.
    pub fn new(config: ComposerConfig, filter: ProfanityFilter) -> Result<Self> {
        let cleaner = if config.metadata_cleanup {
            Some(MetadataCleaner::new()?)
        } else {
            None
        };
        Ok(Composer {
            normalizer: Normalizer::new(config.placeholder)?,
            filter,
            cleaner,
            uppercase: config.uppercase,
        })
    }

    /// The profanity filter in use.
    pub fn filter(&self) -> &ProfanityFilter {
        &self.filter
    }

    /// A copy of this composer using a different filter, for denylist reloads.
    pub fn with_filter(&self, filter: ProfanityFilter) -> Self {
        Composer {
            filter,
            ..self.clone()
        }
    }

    /// Compose the RadioText line for `artist` and `title`.
    ///
    /// # Example
    ///
    /// ```
    /// use rdslink_core::Span;
    /// use rdslink_text::compose::Composer;
    ///
    /// let msg = Composer::default().compose("Owl City", "Fireflies");
    /// assert_eq!(msg.text, "Owl City - Fireflies");
    /// assert_eq!(msg.artist, Span::new(0, 8));
    /// assert_eq!(msg.title, Span::new(11, 9));
    /// assert!(!msg.changed());
    /// ```
    pub fn compose(&self, artist: &str, title: &str) -> ComposedMessage {
        let original = format!("{artist}{SEPARATOR}{title}");

        let (artist, title, cleaned) = match &self.cleaner {
            Some(cleaner) => {
                let a = cleaner.clean_artist(artist);
                let t = cleaner.clean_title(title);
                let cleaned = a != artist || t != title;
                (a, t, cleaned)
            }
            None => (artist.to_string(), title.to_string(), false),
        };

        let artist = self.normalizer.normalize(&artist);
        let title = self.normalizer.normalize(&title);

        let mut replaced = artist.replaced.clone();
        for ch in &title.replaced {
            if !replaced.contains(ch) {
                replaced.push(*ch);
            }
        }

        let joined = format!("{}{SEPARATOR}{}", artist.text, title.text);
        let filtered = self.filter.filter(&joined);
        let mut text = filtered.text;
        if self.uppercase {
            text.make_ascii_uppercase();
        }

        let mut artist_span = Span::new(0, artist.text.len());
        let mut title_span = Span::new(artist.text.len() + SEPARATOR.len(), title.text.len());
        let mut degradations = Vec::new();

        if text.len() > MAX_TEXT_LEN {
            degradations.push(Degradation::Truncated {
                original_len: text.len(),
            });
            text.truncate(MAX_TEXT_LEN);
            artist_span = artist_span.clip(MAX_TEXT_LEN);
            title_span = title_span.clip(MAX_TEXT_LEN);
        }

        if artist_span.is_empty() {
            degradations.push(Degradation::TagDropped(Field::Artist));
        }
        if title_span.is_empty() {
            degradations.push(Degradation::TagDropped(Field::Title));
        }

        let reason = Reason::from_flags(
            cleaned || artist.changed || title.changed,
            filtered.changed,
        );

        tracing::debug!(
            text = %text,
            artist = ?artist_span,
            title = ?title_span,
            reason = ?reason,
            "Composed RadioText"
        );

        ComposedMessage {
            text,
            artist: artist_span,
            title: title_span,
            original,
            reason,
            replaced,
            censored: filtered.matches,
            degradations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composer_with(words: &[&str]) -> Composer {
        Composer::new(ComposerConfig::default(), ProfanityFilter::new(words)).unwrap()
    }

    #[test]
    fn plain_ascii_is_identity() {
        let msg = Composer::default().compose("Owl City", "Fireflies");
        assert_eq!(msg.text, "Owl City - Fireflies");
        assert_eq!(msg.original, msg.text);
        assert_eq!(msg.artist_text(), "Owl City");
        assert_eq!(msg.title_text(), "Fireflies");
        assert!(msg.reason.is_none());
        assert!(msg.degradations.is_empty());
    }

    #[test]
    fn spans_follow_transliteration() {
        // "æ" transliterates to two characters, shifting the title.
        let msg = Composer::default().compose("Mæstro", "Overture");
        assert_eq!(msg.artist_text(), "Maestro");
        assert_eq!(msg.title_text(), "Overture");
        assert_eq!(msg.title.start, 10);
        assert_eq!(msg.reason, Some(Reason::Normalized));
        assert_eq!(msg.replaced, vec!['æ']);
    }

    #[test]
    fn replaced_chars_merge_across_fields() {
        let msg = Composer::default().compose("Björk", "Jóga öö");
        assert_eq!(msg.text, "Bjork - Joga oo");
        assert_eq!(msg.replaced, vec!['ö', 'ó']);
    }

    #[test]
    fn censoring_keeps_spans() {
        let msg = composer_with(&["heck"]).compose("The Band", "What The Heck");
        assert_eq!(msg.text, "The Band - What The ****");
        assert_eq!(msg.title_text(), "What The ****");
        assert_eq!(msg.reason, Some(Reason::Censored));
        assert_eq!(msg.censored, vec!["Heck".to_string()]);
        assert!(msg.changed());
    }

    #[test]
    fn normalized_and_censored_is_both() {
        let msg = composer_with(&["heck"]).compose("Café", "heck");
        assert_eq!(msg.text, "Cafe - ****");
        assert_eq!(msg.reason, Some(Reason::Both));
    }

    #[test]
    fn long_title_is_truncated_and_clipped() {
        let artist = "Artist";
        let title = "T".repeat(80);
        let msg = Composer::default().compose(artist, &title);
        assert_eq!(msg.text.len(), MAX_TEXT_LEN);
        assert_eq!(msg.artist, Span::new(0, 6));
        assert_eq!(msg.title, Span::new(9, 55));
        assert_eq!(
            msg.degradations,
            vec![Degradation::Truncated { original_len: 89 }]
        );
        assert!(msg.truncated());
    }

    #[test]
    fn title_pushed_past_limit_is_dropped() {
        let artist = "A".repeat(70);
        let msg = Composer::default().compose(&artist, "Song");
        assert_eq!(msg.text, "A".repeat(64));
        assert_eq!(msg.artist, Span::new(0, 64));
        assert!(msg.title.is_empty());
        assert_eq!(
            msg.degradations,
            vec![
                Degradation::Truncated { original_len: 77 },
                Degradation::TagDropped(Field::Title),
            ]
        );
    }

    #[test]
    fn empty_fields_drop_their_tags() {
        let msg = Composer::default().compose("", "Untitled");
        assert_eq!(msg.text, " - Untitled");
        assert!(msg.artist.is_empty());
        assert_eq!(msg.title_text(), "Untitled");
        assert_eq!(msg.degradations, vec![Degradation::TagDropped(Field::Artist)]);

        let msg = Composer::default().compose("Solo", "");
        assert_eq!(msg.text, "Solo - ");
        assert_eq!(msg.degradations, vec![Degradation::TagDropped(Field::Title)]);
    }

    #[test]
    fn exactly_sixty_four_characters_is_not_truncated() {
        let title = "x".repeat(MAX_TEXT_LEN - 4);
        let msg = Composer::default().compose("A", &title);
        assert_eq!(msg.text.len(), MAX_TEXT_LEN);
        assert!(msg.degradations.is_empty());
    }

    #[test]
    fn uppercase_option() {
        let config = ComposerConfig {
            uppercase: true,
            ..ComposerConfig::default()
        };
        let composer = Composer::new(config, ProfanityFilter::disabled()).unwrap();
        let msg = composer.compose("Owl City", "Fireflies");
        assert_eq!(msg.text, "OWL CITY - FIREFLIES");
        assert_eq!(msg.title_text(), "FIREFLIES");
        assert!(!msg.changed());
    }

    #[test]
    fn metadata_cleanup_counts_as_normalized() {
        let config = ComposerConfig {
            metadata_cleanup: true,
            ..ComposerConfig::default()
        };
        let composer = Composer::new(config, ProfanityFilter::disabled()).unwrap();
        let msg = composer.compose("The Beatles", "Hey Jude (Remastered 2015)");
        assert_eq!(msg.text, "The Beatles - Hey Jude");
        assert_eq!(msg.reason, Some(Reason::Normalized));
        assert_eq!(msg.original, "The Beatles - Hey Jude (Remastered 2015)");
    }

    #[test]
    fn output_is_printable_and_bounded() {
        let long = "Лебединое озеро ".repeat(8);
        let inputs = [
            ("北京欢迎你", "🎵🎶"),
            ("\u{0}\u{1}", "\t\n"),
            ("Пётр Ильич Чайковский", long.as_str()),
        ];
        let composer = composer_with(&["heck"]);
        for (artist, title) in inputs {
            let msg = composer.compose(artist, title);
            assert!(msg.text.len() <= MAX_TEXT_LEN);
            assert!(msg.text.chars().all(|c| c == ' ' || c.is_ascii_graphic()));
            for span in [msg.artist, msg.title] {
                assert!(span.end() <= msg.text.len() || span.is_empty());
            }
        }
    }

    #[test]
    fn bad_placeholder_is_rejected() {
        let config = ComposerConfig {
            placeholder: '\u{7F}',
            ..ComposerConfig::default()
        };
        assert!(Composer::new(config, ProfanityFilter::disabled()).is_err());
    }

    #[test]
    fn with_filter_swaps_denylist() {
        let composer = composer_with(&["heck"]);
        let reloaded = composer.with_filter(composer.filter().with_words(["gosh"]));
        assert_eq!(reloaded.compose("a", "gosh heck").text, "a - **** heck");
    }
}
