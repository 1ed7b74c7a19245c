//! Whole-word profanity masking.
//!
//! [`ProfanityFilter`] scans text for words on a denylist and replaces each
//! hit with a same-length run of the mask character, so spans computed
//! before filtering stay valid after it. Matching is case-insensitive and
//! whole-word only: a denylisted word embedded in a longer word is left
//! alone.
//!
//! A word is a maximal run of ASCII letters, digits and `_`, which is what
//! a regex `\b` boundary sees. The filter runs after normalization, so
//! accented look-alikes have already been folded to ASCII.
//!
//! Filtering is best effort, not moderation.
//!
//! # Reloading
//!
//! The denylist lives behind an `Arc` and is never mutated. To change it,
//! build a new filter with [`ProfanityFilter::with_words`] and swap it in.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, TextError, ensure_printable};

/// Character used to mask denylisted words by default.
pub const DEFAULT_MASK: char = '*';

/// Result of filtering one string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filtered {
    /// The text with denylisted words masked.
    pub text: String,
    /// Whether any word was masked.
    pub changed: bool,
    /// The matched words as they appeared in the input, in order.
    pub matches: Vec<String>,
}

/// Masks denylisted words.
#[derive(Debug, Clone)]
pub struct ProfanityFilter {
    enabled: bool,
    mask: char,
    words: Arc<HashSet<String>>,
}

impl Default for ProfanityFilter {
    fn default() -> Self {
        ProfanityFilter {
            enabled: true,
            mask: DEFAULT_MASK,
            words: Arc::new(HashSet::new()),
        }
    }
}

impl ProfanityFilter {
    /// Create an enabled filter from a list of words.
    ///
    /// Entries are trimmed and lowercased. Empty entries are skipped; entries
    /// containing non-word characters can never match a single token and are
    /// skipped with a warning.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ProfanityFilter {
            words: Arc::new(build_set(words)),
            ..ProfanityFilter::default()
        }
    }

    /// Create a filter that passes all text through untouched.
    pub fn disabled() -> Self {
        ProfanityFilter {
            enabled: false,
            ..ProfanityFilter::default()
        }
    }

    /// Use a different mask character.
    pub fn with_mask(mut self, mask: char) -> Result<Self> {
        self.mask = ensure_printable("mask", mask)?;
        Ok(self)
    }

    /// Enable or disable filtering without touching the denylist.
    pub fn set_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Build a new filter with the same settings and a replacement denylist.
    pub fn with_words<I, S>(&self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ProfanityFilter {
            enabled: self.enabled,
            mask: self.mask,
            words: Arc::new(build_set(words)),
        }
    }

    /// Whether the filter masks anything at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Number of words on the denylist.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the denylist is empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Mask denylisted words in `input`.
    ///
    /// # Example
    ///
    /// ```
    /// use rdslink_text::profanity::ProfanityFilter;
    ///
    /// let filter = ProfanityFilter::new(["darn"]);
    /// let out = filter.filter("Darn It (Darnation Mix)");
    /// assert_eq!(out.text, "**** It (Darnation Mix)");
    /// assert!(out.changed);
    /// ```
    pub fn filter(&self, input: &str) -> Filtered {
        if !self.enabled || self.words.is_empty() {
            return Filtered {
                text: input.to_string(),
                changed: false,
                matches: Vec::new(),
            };
        }

        let mut text = String::with_capacity(input.len());
        let mut matches = Vec::new();
        let mut token = String::new();

        for ch in input.chars() {
            if is_word_char(ch) {
                token.push(ch);
            } else {
                self.flush_token(&mut token, &mut text, &mut matches);
                text.push(ch);
            }
        }
        self.flush_token(&mut token, &mut text, &mut matches);

        if !matches.is_empty() {
            tracing::info!(count = matches.len(), "Masked denylisted words");
        }

        Filtered {
            changed: !matches.is_empty(),
            text,
            matches,
        }
    }

    fn flush_token(&self, token: &mut String, out: &mut String, matches: &mut Vec<String>) {
        if token.is_empty() {
            return;
        }
        if self.words.contains(&token.to_ascii_lowercase()) {
            out.extend(std::iter::repeat_n(self.mask, token.chars().count()));
            matches.push(std::mem::take(token));
        } else {
            out.push_str(token);
            token.clear();
        }
    }
}

/// Load a denylist from a file.
///
/// Files ending in `.json` must contain a JSON array of strings. Anything
/// else is read as one word per line, with blank lines and `#` comments
/// ignored.
pub fn load_denylist(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path).map_err(|source| TextError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let words = if is_json {
        serde_json::from_str::<Vec<String>>(&contents).map_err(|source| TextError::Json {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect()
    };

    tracing::debug!(path = %path.display(), count = words.len(), "Loaded denylist");
    Ok(words)
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || ch == '_'
}

fn build_set<I, S>(words: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut set = HashSet::new();
    for word in words {
        let word = word.as_ref().trim();
        if word.is_empty() {
            continue;
        }
        if !word.chars().all(is_word_char) {
            tracing::warn!(word = %word, "Skipping denylist entry that is not a single word");
            continue;
        }
        set.insert(word.to_ascii_lowercase());
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn filter() -> ProfanityFilter {
        ProfanityFilter::new(["heck", "darn", "frick"])
    }

    #[test]
    fn masks_whole_words_case_insensitively() {
        let out = filter().filter("What The HECK Is Going On");
        assert_eq!(out.text, "What The **** Is Going On");
        assert!(out.changed);
        assert_eq!(out.matches, vec!["HECK".to_string()]);
    }

    #[test]
    fn does_not_mask_inside_longer_words() {
        let out = filter().filter("Darnell Plays Checkers In Heckmondwike");
        assert_eq!(out.text, "Darnell Plays Checkers In Heckmondwike");
        assert!(!out.changed);
        assert!(out.matches.is_empty());
    }

    #[test]
    fn punctuation_separates_tokens() {
        let out = filter().filter("darn!heck,frick's (darn)");
        assert_eq!(out.text, "****!****,*****'s (****)");
        assert_eq!(out.matches.len(), 4);
    }

    #[test]
    fn mask_preserves_length_and_surrounding_case() {
        let input = "Oh Darn, Said Frick";
        let out = filter().filter(input);
        assert_eq!(out.text.len(), input.len());
        assert_eq!(out.text, "Oh ****, Said *****");
    }

    #[test]
    fn word_at_end_of_input_is_masked() {
        assert_eq!(filter().filter("well heck").text, "well ****");
    }

    #[test]
    fn disabled_filter_passes_through() {
        let f = filter().set_enabled(false);
        let out = f.filter("heck");
        assert_eq!(out.text, "heck");
        assert!(!out.changed);
        assert!(!ProfanityFilter::disabled().is_enabled());
    }

    #[test]
    fn empty_denylist_never_changes_text() {
        let out = ProfanityFilter::default().filter("anything goes");
        assert!(!out.changed);
    }

    #[test]
    fn custom_mask() {
        let f = filter().with_mask('#').unwrap();
        assert_eq!(f.filter("heck").text, "####");
        assert!(filter().with_mask('\u{0}').is_err());
    }

    #[test]
    fn denylist_entries_are_normalized() {
        let f = ProfanityFilter::new(["  Heck ", "", "two words", "d-arn"]);
        assert_eq!(f.len(), 1);
        assert_eq!(f.filter("HECK").text, "****");
    }

    #[test]
    fn with_words_replaces_the_list_without_touching_the_original() {
        let original = filter();
        let reloaded = original.with_words(["gosh"]);
        assert_eq!(reloaded.filter("gosh heck").text, "**** heck");
        assert_eq!(original.filter("gosh heck").text, "gosh ****");
    }

    #[test]
    fn load_json_denylist() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"["heck", "Darn"]"#).unwrap();
        let words = load_denylist(file.path()).unwrap();
        assert_eq!(words, vec!["heck".to_string(), "Darn".to_string()]);
    }

    #[test]
    fn load_text_denylist_skips_comments_and_blanks() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "# station denylist").unwrap();
        writeln!(file, "heck").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  darn  ").unwrap();
        let words = load_denylist(file.path()).unwrap();
        assert_eq!(words, vec!["heck".to_string(), "darn".to_string()]);
    }

    #[test]
    fn load_malformed_json_denylist_fails() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"heck": true}}"#).unwrap();
        assert!(matches!(
            load_denylist(file.path()),
            Err(TextError::Json { .. })
        ));
    }

    #[test]
    fn load_missing_denylist_fails() {
        let err = load_denylist(Path::new("/nonexistent/words.json")).unwrap_err();
        assert!(matches!(err, TextError::Io { .. }));
    }
}
