//! Optional removal of catalogue noise from track metadata.
//!
//! Streaming catalogues decorate titles with suffixes like
//! `(Remastered 2011)` or `[Explicit]` that waste RadioText space. The
//! [`MetadataCleaner`] strips a fixed set of them, drops zero-width
//! characters and turns non-breaking spaces into plain spaces.
//!
//! Cleaning runs before normalization and is off by default.

use regex::Regex;

use crate::error::Result;

const ZERO_WIDTH: &str = r"[\x{200B}\x{200C}\x{200D}\x{2060}\x{FEFF}]";

const BRACKETED_SUFFIX: &str = r"(?i)\s*[(\[]\s*(?:(?:\d{4}\s+)?remaster(?:ed)?(?:\s+\d{4})?(?:\s+version)?|live|clean|explicit|(?:feat\.?|ft\.?|featuring)\s[^)\]]*)\s*[)\]]";

const DASH_SUFFIX: &str =
    r"(?i)\s+-\s+(?:(?:\d{4}\s+)?remaster(?:ed)?(?:\s+\d{4})?(?:\s+version)?|live)\s*$";

/// Strips catalogue decorations from artist and title fields.
#[derive(Debug, Clone)]
pub struct MetadataCleaner {
    zero_width: Regex,
    bracketed: Regex,
    dash: Regex,
}

impl MetadataCleaner {
    /// Compile the cleanup patterns.
    pub fn new() -> Result<Self> {
        Ok(MetadataCleaner {
            zero_width: Regex::new(ZERO_WIDTH)?,
            bracketed: Regex::new(BRACKETED_SUFFIX)?,
            dash: Regex::new(DASH_SUFFIX)?,
        })
    }

    /// Clean an artist name: zero-width characters and NBSPs only.
    pub fn clean_artist(&self, artist: &str) -> String {
        self.clean_common(artist).trim().to_string()
    }

    /// Clean a title, also removing remaster, live, explicit and featuring
    /// decorations.
    ///
    /// ```
    /// use rdslink_text::cleanup::MetadataCleaner;
    ///
    /// let cleaner = MetadataCleaner::new().unwrap();
    /// assert_eq!(cleaner.clean_title("Hey Jude (Remastered 2015)"), "Hey Jude");
    /// ```
    pub fn clean_title(&self, title: &str) -> String {
        let common = self.clean_common(title);
        let stripped = self.bracketed.replace_all(&common, "");
        let stripped = self.dash.replace(&stripped, "");
        let cleaned = stripped.trim();

        // Never clean a title down to nothing.
        if cleaned.is_empty() {
            return common.trim().to_string();
        }
        cleaned.to_string()
    }

    fn clean_common(&self, value: &str) -> String {
        self.zero_width
            .replace_all(value, "")
            .replace('\u{A0}', " ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cleaner() -> MetadataCleaner {
        MetadataCleaner::new().unwrap()
    }

    #[test]
    fn strips_bracketed_remaster_suffixes() {
        let c = cleaner();
        assert_eq!(c.clean_title("Hey Jude (Remastered 2015)"), "Hey Jude");
        assert_eq!(c.clean_title("Heroes (2017 Remaster)"), "Heroes");
        assert_eq!(c.clean_title("Song [Explicit]"), "Song");
        assert_eq!(c.clean_title("Song (Clean)"), "Song");
        assert_eq!(c.clean_title("Alive (Live)"), "Alive");
    }

    #[test]
    fn strips_dash_suffixes() {
        let c = cleaner();
        assert_eq!(c.clean_title("Come Together - Remastered 2009"), "Come Together");
        assert_eq!(c.clean_title("Let It Be - 2009 Remaster"), "Let It Be");
        assert_eq!(c.clean_title("Yellow - Live"), "Yellow");
    }

    #[test]
    fn strips_featured_artists_from_titles() {
        assert_eq!(cleaner().clean_title("Lose Yourself (feat. Eminem)"), "Lose Yourself");
        assert_eq!(cleaner().clean_title("Stay [ft. Justin Bieber]"), "Stay");
    }

    #[test]
    fn leaves_ordinary_titles_alone() {
        let c = cleaner();
        assert_eq!(c.clean_title("Live Forever"), "Live Forever");
        assert_eq!(c.clean_title("Love Will Tear Us Apart"), "Love Will Tear Us Apart");
        assert_eq!(c.clean_title("Run (I'm A Natural Disaster)"), "Run (I'm A Natural Disaster)");
    }

    #[test]
    fn removes_zero_width_and_nbsp() {
        let c = cleaner();
        assert_eq!(c.clean_artist("Ad\u{200B}ele"), "Adele");
        assert_eq!(c.clean_artist("Daft\u{A0}Punk"), "Daft Punk");
        assert_eq!(c.clean_title("\u{FEFF}Around\u{A0}The World"), "Around The World");
    }

    #[test]
    fn never_cleans_a_title_to_empty() {
        assert_eq!(cleaner().clean_title("(Live)"), "(Live)");
    }
}
