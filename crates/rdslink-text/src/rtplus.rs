//! RT+ (RadioText Plus) tagging.
//!
//! RT+ lets a receiver pick the artist and title out of the RadioText line.
//! The encoder takes two tags per line through its `RT+TAG=` command:
//!
//! ```text
//! RT+TAG=<t1>,<s1>,<l1>,<t2>,<s2>,<l2>,<running>,<timeout>
//! ```
//!
//! where `t` is a content type rendered as two digits, `s` the start offset
//! and `l` the length of the tagged substring. The first slot has a 6-bit
//! length field and the second a 5-bit one, so their lengths are clamped to
//! 63 and 31. An unused slot is sent as `00,0,0`.
//!
//! The running bit is always set. The item toggle bit is managed by the
//! encoder, which flips it whenever a new tag set arrives.

use std::fmt;
use std::str::FromStr;

use rdslink_core::{Degradation, Field, Span};

use crate::compose::ComposedMessage;
use crate::error::{Result, TextError};

/// Largest length the first tag slot can carry.
pub const MAX_FIRST_LEN: u8 = 63;

/// Largest length the second tag slot can carry.
pub const MAX_SECOND_LEN: u8 = 31;

/// Largest content type code (6-bit field).
pub const MAX_CONTENT_TYPE: u8 = 63;

/// RT+ content type `ITEM.TITLE`.
pub const ITEM_TITLE: u8 = 1;

/// RT+ content type `ITEM.ARTIST`.
pub const ITEM_ARTIST: u8 = 4;

/// Content type codes used for the artist and title tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentTypes {
    artist: u8,
    title: u8,
}

impl Default for ContentTypes {
    fn default() -> Self {
        ContentTypes {
            artist: ITEM_ARTIST,
            title: ITEM_TITLE,
        }
    }
}

impl ContentTypes {
    /// Create a code pair. Both must be in `1..=63` and differ.
    pub fn new(artist: u8, title: u8) -> Result<Self> {
        for (name, code) in [("artist", artist), ("title", title)] {
            if code == 0 || code > MAX_CONTENT_TYPE {
                return Err(TextError::InvalidContentType(format!(
                    "{name} type {code} outside 1..={MAX_CONTENT_TYPE}"
                )));
            }
        }
        if artist == title {
            return Err(TextError::InvalidContentType(format!(
                "artist and title share type {artist}"
            )));
        }
        Ok(ContentTypes { artist, title })
    }

    /// The artist content type.
    pub fn artist(&self) -> u8 {
        self.artist
    }

    /// The title content type.
    pub fn title(&self) -> u8 {
        self.title
    }

    fn code(&self, field: Field) -> u8 {
        match field {
            Field::Artist => self.artist,
            Field::Title => self.title,
        }
    }

    fn field(&self, code: u8) -> Option<Field> {
        if code == self.artist {
            Some(Field::Artist)
        } else if code == self.title {
            Some(Field::Title)
        } else {
            None
        }
    }
}

/// One RT+ tag slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtPlusTag {
    /// Content type code, `0` for an unused slot.
    pub content_type: u8,
    /// Offset of the tagged text.
    pub start: u8,
    /// Length of the tagged text.
    pub length: u8,
}

impl RtPlusTag {
    /// The unused slot, `00,0,0`.
    pub const BLANK: RtPlusTag = RtPlusTag {
        content_type: 0,
        start: 0,
        length: 0,
    };

    /// Whether this slot is unused.
    pub fn is_blank(&self) -> bool {
        self.content_type == 0
    }

    /// The tagged range as a span.
    pub fn span(&self) -> Span {
        Span::new(self.start as usize, self.length as usize)
    }
}

/// The pair of tags sent with one `RT+TAG=` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtPlusTagSet {
    /// First slot.
    pub first: RtPlusTag,
    /// Second slot.
    pub second: RtPlusTag,
    /// Item running bit.
    pub running: bool,
    /// Minutes until receivers should drop the tags, `0` for no timeout.
    pub timeout_minutes: u8,
}

impl RtPlusTagSet {
    /// The `RT+TAG=` argument string.
    ///
    /// ```
    /// use rdslink_text::rtplus::{RtPlusTag, RtPlusTagSet};
    ///
    /// let set = RtPlusTagSet {
    ///     first: RtPlusTag { content_type: 4, start: 0, length: 8 },
    ///     second: RtPlusTag { content_type: 1, start: 11, length: 9 },
    ///     running: true,
    ///     timeout_minutes: 0,
    /// };
    /// assert_eq!(set.payload(), "04,0,8,01,11,9,1,0");
    /// ```
    pub fn payload(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RtPlusTagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02},{},{},{:02},{},{},{},{}",
            self.first.content_type,
            self.first.start,
            self.first.length,
            self.second.content_type,
            self.second.start,
            self.second.length,
            u8::from(self.running),
            self.timeout_minutes
        )
    }
}

impl FromStr for RtPlusTagSet {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.trim().split(',').collect();
        if fields.len() != 8 {
            return Err(TextError::InvalidPayload(format!(
                "expected 8 fields, got {}: {s:?}",
                fields.len()
            )));
        }

        let mut nums = [0u8; 8];
        for (slot, raw) in nums.iter_mut().zip(&fields) {
            *slot = raw
                .trim()
                .parse()
                .map_err(|_| TextError::InvalidPayload(format!("bad field {raw:?} in {s:?}")))?;
        }

        let running = match nums[6] {
            0 => false,
            1 => true,
            other => {
                return Err(TextError::InvalidPayload(format!(
                    "running bit must be 0 or 1, got {other}"
                )));
            }
        };

        Ok(RtPlusTagSet {
            first: RtPlusTag {
                content_type: nums[0],
                start: nums[1],
                length: nums[2],
            },
            second: RtPlusTag {
                content_type: nums[3],
                start: nums[4],
                length: nums[5],
            },
            running,
            timeout_minutes: nums[7],
        })
    }
}

/// Tags for one message plus any clamping that occurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// The tag pair to send.
    pub tags: RtPlusTagSet,
    /// `Clamped` entries for slot lengths that did not fit.
    pub degradations: Vec<Degradation>,
}

/// Computes RT+ tags for composed messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RtPlusEncoder {
    types: ContentTypes,
}

impl RtPlusEncoder {
    /// Create an encoder using the given content types.
    pub fn new(types: ContentTypes) -> Self {
        RtPlusEncoder { types }
    }

    /// The content types in use.
    pub fn types(&self) -> ContentTypes {
        self.types
    }

    /// Tag `msg` with no receiver timeout.
    ///
    /// ```
    /// use rdslink_text::compose::Composer;
    /// use rdslink_text::rtplus::RtPlusEncoder;
    ///
    /// let msg = Composer::default().compose("Owl City", "Fireflies");
    /// let encoded = RtPlusEncoder::default().encode(&msg);
    /// assert_eq!(encoded.tags.payload(), "04,0,8,01,11,9,1,0");
    /// ```
    pub fn encode(&self, msg: &ComposedMessage) -> Encoded {
        self.encode_with_timeout(msg, 0)
    }

    /// Tag `msg`, asking receivers to drop the tags after `timeout_minutes`.
    ///
    /// Present fields fill the slots in order, artist first. A field with an
    /// empty span leaves no tag, and unused slots are blank.
    pub fn encode_with_timeout(&self, msg: &ComposedMessage, timeout_minutes: u8) -> Encoded {
        let mut present = [Field::Artist, Field::Title]
            .into_iter()
            .filter(|field| !msg.span(*field).is_empty());

        let mut degradations = Vec::new();
        let first = present
            .next()
            .map(|field| self.tag(msg, field, MAX_FIRST_LEN, &mut degradations))
            .unwrap_or(RtPlusTag::BLANK);
        let second = present
            .next()
            .map(|field| self.tag(msg, field, MAX_SECOND_LEN, &mut degradations))
            .unwrap_or(RtPlusTag::BLANK);

        Encoded {
            tags: RtPlusTagSet {
                first,
                second,
                running: true,
                timeout_minutes,
            },
            degradations,
        }
    }

    fn tag(
        &self,
        msg: &ComposedMessage,
        field: Field,
        max_len: u8,
        degradations: &mut Vec<Degradation>,
    ) -> RtPlusTag {
        let span = msg.span(field);
        let length = match u8::try_from(span.len) {
            Ok(len) if len <= max_len => len,
            _ => {
                tracing::warn!(%field, requested = span.len, sent = max_len, "Clamped RT+ tag length");
                degradations.push(Degradation::Clamped {
                    field,
                    requested: span.len,
                    sent: max_len,
                });
                max_len
            }
        };
        RtPlusTag {
            content_type: self.types.code(field),
            // Composed text is at most 64 characters, so a visible span
            // always starts below 64.
            start: u8::try_from(span.start).unwrap_or(u8::MAX),
            length,
        }
    }
}

/// Receiver timeout for a track of `duration_secs`, in whole minutes.
pub fn timeout_for_duration(duration_secs: u64) -> u8 {
    u8::try_from(duration_secs / 60).unwrap_or(u8::MAX)
}

/// Artist and title recovered from an `RT+TAG` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Tagged artist text, if a slot carried the artist type.
    pub artist: Option<String>,
    /// Tagged title text, if a slot carried the title type.
    pub title: Option<String>,
}

/// Recover the tagged artist and title from `payload` applied to `text`.
///
/// Slots with other content types are ignored. A tag that points outside
/// `text` is an error.
///
/// ```
/// use rdslink_text::rtplus::{ContentTypes, decode};
///
/// let out = decode("04,0,8,01,11,9,1,0", "Owl City - Fireflies", ContentTypes::default()).unwrap();
/// assert_eq!(out.artist.as_deref(), Some("Owl City"));
/// assert_eq!(out.title.as_deref(), Some("Fireflies"));
/// ```
pub fn decode(payload: &str, text: &str, types: ContentTypes) -> Result<Decoded> {
    let set: RtPlusTagSet = payload.parse()?;
    let mut out = Decoded::default();

    for tag in [set.first, set.second] {
        if tag.is_blank() {
            continue;
        }
        let Some(field) = types.field(tag.content_type) else {
            continue;
        };
        let span = tag.span();
        let value = text.get(span.start..span.end()).ok_or_else(|| {
            TextError::InvalidPayload(format!(
                "{field} tag {}..{} outside text of length {}",
                span.start,
                span.end(),
                text.len()
            ))
        })?;
        match field {
            Field::Artist => out.artist = Some(value.to_string()),
            Field::Title => out.title = Some(value.to_string()),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::Composer;

    fn compose(artist: &str, title: &str) -> ComposedMessage {
        Composer::default().compose(artist, title)
    }

    #[test]
    fn both_fields_fill_both_slots() {
        let encoded = RtPlusEncoder::default().encode(&compose("Owl City", "Fireflies"));
        assert_eq!(encoded.tags.payload(), "04,0,8,01,11,9,1,0");
        assert!(encoded.degradations.is_empty());
    }

    #[test]
    fn title_only_moves_to_first_slot() {
        let encoded = RtPlusEncoder::default().encode(&compose("", "Untitled"));
        assert_eq!(encoded.tags.payload(), "01,3,8,00,0,0,1,0");
    }

    #[test]
    fn artist_only_leaves_second_slot_blank() {
        let encoded = RtPlusEncoder::default().encode(&compose("Solo", ""));
        assert_eq!(encoded.tags.payload(), "04,0,4,00,0,0,1,0");
    }

    #[test]
    fn no_fields_sends_two_blank_slots() {
        let encoded = RtPlusEncoder::default().encode(&compose("", ""));
        assert_eq!(encoded.tags.payload(), "00,0,0,00,0,0,1,0");
    }

    #[test]
    fn long_second_slot_is_clamped() {
        let title = "T".repeat(40);
        let encoded = RtPlusEncoder::default().encode(&compose("AB", &title));
        assert_eq!(encoded.tags.second.length, MAX_SECOND_LEN);
        assert_eq!(encoded.tags.second.start, 5);
        assert_eq!(
            encoded.degradations,
            vec![Degradation::Clamped {
                field: Field::Title,
                requested: 40,
                sent: 31
            }]
        );
    }

    #[test]
    fn long_first_slot_is_clamped_to_63() {
        let artist = "A".repeat(64);
        let encoded = RtPlusEncoder::default().encode(&compose(&artist, "Song"));
        assert_eq!(encoded.tags.first.length, MAX_FIRST_LEN);
        assert!(encoded.tags.second.is_blank());
        assert_eq!(encoded.degradations.len(), 1);
    }

    #[test]
    fn title_alone_in_first_slot_gets_the_wider_limit() {
        let title = "T".repeat(40);
        let encoded = RtPlusEncoder::default().encode(&compose("", &title));
        assert_eq!(encoded.tags.first.length, 40);
        assert!(encoded.degradations.is_empty());
    }

    #[test]
    fn custom_content_types() {
        let types = ContentTypes::new(7, 2).unwrap();
        let encoded = RtPlusEncoder::new(types).encode(&compose("A", "B"));
        assert_eq!(encoded.tags.payload(), "07,0,1,02,4,1,1,0");
    }

    #[test]
    fn content_type_validation() {
        assert!(ContentTypes::new(0, 1).is_err());
        assert!(ContentTypes::new(4, 64).is_err());
        assert!(ContentTypes::new(4, 4).is_err());
        assert!(ContentTypes::new(63, 1).is_ok());
    }

    #[test]
    fn timeout_is_carried() {
        let encoded = RtPlusEncoder::default().encode_with_timeout(&compose("A", "B"), 4);
        assert_eq!(encoded.tags.payload(), "04,0,1,01,4,1,1,4");
    }

    #[test]
    fn timeout_for_duration_rounds_down_and_caps() {
        assert_eq!(timeout_for_duration(59), 0);
        assert_eq!(timeout_for_duration(245), 4);
        assert_eq!(timeout_for_duration(60 * 1000), 255);
    }

    #[test]
    fn parse_rejects_malformed_payloads() {
        assert!("04,0,8".parse::<RtPlusTagSet>().is_err());
        assert!("04,0,8,01,11,x,1,0".parse::<RtPlusTagSet>().is_err());
        assert!("04,0,8,01,11,9,2,0".parse::<RtPlusTagSet>().is_err());
        assert!("04,0,8,01,11,9,1,256".parse::<RtPlusTagSet>().is_err());
    }

    #[test]
    fn decode_recovers_encoded_fields() {
        let msg = compose("Sigur Rós", "Hoppípolla");
        let encoded = RtPlusEncoder::default().encode(&msg);
        let out = decode(&encoded.tags.payload(), &msg.text, ContentTypes::default()).unwrap();
        assert_eq!(out.artist.as_deref(), Some("Sigur Ros"));
        assert_eq!(out.title.as_deref(), Some("Hoppipolla"));
    }

    #[test]
    fn decode_ignores_blank_and_foreign_slots() {
        let out = decode("01,0,3,09,4,2,1,0", "abc de", ContentTypes::default()).unwrap();
        assert_eq!(out.artist, None);
        assert_eq!(out.title.as_deref(), Some("abc"));
    }

    #[test]
    fn decode_rejects_out_of_range_tags() {
        let err = decode("04,0,30,00,0,0,1,0", "short", ContentTypes::default());
        assert!(matches!(err, Err(TextError::InvalidPayload(_))));
    }
}
