//! Text processing for RDS RadioText.
//!
//! This crate turns raw track metadata into what an RDS encoder can carry:
//!
//! - [`normalize`]: Unicode to printable ASCII transliteration
//! - [`profanity`]: whole-word denylist masking
//! - [`cleanup`]: optional removal of catalogue decorations
//! - [`compose`]: the 64-character `"{artist} - {title}"` line with spans
//! - [`rtplus`]: RT+ tag computation and decoding
//!
//! Everything here is synchronous and pure apart from loading denylist
//! files.
//!
//! # Example
//!
//! ```
//! use rdslink_text::{Composer, ComposerConfig, ProfanityFilter, RtPlusEncoder};
//!
//! let composer = Composer::new(ComposerConfig::default(), ProfanityFilter::new(["heck"])).unwrap();
//! let msg = composer.compose("Owl City", "Fireflies");
//! let encoded = RtPlusEncoder::default().encode(&msg);
//!
//! assert_eq!(msg.text, "Owl City - Fireflies");
//! assert_eq!(encoded.tags.payload(), "04,0,8,01,11,9,1,0");
//! ```

pub mod cleanup;
pub mod compose;
pub mod error;
pub mod normalize;
pub mod profanity;
pub mod rtplus;

pub use cleanup::MetadataCleaner;
pub use compose::{ComposedMessage, Composer, ComposerConfig};
pub use error::{Result, TextError};
pub use normalize::{Normalized, Normalizer};
pub use profanity::{Filtered, ProfanityFilter, load_denylist};
pub use rtplus::{
    ContentTypes, Decoded, Encoded, RtPlusEncoder, RtPlusTag, RtPlusTagSet, decode,
    timeout_for_duration,
};
