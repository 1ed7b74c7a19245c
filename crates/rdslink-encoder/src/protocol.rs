//! Line protocol encode/decode for RDS encoders.
//!
//! Commands are ASCII lines of the form `VERB=payload\r\n`. The encoder
//! answers every line with `OK` or `NO`, terminated by `\r\n`, a bare `\n`,
//! or on some units nothing at all. Only two verbs are used:
//!
//! - `TEXT=` sets the RadioText (at most 64 printable ASCII characters)
//! - `RT+TAG=` sets the RT+ tag pair
//!
//! Anything other than exactly `OK` or `NO` on a response line is
//! [`Response::Malformed`].

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use rdslink_core::MAX_TEXT_LEN;
use rdslink_core::error::{Error, Result};

/// Line terminator appended to every command.
pub const TERMINATOR: &[u8] = b"\r\n";

/// Command verbs understood by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandVerb {
    /// `TEXT=`: set RadioText.
    Text,
    /// `RT+TAG=`: set the RT+ tags.
    RtPlusTag,
}

impl CommandVerb {
    /// The verb as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandVerb::Text => "TEXT",
            CommandVerb::RtPlusTag => "RT+TAG",
        }
    }
}

impl fmt::Display for CommandVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderCommand {
    verb: CommandVerb,
    payload: String,
}

impl EncoderCommand {
    /// A `TEXT=` command.
    ///
    /// Fails if `text` is longer than 64 characters or contains anything
    /// outside printable ASCII.
    ///
    /// ```
    /// use rdslink_encoder::protocol::EncoderCommand;
    ///
    /// let cmd = EncoderCommand::text("Owl City - Fireflies").unwrap();
    /// assert_eq!(&cmd.encode()[..], b"TEXT=Owl City - Fireflies\r\n");
    /// assert!(EncoderCommand::text("Beyoncé").is_err());
    /// ```
    pub fn text(text: &str) -> Result<Self> {
        if text.len() > MAX_TEXT_LEN {
            return Err(Error::InvalidParameter(format!(
                "TEXT payload is {} characters, limit is {MAX_TEXT_LEN}",
                text.len()
            )));
        }
        if !is_valid_text(text) {
            return Err(Error::InvalidParameter(format!(
                "TEXT payload {text:?} is not printable ASCII"
            )));
        }
        Ok(EncoderCommand {
            verb: CommandVerb::Text,
            payload: text.to_string(),
        })
    }

    /// An `RT+TAG=` command from a rendered tag payload.
    ///
    /// The payload must be eight comma-separated decimal fields.
    pub fn rt_plus_tag(payload: &str) -> Result<Self> {
        let fields: Vec<&str> = payload.split(',').collect();
        let well_formed = fields.len() == 8
            && fields
                .iter()
                .all(|f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()));
        if !well_formed {
            return Err(Error::InvalidParameter(format!(
                "RT+TAG payload {payload:?} is not eight numeric fields"
            )));
        }
        Ok(EncoderCommand {
            verb: CommandVerb::RtPlusTag,
            payload: payload.to_string(),
        })
    }

    /// The command verb.
    pub fn verb(&self) -> CommandVerb {
        self.verb
    }

    /// The argument after `=`.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// The command line without its terminator, e.g. `TEXT=A - B`.
    pub fn line(&self) -> String {
        format!("{}={}", self.verb, self.payload)
    }

    /// Wire bytes, terminator included.
    pub fn encode(&self) -> Bytes {
        let verb = self.verb.as_str();
        let mut buf = BytesMut::with_capacity(verb.len() + 1 + self.payload.len() + 2);
        buf.put_slice(verb.as_bytes());
        buf.put_u8(b'=');
        buf.put_slice(self.payload.as_bytes());
        buf.put_slice(TERMINATOR);
        buf.freeze()
    }
}

impl fmt::Display for EncoderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.verb, self.payload)
    }
}

/// Whether `text` is acceptable as a `TEXT=` payload character set.
pub fn is_valid_text(text: &str) -> bool {
    text.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

/// A parsed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The command was accepted.
    Ok,
    /// The command was refused.
    No,
    /// Anything else, kept verbatim (lossy UTF-8).
    Malformed(String),
}

impl Response {
    /// The response as it appeared on the wire, without terminator.
    pub fn as_str(&self) -> &str {
        match self {
            Response::Ok => "OK",
            Response::No => "NO",
            Response::Malformed(line) => line,
        }
    }
}

/// Result of attempting to decode one response line from a byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeResult {
    /// A complete response line was decoded.
    Response {
        /// The parsed response.
        response: Response,
        /// Number of bytes consumed from the input buffer.
        consumed: usize,
    },

    /// An empty line; skip `usize` bytes and keep reading.
    Blank(usize),

    /// No complete line yet. More data is needed.
    Incomplete,
}

/// Decode one `\n`-terminated response line from a byte buffer.
///
/// A `\r` before the `\n` is stripped. Returns the first complete line, or
/// [`DecodeResult::Incomplete`] if no newline is present yet.
///
/// ```
/// use rdslink_encoder::protocol::{DecodeResult, Response, decode_response};
///
/// assert_eq!(
///     decode_response(b"OK\r\nNO\r\n"),
///     DecodeResult::Response { response: Response::Ok, consumed: 4 }
/// );
/// assert_eq!(decode_response(b"O"), DecodeResult::Incomplete);
/// ```
pub fn decode_response(buf: &[u8]) -> DecodeResult {
    let Some(newline) = buf.iter().position(|&b| b == b'\n') else {
        return DecodeResult::Incomplete;
    };

    let consumed = newline + 1;
    let mut body = &buf[..newline];
    if let Some(stripped) = body.strip_suffix(b"\r") {
        body = stripped;
    }

    let response = match body {
        b"" => return DecodeResult::Blank(consumed),
        b"OK" => Response::Ok,
        b"NO" => Response::No,
        other => Response::Malformed(String::from_utf8_lossy(other).into_owned()),
    };

    DecodeResult::Response { response, consumed }
}

/// Recognise a reply that arrived without a line terminator.
///
/// Some encoders, and simple simulators, answer a bare `OK` or `NO`. A
/// buffer holding exactly one of those (a trailing `\r` allowed) is taken as
/// that reply; anything else waits for a newline.
///
/// ```
/// use rdslink_encoder::protocol::{Response, decode_unterminated};
///
/// assert_eq!(decode_unterminated(b"OK"), Some(Response::Ok));
/// assert_eq!(decode_unterminated(b"O"), None);
/// ```
pub fn decode_unterminated(buf: &[u8]) -> Option<Response> {
    match buf.strip_suffix(b"\r").unwrap_or(buf) {
        b"OK" => Some(Response::Ok),
        b"NO" => Some(Response::No),
        _ => None,
    }
}
