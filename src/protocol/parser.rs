//! Incremental Response Parser
//!
//! TCP is a stream: a response may arrive split across many reads, and a
//! single read may stop anywhere inside the header or the body. The parser
//! therefore works on whatever has been buffered so far and returns either:
//!
//! - `Ok(Some((response, consumed)))` - a full frame was parsed, `consumed` bytes were used
//! - `Ok(None)` - the frame is incomplete, read more and try again
//! - `Err(ParseError)` - the bytes can never become a valid frame
//!
//! The header is checked as soon as all 13 bytes are present, so a corrupt
//! header fails fast instead of waiting for a body that will never come.

use crate::protocol::types::{Response, Status, HEADER_LEN, LENGTH_WIDTH, NEWLINE, STATUS_WIDTH};
use thiserror::Error;

/// Errors that can occur while parsing a response.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The header line does not have the `NNN LLLLLLLL\n` shape
    #[error("malformed header {0:?}")]
    MalformedHeader(String),

    /// The byte after the body was not a newline
    #[error("body of {length} bytes not followed by a newline (found {found:#04x})")]
    MissingTerminator { length: usize, found: u8 },

    /// The body is not valid UTF-8
    #[error("invalid UTF-8 in body of {length} bytes: {reason}")]
    InvalidUtf8 { length: usize, reason: String },
}

impl ParseError {
    /// Size of the rejected frame, when its extent is known.
    ///
    /// A bad terminator or body still comes with a valid header, so the
    /// reader can drop exactly that frame and stay aligned with the next one.
    /// A malformed header leaves no way to find the next frame.
    pub fn frame_len(&self) -> Option<usize> {
        match self {
            ParseError::MalformedHeader(_) => None,
            ParseError::MissingTerminator { length, .. }
            | ParseError::InvalidUtf8 { length, .. } => Some(HEADER_LEN + length + 1),
        }
    }
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// A parsed header line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub status: Status,
    pub length: usize,
}

impl Header {
    /// Total number of bytes in the frame this header announces.
    pub fn frame_len(&self) -> usize {
        HEADER_LEN + self.length + 1
    }
}

/// Parser for framed responses.
///
/// The parser keeps the header of a partially received frame so that a body
/// arriving over many reads does not cause the header to be re-parsed.
#[derive(Debug, Default)]
pub struct ResponseParser {
    pending: Option<Header>,
}

impl ResponseParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self { pending: None }
    }

    /// Attempts to parse one response from the start of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Response, usize)>> {
        let header = match self.pending {
            Some(header) => header,
            None => {
                if buf.len() < HEADER_LEN {
                    return Ok(None);
                }
                let header = parse_header(&buf[..HEADER_LEN])?;
                self.pending = Some(header);
                header
            }
        };

        let total = header.frame_len();
        if buf.len() < total {
            return Ok(None);
        }

        self.pending = None;

        let terminator = buf[total - 1];
        if terminator != NEWLINE {
            return Err(ParseError::MissingTerminator {
                length: header.length,
                found: terminator,
            });
        }

        let body = std::str::from_utf8(&buf[HEADER_LEN..total - 1])
            .map_err(|e| ParseError::InvalidUtf8 {
                length: header.length,
                reason: e.to_string(),
            })?;

        Ok(Some((Response::new(header.status, body), total)))
    }

    /// Header of the frame currently being received, if any.
    pub fn pending(&self) -> Option<Header> {
        self.pending
    }

    /// Forgets any partially received frame.
    pub fn reset(&mut self) {
        self.pending = None;
    }
}

/// Parses a 13 byte header line.
///
/// The status must be exactly three digits. The length field is eight bytes
/// of digits, zero padded or right padded with spaces; both forms are seen
/// in the wild.
pub fn parse_header(line: &[u8]) -> ParseResult<Header> {
    let malformed = || ParseError::MalformedHeader(String::from_utf8_lossy(line).into_owned());

    if line.len() != HEADER_LEN
        || line[STATUS_WIDTH] != b' '
        || line[HEADER_LEN - 1] != NEWLINE
    {
        return Err(malformed());
    }

    let status_field = &line[..STATUS_WIDTH];
    if !status_field.iter().all(u8::is_ascii_digit) {
        return Err(malformed());
    }

    let length_field = &line[STATUS_WIDTH + 1..STATUS_WIDTH + 1 + LENGTH_WIDTH];
    let digits = length_field
        .iter()
        .position(|b| *b == b' ')
        .unwrap_or(LENGTH_WIDTH);
    if digits == 0
        || !length_field[..digits].iter().all(u8::is_ascii_digit)
        || !length_field[digits..].iter().all(|b| *b == b' ')
    {
        return Err(malformed());
    }

    Ok(Header {
        status: Status::from_code(ascii_to_usize(status_field) as u16),
        length: ascii_to_usize(&length_field[..digits]),
    })
}

/// Callers guarantee `digits` is non-empty ASCII digits short enough not to overflow.
#[inline]
fn ascii_to_usize(digits: &[u8]) -> usize {
    digits
        .iter()
        .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'))
}

/// Helper function to parse a single response from bytes.
pub fn parse_response(buf: &[u8]) -> ParseResult<Option<(Response, usize)>> {
    ResponseParser::new().parse(buf)
}
