//! CLI Protocol Data Types
//!
//! This module defines the values exchanged with the administration interface.
//!
//! ## Protocol Format
//!
//! Requests are a single text line: the command and its arguments joined by
//! single spaces, terminated by `\n`. Nothing is quoted or escaped.
//!
//! Responses are framed by a fixed-width header:
//!
//! ```text
//! <status: 3 digits> <length: 8 bytes>\n
//! <body: exactly length bytes>\n
//! ```
//!
//! ## Examples
//!
//! Request: `vcl.use boot\n`
//! Response: `200 19      \nPONG 1700000000 1.0\n`
//! Greeting (auth required): `107 59      \n<32 byte challenge>\n\nAuthentication required.\n\n`

use std::fmt;

/// Terminator for request lines, response headers and response bodies.
pub const NEWLINE: u8 = b'\n';

/// Length of the response header line, newline included.
pub const HEADER_LEN: usize = 13;

/// Width of the status field in the header.
pub const STATUS_WIDTH: usize = 3;

/// Width of the length field in the header.
pub const LENGTH_WIDTH: usize = 8;

/// Numeric status codes sent by the server.
pub mod code {
    pub const SYNTAX: u16 = 100;
    pub const UNKNOWN: u16 = 101;
    pub const UNIMPL: u16 = 102;
    pub const TOOFEW: u16 = 104;
    pub const TOOMANY: u16 = 105;
    pub const PARAM: u16 = 106;
    pub const AUTH: u16 = 107;
    pub const OK: u16 = 200;
    pub const TRUNCATED: u16 = 201;
    pub const CANT: u16 = 300;
    pub const COMMS: u16 = 400;
    pub const CLOSE: u16 = 500;
}

/// Status of a response.
///
/// Codes the server is known to send get their own variant; anything else
/// that still fits the 3 digit field is kept as [`Status::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// 100: the request line could not be parsed
    Syntax,
    /// 101: no such command
    Unknown,
    /// 102: the command exists but is not implemented
    Unimplemented,
    /// 104: not enough arguments
    TooFew,
    /// 105: too many arguments
    TooMany,
    /// 106: an argument was rejected
    Param,
    /// 107: authentication is required, the body carries the challenge
    Auth,
    /// 200: success
    Ok,
    /// 201: success, but the body was truncated
    Truncated,
    /// 300: the command could not be performed
    Cant,
    /// 400: communication error on the server side
    Comms,
    /// 500: the server is closing the connection
    Close,
    /// Any other 3 digit code
    Other(u16),
}

impl Status {
    /// Maps a numeric code onto a status.
    pub fn from_code(n: u16) -> Self {
        match n {
            code::SYNTAX => Status::Syntax,
            code::UNKNOWN => Status::Unknown,
            code::UNIMPL => Status::Unimplemented,
            code::TOOFEW => Status::TooFew,
            code::TOOMANY => Status::TooMany,
            code::PARAM => Status::Param,
            code::AUTH => Status::Auth,
            code::OK => Status::Ok,
            code::TRUNCATED => Status::Truncated,
            code::CANT => Status::Cant,
            code::COMMS => Status::Comms,
            code::CLOSE => Status::Close,
            other => Status::Other(other),
        }
    }

    /// Returns the numeric code.
    pub fn code(&self) -> u16 {
        match self {
            Status::Syntax => code::SYNTAX,
            Status::Unknown => code::UNKNOWN,
            Status::Unimplemented => code::UNIMPL,
            Status::TooFew => code::TOOFEW,
            Status::TooMany => code::TOOMANY,
            Status::Param => code::PARAM,
            Status::Auth => code::AUTH,
            Status::Ok => code::OK,
            Status::Truncated => code::TRUNCATED,
            Status::Cant => code::CANT,
            Status::Comms => code::COMMS,
            Status::Close => code::CLOSE,
            Status::Other(n) => *n,
        }
    }

    /// Only 200 counts as success.
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Ok)
    }

    fn name(&self) -> &'static str {
        match self {
            Status::Syntax => "syntax error",
            Status::Unknown => "unknown command",
            Status::Unimplemented => "not implemented",
            Status::TooFew => "too few arguments",
            Status::TooMany => "too many arguments",
            Status::Param => "bad parameter",
            Status::Auth => "authentication required",
            Status::Ok => "ok",
            Status::Truncated => "truncated",
            Status::Cant => "cannot perform",
            Status::Comms => "communication error",
            Status::Close => "closing",
            Status::Other(_) => "unrecognised status",
        }
    }
}

impl From<u16> for Status {
    fn from(n: u16) -> Self {
        Status::from_code(n)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.name())
    }
}

/// A single framed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status from the header
    pub status: Status,
    /// Body without the trailing newline. May be empty or span several lines.
    pub body: String,
}

impl Response {
    /// Creates a new response.
    pub fn new(status: impl Into<Status>, body: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            body: body.into(),
        }
    }

    /// Returns true if the status is 200.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Serializes the response the way the server frames it.
    ///
    /// The client never sends responses; this exists for mock servers,
    /// benchmarks and framing tests.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.body.len() + 1);
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the response into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        let header = format!("{:03} {:08}", self.status.code(), self.body.len());
        buf.extend_from_slice(header.as_bytes());
        buf.push(NEWLINE);
        buf.extend_from_slice(self.body.as_bytes());
        buf.push(NEWLINE);
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.status, self.body)
    }
}

/// An outgoing command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub command: &'a str,
    pub args: &'a [&'a str],
}

impl<'a> Request<'a> {
    /// Creates a new request.
    pub fn new(command: &'a str, args: &'a [&'a str]) -> Self {
        Self { command, args }
    }

    /// Serializes the request to bytes for sending over the wire.
    pub fn serialize(&self) -> Vec<u8> {
        let len = self.command.len() + self.args.iter().map(|a| a.len() + 1).sum::<usize>() + 1;
        let mut buf = Vec::with_capacity(len);
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the request into an existing buffer.
    ///
    /// Arguments are written as given. Callers are responsible for any quoting
    /// the server expects, e.g. a `<< TAG` heredoc passed as one argument.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(self.command.as_bytes());
        for arg in self.args {
            buf.push(b' ');
            buf.extend_from_slice(arg.as_bytes());
        }
        buf.push(NEWLINE);
    }
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command)?;
        for arg in self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
