//! Administration CLI Protocol
//!
//! This module implements the framing used by the cache server's
//! administration interface.
//!
//! ## Overview
//!
//! The protocol is line oriented and strictly request/response: the client
//! writes one command line, the server answers with exactly one framed
//! response. There are no request IDs, so responses are matched to requests
//! purely by order.
//!
//! ## Modules
//!
//! - `types`: `Status`, `Response`, `Request` and their serialization
//! - `parser`: incremental parser for framed responses
//!
//! ## Example
//!
//! ```
//! use vcli::protocol::{parse_response, Request, Status};
//!
//! let line = Request::new("ping", &[]).serialize();
//! assert_eq!(line, b"ping\n");
//!
//! let data = b"200 00000019\nPONG 1700000000 1.0\n";
//! let (response, consumed) = parse_response(data).unwrap().unwrap();
//! assert_eq!(response.status, Status::Ok);
//! assert_eq!(consumed, data.len());
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_header, parse_response, Header, ParseError, ParseResult, ResponseParser};
pub use types::{Request, Response, Status};
