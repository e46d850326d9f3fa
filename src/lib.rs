//! # vcli - Async Client for the Cache Server Administration CLI
//!
//! The cache server exposes a line-oriented administration interface over
//! TCP (the `-T` management port). This crate is a client for it: it opens
//! the session, answers the shared-secret challenge, sends arbitrary command
//! lines and parses the framed responses.
//!
//! ## Features
//!
//! - **Handshake**: validates the greeting and performs challenge/response authentication
//! - **Safe Concurrency**: `cmd` can be called from many tasks; round trips never interleave
//! - **Robust Framing**: responses are reassembled across partial TCP reads
//! - **Keepalive**: optional background `ping` on a fixed interval
//! - **Async I/O**: Built on Tokio
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               vcli                                      │
//! │                                                                         │
//! │  ┌─────────────┐    ┌──────────────────────────────┐                    │
//! │  │ ClientConfig│───>│          Connection          │                    │
//! │  └─────────────┘    │  handshake / cmd / close     │                    │
//! │                     └──────┬────────────────▲──────┘                    │
//! │                            │ command lock   │                           │
//! │                            ▼                │ ping                      │
//! │  ┌─────────────┐    ┌─────────────┐  ┌──────┴──────┐                    │
//! │  │  Request /  │<───│    Wire     │  │  Keepalive  │                    │
//! │  │  Response   │    │ (TcpStream) │  │ (Tokio task)│                    │
//! │  │  Parser     │    └─────────────┘  └─────────────┘                    │
//! │  └─────────────┘                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use vcli::{ClientConfig, Connection};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::new("127.0.0.1", 6082)
//!         .with_secret_file("/etc/varnish/secret")?;
//!
//!     let conn = Connection::open(&config).await?;
//!     conn.start_keepalive(Duration::from_secs(30));
//!
//!     let response = conn.cmd("ping", &[]).await?;
//!     assert!(response.is_success());
//!
//!     // Multi-line payloads go in a single heredoc argument
//!     let vcl = "<< VCL\nvcl 4.0;\nbackend default { .host = \"127.0.0.1\"; }\nVCL";
//!     conn.cmd("vcl.inline", &["hello", vcl]).await?;
//!     conn.cmd("vcl.use", &["hello"]).await?;
//!
//!     conn.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: status codes, request/response types and the framing parser
//! - [`connection`]: connection lifecycle, authentication and keepalive
//! - [`config`]: client configuration
//!
//! ## Logging
//!
//! The crate logs through `tracing` and never installs a subscriber. Set
//! [`ClientConfig::log_traffic`] to log every request and response of a
//! connection at debug level.

pub mod config;
pub mod connection;
pub mod protocol;

// Re-export commonly used types for convenience
pub use config::ClientConfig;
pub use connection::{ClientError, Connection, ConnectionState, ConnectionStats, StatsSnapshot};
pub use protocol::{ParseError, Request, Response, ResponseParser, Status};

use std::time::Duration;

/// The default administration port
pub const DEFAULT_PORT: u16 = 6082;

/// The default host to connect to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// How long to wait for the TCP connection to be established
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Version of vcli
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
