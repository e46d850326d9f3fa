//! Connection Module
//!
//! This module manages the session with the administration interface.
//! One `Connection` owns one TCP socket; every command is a serialized
//! write-then-read round trip on it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Connection                           │
//! │                                                             │
//! │   state: Unauthenticated | Ready | KeepaliveActive | Closed │
//! │                                                             │
//! │  caller ──┐                                                 │
//! │  caller ──┼──> command lock ──> Wire (write line, read frame)│
//! │  keepalive┘         │                                       │
//! │                     ▼                                       │
//! │               TcpStream                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Handshake**: greeting check and shared-secret challenge/response
//! - **Ordering**: one in-flight round trip at a time, no misattributed responses
//! - **Partial reads**: frames are reassembled however TCP splits them
//! - **Keepalive**: optional background `ping` on a timer
//! - **Statistics**: per-connection command, byte and ping counters

pub mod auth;
pub mod client;
pub mod keepalive;
pub mod stats;
mod wire;

#[cfg(test)]
pub(crate) mod mock;

// Re-export commonly used types
pub use auth::{challenge_from_greeting, challenge_response};
pub use client::{ClientError, Connection, ConnectionState};
pub use stats::{ConnectionStats, StatsSnapshot};
