//! Shared-secret challenge/response authentication.
//!
//! When the server is started with a secret it greets new connections with
//! status 107 and a random challenge on the first line of the body. The
//! client proves it knows the secret by answering
//!
//! ```text
//! auth hex(sha256(challenge + "\n" + secret + challenge + "\n"))
//! ```
//!
//! The secret is used byte for byte, including any trailing newline it was
//! stored with.

use sha2::{Digest, Sha256};

/// Name of the command that submits the digest.
pub const AUTH_COMMAND: &str = "auth";

/// Extracts the challenge from a 107 greeting body.
pub fn challenge_from_greeting(body: &str) -> &str {
    body.split('\n').next().unwrap_or_default()
}

/// Computes the lowercase hex digest answering `challenge`.
pub fn challenge_response(challenge: &str, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge.as_bytes());
    hasher.update(b"\n");
    hasher.update(secret.as_bytes());
    hasher.update(challenge.as_bytes());
    hasher.update(b"\n");
    hex::encode(hasher.finalize())
}
