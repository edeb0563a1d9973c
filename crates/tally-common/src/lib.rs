//! Shared building blocks for the tally agent and server.
//!
//! [`types`] holds the wire and dump representation of metrics. The
//! remaining modules implement the body transforms both sides agree on
//! (gzip, HMAC-SHA256 signing, RSA encryption), the bounded retry helper
//! and the background-task supervisor.

pub mod codec;
pub mod crypto;
pub mod retry;
pub mod sign;
pub mod supervisor;
pub mod types;
