//! The tally agent: samples metrics into a local in-memory store and ships
//! them to the collector service in signed, compressed, optionally encrypted
//! chunks.

pub mod config;
pub mod sender;
pub mod transport;
