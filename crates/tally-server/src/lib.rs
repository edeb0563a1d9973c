//! The tally collector service: an axum HTTP API in front of a
//! [`tally_storage::MetricsStorage`] backend.

pub mod api;
pub mod app;
pub mod config;
pub mod logging;
pub mod middleware;
pub mod state;
pub mod storage;
