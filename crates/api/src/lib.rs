//! Bazaar API Library
//!
//! HTTP and WebSocket surface over the messaging core.

// Allow unwrap/expect in tests - panics are acceptable in test code
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
