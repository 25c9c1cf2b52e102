//! Bazaar Shared Types and Utilities
//!
//! Identity types, the conversation key derivation, and database helpers
//! shared by the messaging core and the API server.

// Allow unwrap/expect in tests - panics are acceptable in test code
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod conversation;
pub mod db;
pub mod types;

pub use conversation::conversation_key;
pub use db::*;
pub use types::*;
