//! Helpers for handler tests

use std::sync::Arc;

use bazaar_messaging::store::{MemoryDirectory, MemoryStore};
use sqlx::postgres::PgPoolOptions;

use crate::config::{Config, LogFormat};
use crate::state::AppState;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-must-be-at-least-32-characters-long";

pub fn test_config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".to_string(),
        log_format: LogFormat::Pretty,
        database_url: "postgres://localhost/bazaar_test".to_string(),
        database_max_connections: 1,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expiry_hours: 1,
        ws_outbound_buffer: 8,
        message_max_length: 500,
        message_page_size: 20,
        message_max_page_size: 50,
    }
}

/// App state over in-memory stores. The pool never connects; only the
/// health endpoints would touch it.
pub fn memory_state() -> (AppState, Arc<MemoryDirectory>) {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_lazy(&config.database_url)
        .expect("lazy pool");

    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let state = AppState::with_stores(pool, config, store.clone(), store, directory.clone());

    (state, directory)
}
