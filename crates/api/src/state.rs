//! Shared application state

use std::sync::Arc;

use bazaar_messaging::store::{
    Directory, MessageStore, PgDirectory, PgMessageStore, PgTicketStore, TicketStore,
};
use bazaar_messaging::{ChatLimits, Messenger, PresenceRegistry};
use sqlx::PgPool;

use crate::auth::{AuthState, JwtManager};
use crate::config::Config;

/// State handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub messenger: Messenger,
    pub jwt_manager: JwtManager,
    pub directory: Arc<dyn Directory>,
}

impl AppState {
    /// Postgres-backed state. The presence registry starts empty.
    pub fn new(pool: PgPool, config: Config) -> Self {
        let messages = Arc::new(PgMessageStore::new(pool.clone()));
        let tickets = Arc::new(PgTicketStore::new(pool.clone()));
        let directory = Arc::new(PgDirectory::new(pool.clone()));
        Self::with_stores(pool, config, messages, tickets, directory)
    }

    /// State over caller-supplied stores
    pub fn with_stores(
        pool: PgPool,
        config: Config,
        messages: Arc<dyn MessageStore>,
        tickets: Arc<dyn TicketStore>,
        directory: Arc<dyn Directory>,
    ) -> Self {
        let limits = ChatLimits {
            max_text_len: config.message_max_length,
            default_page_size: config.message_page_size,
            max_page_size: config.message_max_page_size,
        };
        let messenger = Messenger::new(
            messages,
            tickets,
            directory.clone(),
            PresenceRegistry::new(),
            limits,
        );
        let jwt_manager = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);

        Self {
            pool,
            config: Arc::new(config),
            messenger,
            jwt_manager,
            directory,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
            directory: self.directory.clone(),
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        self.messenger.presence()
    }
}
