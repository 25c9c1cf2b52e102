//! Presence registry
//!
//! Process-wide map from user identity to that user's live connection.
//! Empty at startup, never persisted. One entry per user: a reconnect
//! silently supersedes the previous connection.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::events::ServerEvent;

/// Why a live delivery did not happen
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("outbound buffer full")]
    Full,
    #[error("connection closed")]
    Closed,
}

/// Represents an active live connection
#[derive(Debug)]
pub struct Connection {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Authenticated user ID
    pub user_id: Uuid,

    /// Bounded channel feeding the connection's writer task
    sender: mpsc::Sender<ServerEvent>,
}

impl Connection {
    /// Create a new connection
    pub fn new(user_id: Uuid, sender: mpsc::Sender<ServerEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id,
            sender,
        }
    }

    /// Queue an event for this connection without waiting.
    ///
    /// A slow reader fills its buffer and starts missing events instead of
    /// stalling the sender.
    pub fn send(&self, event: ServerEvent) -> Result<(), DeliveryError> {
        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

/// Concurrency-safe registry of live connections, keyed by user
#[derive(Clone, Default)]
pub struct PresenceRegistry {
    entries: Arc<RwLock<HashMap<Uuid, Arc<Connection>>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `conn` as its user's live connection, replacing any previous one
    pub async fn set_online(&self, conn: Connection) -> Arc<Connection> {
        let conn = Arc::new(conn);
        let mut entries = self.entries.write().await;
        let previous = entries.insert(conn.user_id, Arc::clone(&conn));

        if let Some(previous) = previous {
            tracing::debug!(
                user_id = %conn.user_id,
                superseded_session_id = %previous.session_id,
                session_id = %conn.session_id,
                "Connection superseded by reconnect"
            );
        }

        tracing::info!(
            session_id = %conn.session_id,
            user_id = %conn.user_id,
            online_users = entries.len(),
            "User online"
        );

        conn
    }

    /// Remove the entry whose connection is `session_id`.
    ///
    /// Returns the user that went offline. A stale session (already
    /// superseded by a newer connection for the same user) removes nothing
    /// and returns `None`.
    pub async fn set_offline(&self, session_id: Uuid) -> Option<Uuid> {
        let mut entries = self.entries.write().await;
        let user_id = entries
            .iter()
            .find(|(_, conn)| conn.session_id == session_id)
            .map(|(user_id, _)| *user_id);

        match user_id {
            Some(user_id) => {
                entries.remove(&user_id);
                tracing::info!(
                    session_id = %session_id,
                    user_id = %user_id,
                    online_users = entries.len(),
                    "User offline"
                );
                Some(user_id)
            }
            None => {
                tracing::debug!(session_id = %session_id, "Stale disconnect ignored");
                None
            }
        }
    }

    /// Current live connection for `user_id`
    pub async fn lookup(&self, user_id: Uuid) -> Option<Arc<Connection>> {
        self.entries.read().await.get(&user_id).cloned()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.entries.read().await.contains_key(&user_id)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        self.entries.read().await.keys().copied().collect()
    }

    /// Snapshot of every live connection
    pub async fn connections(&self) -> Vec<Arc<Connection>> {
        self.entries.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
