//! Notification dispatcher
//!
//! Best-effort live delivery. If the recipient has no live connection the
//! event is dropped; the persisted record is what they will see on their
//! next fetch. Delivery failures are logged, never returned to the caller.

use uuid::Uuid;

use crate::events::ServerEvent;
use crate::presence::{Connection, DeliveryError, PresenceRegistry};

#[derive(Clone)]
pub struct Dispatcher {
    presence: PresenceRegistry,
}

impl Dispatcher {
    pub fn new(presence: PresenceRegistry) -> Self {
        Self { presence }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Deliver `event` to `user_id` if they are online. Returns whether the
    /// event was queued on a live connection.
    pub async fn notify(&self, user_id: Uuid, event: ServerEvent) -> bool {
        let Some(conn) = self.presence.lookup(user_id).await else {
            tracing::trace!(user_id = %user_id, event = event.kind(), "Recipient offline, skipping live delivery");
            return false;
        };
        deliver(&conn, event)
    }

    /// Deliver `event` to every online user in `user_ids`. Returns the number
    /// of live deliveries.
    pub async fn notify_many(&self, user_ids: &[Uuid], event: &ServerEvent) -> usize {
        let mut delivered = 0;
        for user_id in user_ids {
            if self.notify(*user_id, event.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver `event` to every live connection except `except`'s
    pub async fn broadcast(&self, event: &ServerEvent, except: Option<Uuid>) -> usize {
        let connections = self.presence.connections().await;
        connections
            .iter()
            .filter(|conn| Some(conn.user_id) != except)
            .filter(|conn| deliver(conn, event.clone()))
            .count()
    }
}

fn deliver(conn: &Connection, event: ServerEvent) -> bool {
    let kind = event.kind();
    match conn.send(event) {
        Ok(()) => true,
        Err(DeliveryError::Full) => {
            tracing::warn!(
                session_id = %conn.session_id,
                user_id = %conn.user_id,
                event = kind,
                "Live delivery dropped: outbound buffer full"
            );
            false
        }
        Err(DeliveryError::Closed) => {
            tracing::debug!(
                session_id = %conn.session_id,
                user_id = %conn.user_id,
                event = kind,
                "Live delivery dropped: connection closed"
            );
            false
        }
    }
}
