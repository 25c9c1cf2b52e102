//! Live event types and serialization
//!
//! Defines all client-to-server and server-to-client event types
//! with type-safe serde serialization. Every payload is a tagged variant
//! with a fixed field set; nothing is forwarded as free-form JSON.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use bazaar_shared::conversation::ConversationKey;

use crate::models::{Message, SupportTicket};

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Started typing to `receiver_id`
    TypingStart { receiver_id: Uuid },

    /// Stopped typing to `receiver_id`
    TypingStop { receiver_id: Uuid },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Events
// =============================================================================

/// Events sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection acknowledged
    Connected { session_id: Uuid },

    /// New two-party message addressed to the recipient
    NewMessage { message: Message },

    /// A message in one of the recipient's conversations was edited
    MessageEdited { message: Message },

    /// A message in one of the recipient's conversations was deleted
    MessageDeleted {
        message_id: Uuid,
        conversation_key: ConversationKey,
    },

    /// A whole conversation was removed by the other participant
    ConversationDeleted { conversation_key: ConversationKey },

    /// Typing indicator relayed from `sender_id`
    Typing { sender_id: Uuid, is_typing: bool },

    /// Message fanned out by an administrator
    BulkMessage { message: Message },

    /// New or updated unassigned support request (admins only)
    SupportRequest { ticket: SupportTicket, is_new: bool },

    /// The recipient's ticket now has an administrator
    TicketAssigned { ticket_id: Uuid, admin_id: Uuid },

    /// Another administrator took the ticket; drop it from the queue
    TicketClaimed { ticket_id: Uuid, admin_id: Uuid },

    /// Ticket reached its terminal state
    TicketClosed { ticket_id: Uuid },

    /// User presence changed
    PresenceUpdate { user_id: Uuid, online: bool },

    /// Identities online at the moment of connecting
    PresenceBatch { users: Vec<Uuid> },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}

impl ServerEvent {
    /// Tag used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::NewMessage { .. } => "new_message",
            ServerEvent::MessageEdited { .. } => "message_edited",
            ServerEvent::MessageDeleted { .. } => "message_deleted",
            ServerEvent::ConversationDeleted { .. } => "conversation_deleted",
            ServerEvent::Typing { .. } => "typing",
            ServerEvent::BulkMessage { .. } => "bulk_message",
            ServerEvent::SupportRequest { .. } => "support_request",
            ServerEvent::TicketAssigned { .. } => "ticket_assigned",
            ServerEvent::TicketClaimed { .. } => "ticket_claimed",
            ServerEvent::TicketClosed { .. } => "ticket_closed",
            ServerEvent::PresenceUpdate { .. } => "presence_update",
            ServerEvent::PresenceBatch { .. } => "presence_batch",
            ServerEvent::Pong => "pong",
            ServerEvent::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"type":"typing_start","receiver_id":"550e8400-e29b-41d4-a716-446655440000"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::TypingStart { receiver_id } => {
                assert_eq!(
                    receiver_id.to_string(),
                    "550e8400-e29b-41d4-a716-446655440000"
                );
            }
            _ => panic!("Expected TypingStart event"),
        }
    }

    #[test]
    fn test_unknown_client_event_is_rejected() {
        let json = r#"{"type":"send_everything","payload":{}}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn test_server_event_serialization() {
        let event = ServerEvent::Pong;
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_presence_update_serialization() {
        let user_id = Uuid::new_v4();
        let event = ServerEvent::PresenceUpdate {
            user_id,
            online: false,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "presence_update");
        assert_eq!(value["user_id"], user_id.to_string());
        assert_eq!(value["online"], false);
        assert_eq!(event.kind(), "presence_update");
    }
}
