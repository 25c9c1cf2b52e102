//! Messaging domain types

use bazaar_shared::conversation::ConversationKey;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Messages
// =============================================================================

/// A persisted two-party chat message
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_key: ConversationKey,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub read_at: Option<OffsetDateTime>,
    pub is_edited: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Message {
    /// The participant on the other side from `user_id`'s point of view
    pub fn counterpart_of(&self, user_id: Uuid) -> Uuid {
        if self.sender_id == user_id {
            self.receiver_id
        } else {
            self.sender_id
        }
    }
}

/// New message about to be appended
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_key: ConversationKey,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
}

/// Offset-based page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.max(1),
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }
}

/// One page of a conversation, ascending by creation time
#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: i64,
    pub page: u32,
    pub page_size: u32,
}

/// Entry of a user's conversation list
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub counterpart_id: Uuid,
    pub last_message: Message,
    pub unread_count: i64,
}

// =============================================================================
// Support tickets
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    Assigned,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::Assigned => "assigned",
            TicketStatus::Closed => "closed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(TicketStatus::Open),
            "assigned" => Some(TicketStatus::Assigned),
            "closed" => Some(TicketStatus::Closed),
            _ => None,
        }
    }

    /// Open and assigned tickets block a user from opening another one
    pub fn is_active(&self) -> bool {
        !matches!(self, TicketStatus::Closed)
    }
}

/// A user's request for administrative help
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupportTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub assigned_admin_id: Option<Uuid>,
    pub status: TicketStatus,
    pub last_message: Option<String>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Result of the create-or-reuse step
#[derive(Debug, Clone, Serialize)]
pub struct OpenedTicket {
    #[serde(flatten)]
    pub ticket: SupportTicket,
    /// False when an existing open/assigned ticket was reused; callers use it
    /// to suppress duplicate "ticket created" notifications.
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps_to_first_page() {
        let page = PageRequest::new(0, 0);
        assert_eq!(page.page, 1);
        assert_eq!(page.page_size, 1);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_page_request_offset() {
        let page = PageRequest::new(3, 20);
        assert_eq!(page.offset(), 40);
        assert_eq!(page.limit(), 20);
    }

    #[test]
    fn test_ticket_status_column_values() {
        for status in [TicketStatus::Open, TicketStatus::Assigned, TicketStatus::Closed] {
            assert_eq!(TicketStatus::parse(status.as_str()), Some(status));
        }
        assert!(TicketStatus::Open.is_active());
        assert!(TicketStatus::Assigned.is_active());
        assert!(!TicketStatus::Closed.is_active());
    }
}
