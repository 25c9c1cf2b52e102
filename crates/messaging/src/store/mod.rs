//! Storage seams for the messaging core
//!
//! The core talks to durable state only through these traits. Two backends
//! ship with the crate:
//!
//! - [`postgres`]: the production backend on `sqlx`
//! - [`memory`]: a process-local backend with per-record locking, used by
//!   tests and local development

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use bazaar_shared::{conversation::ConversationKey, Account, Role};
use uuid::Uuid;

use crate::error::MessagingResult;
use crate::models::{Message, NewMessage, OpenedTicket, PageRequest, SupportTicket, TicketStatus};

pub use memory::{MemoryDirectory, MemoryStore};
pub use postgres::{PgDirectory, PgMessageStore, PgTicketStore};

/// Durable, append-mostly log of chat messages keyed by conversation
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a new unread, unedited message stamped with the current time
    async fn append(&self, new: NewMessage) -> MessagingResult<Message>;

    async fn get(&self, message_id: Uuid) -> MessagingResult<Option<Message>>;

    /// One page of a conversation plus its total size.
    ///
    /// Pages are cut newest-first; the returned messages are ascending by
    /// creation time.
    async fn list_by_conversation(
        &self,
        key: &ConversationKey,
        page: PageRequest,
    ) -> MessagingResult<(Vec<Message>, i64)>;

    /// Mark every unread message addressed to `receiver_id` as read.
    /// Returns the number of messages that transitioned.
    async fn mark_read(&self, key: &ConversationKey, receiver_id: Uuid) -> MessagingResult<u64>;

    /// Replace the text and set the edited flag. `None` if the message is gone.
    async fn update_text(&self, message_id: Uuid, text: &str) -> MessagingResult<Option<Message>>;

    /// Physically remove a message. `false` if it did not exist.
    async fn delete(&self, message_id: Uuid) -> MessagingResult<bool>;

    async fn delete_conversation(&self, key: &ConversationKey) -> MessagingResult<u64>;

    /// Unread messages addressed to `user_id` across all conversations
    async fn unread_count(&self, user_id: Uuid) -> MessagingResult<i64>;

    async fn unread_in_conversation(
        &self,
        key: &ConversationKey,
        receiver_id: Uuid,
    ) -> MessagingResult<i64>;

    /// Distinct identities `user_id` has exchanged messages with
    async fn counterparts(&self, user_id: Uuid) -> MessagingResult<Vec<Uuid>>;

    async fn last_message(&self, key: &ConversationKey) -> MessagingResult<Option<Message>>;
}

/// Durable support ticket records
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// The user's open or assigned ticket, if any
    async fn find_active(&self, user_id: Uuid) -> MessagingResult<Option<SupportTicket>>;

    /// Return the user's active ticket, or create a new `open` one.
    ///
    /// Must never leave two active tickets for the same user, even under
    /// concurrent calls.
    async fn open_or_reuse(
        &self,
        user_id: Uuid,
        first_message: Option<&str>,
    ) -> MessagingResult<OpenedTicket>;

    async fn get(&self, ticket_id: Uuid) -> MessagingResult<Option<SupportTicket>>;

    /// Advance `last_message` / `last_message_at`
    async fn touch(&self, ticket_id: Uuid, text: &str) -> MessagingResult<SupportTicket>;

    /// Atomic open -> assigned check-and-set.
    ///
    /// `Conflict` if the ticket is no longer open, `NotFound` if it does not
    /// exist. At most one concurrent claim per ticket succeeds.
    async fn claim(&self, ticket_id: Uuid, admin_id: Uuid) -> MessagingResult<SupportTicket>;

    /// Terminal transition. `Conflict` if already closed.
    ///
    /// A ticket closed straight from `open` records `admin_id` as its
    /// admin, so `assigned_admin_id` is null only while the ticket is open.
    async fn close(&self, ticket_id: Uuid, admin_id: Uuid) -> MessagingResult<SupportTicket>;

    /// Tickets in `status`, most recently updated first
    async fn list_by_status(&self, status: TicketStatus) -> MessagingResult<Vec<SupportTicket>>;
}

/// Read-only view of the account directory owned by the user service
#[async_trait]
pub trait Directory: Send + Sync {
    async fn account(&self, user_id: Uuid) -> MessagingResult<Option<Account>>;

    /// Active, unrestricted accounts with `role`
    async fn accounts_by_role(&self, role: Role) -> MessagingResult<Vec<Account>>;

    /// Every active administrator identity
    async fn admins(&self) -> MessagingResult<Vec<Uuid>>;
}
