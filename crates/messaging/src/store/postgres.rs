//! Postgres storage backend

use async_trait::async_trait;
use bazaar_shared::{conversation::ConversationKey, Account, Role};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Directory, MessageStore, TicketStore};
use crate::error::{MessagingError, MessagingResult};
use crate::models::{Message, NewMessage, OpenedTicket, PageRequest, SupportTicket, TicketStatus};

/// Attempts at insert-or-select before giving up on a ticket that keeps
/// closing underneath us
const OPEN_OR_REUSE_ATTEMPTS: usize = 3;

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_key: String,
    sender_id: Uuid,
    receiver_id: Uuid,
    text: String,
    is_read: bool,
    read_at: Option<OffsetDateTime>,
    is_edited: bool,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id,
            conversation_key: ConversationKey::from_stored(row.conversation_key),
            sender_id: row.sender_id,
            receiver_id: row.receiver_id,
            text: row.text,
            is_read: row.is_read,
            read_at: row.read_at,
            is_edited: row.is_edited,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TicketRow {
    id: Uuid,
    user_id: Uuid,
    assigned_admin_id: Option<Uuid>,
    status: String,
    last_message: Option<String>,
    last_message_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<TicketRow> for SupportTicket {
    type Error = MessagingError;

    fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
        let status = TicketStatus::parse(&row.status).ok_or_else(|| {
            MessagingError::Storage(format!("unknown ticket status '{}'", row.status))
        })?;

        Ok(SupportTicket {
            id: row.id,
            user_id: row.user_id,
            assigned_admin_id: row.assigned_admin_id,
            status,
            last_message: row.last_message,
            last_message_at: row.last_message_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    role: String,
    is_active: bool,
    is_restricted: bool,
}

impl AccountRow {
    fn into_account(self) -> Option<Account> {
        let Some(role) = Role::parse(&self.role) else {
            tracing::warn!(user_id = %self.id, role = %self.role, "Skipping account with unknown role");
            return None;
        };

        Some(Account {
            id: self.id,
            role,
            is_active: self.is_active,
            is_restricted: self.is_restricted,
        })
    }
}

const MESSAGE_COLUMNS: &str = "id, conversation_key, sender_id, receiver_id, text, is_read, read_at, \
                               is_edited, created_at, updated_at";

const TICKET_COLUMNS: &str = "id, user_id, assigned_admin_id, status, last_message, last_message_at, \
                              created_at, updated_at";

// =============================================================================
// Message Store
// =============================================================================

#[derive(Clone)]
pub struct PgMessageStore {
    pool: PgPool,
}

impl PgMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    async fn append(&self, new: NewMessage) -> MessagingResult<Message> {
        let row: MessageRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO messages (id, conversation_key, sender_id, receiver_id, text)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.conversation_key.as_str())
        .bind(new.sender_id)
        .bind(new.receiver_id)
        .bind(&new.text)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn get(&self, message_id: Uuid) -> MessagingResult<Option<Message>> {
        let row: Option<MessageRow> =
            sqlx::query_as(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
                .bind(message_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Into::into))
    }

    async fn list_by_conversation(
        &self,
        key: &ConversationKey,
        page: PageRequest,
    ) -> MessagingResult<(Vec<Message>, i64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_key = $1")
                .bind(key.as_str())
                .fetch_one(&self.pool)
                .await?;

        let rows: Vec<MessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_key = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(key.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        // Newest-first from storage, oldest-first for delivery
        let messages = rows.into_iter().rev().map(Into::into).collect();
        Ok((messages, total))
    }

    async fn mark_read(&self, key: &ConversationKey, receiver_id: Uuid) -> MessagingResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, read_at = NOW(), updated_at = NOW()
            WHERE conversation_key = $1 AND receiver_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(key.as_str())
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn update_text(&self, message_id: Uuid, text: &str) -> MessagingResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            r#"
            UPDATE messages
            SET text = $2, is_edited = TRUE, updated_at = NOW()
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn delete(&self, message_id: Uuid) -> MessagingResult<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_conversation(&self, key: &ConversationKey) -> MessagingResult<u64> {
        let result = sqlx::query("DELETE FROM messages WHERE conversation_key = $1")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn unread_count(&self, user_id: Uuid) -> MessagingResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM messages WHERE receiver_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn unread_in_conversation(
        &self,
        key: &ConversationKey,
        receiver_id: Uuid,
    ) -> MessagingResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM messages
            WHERE conversation_key = $1 AND receiver_id = $2 AND is_read = FALSE
            "#,
        )
        .bind(key.as_str())
        .bind(receiver_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn counterparts(&self, user_id: Uuid) -> MessagingResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT CASE WHEN sender_id = $1 THEN receiver_id ELSE sender_id END
            FROM messages
            WHERE sender_id = $1 OR receiver_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn last_message(&self, key: &ConversationKey) -> MessagingResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE conversation_key = $1
            ORDER BY created_at DESC, seq DESC
            LIMIT 1
            "#
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}

// =============================================================================
// Ticket Store
// =============================================================================

#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguish a lost race from a missing ticket after a guarded update
    /// matched no row.
    async fn explain_miss(&self, ticket_id: Uuid, action: &str) -> MessagingError {
        match self.get(ticket_id).await {
            Ok(Some(ticket)) => MessagingError::Conflict(format!(
                "cannot {action} ticket in status '{}'",
                ticket.status.as_str()
            )),
            Ok(None) => MessagingError::NotFound("ticket"),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn find_active(&self, user_id: Uuid) -> MessagingResult<Option<SupportTicket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TICKET_COLUMNS}
            FROM support_tickets
            WHERE user_id = $1 AND status IN ('open', 'assigned')
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SupportTicket::try_from).transpose()
    }

    async fn open_or_reuse(
        &self,
        user_id: Uuid,
        first_message: Option<&str>,
    ) -> MessagingResult<OpenedTicket> {
        for _ in 0..OPEN_OR_REUSE_ATTEMPTS {
            // The partial unique index turns a concurrent second insert into a no-op
            let inserted: Option<TicketRow> = sqlx::query_as(&format!(
                r#"
                INSERT INTO support_tickets (id, user_id, status, last_message, last_message_at)
                VALUES ($1, $2, 'open', $3::text, CASE WHEN $3::text IS NULL THEN NULL ELSE NOW() END)
                ON CONFLICT (user_id) WHERE status IN ('open', 'assigned') DO NOTHING
                RETURNING {TICKET_COLUMNS}
                "#
            ))
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(first_message)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(row) = inserted {
                return Ok(OpenedTicket {
                    ticket: row.try_into()?,
                    created: true,
                });
            }

            if let Some(ticket) = self.find_active(user_id).await? {
                return Ok(OpenedTicket {
                    ticket,
                    created: false,
                });
            }
            // Closed between the insert and the lookup; try again
        }

        Err(MessagingError::Conflict(
            "support ticket changed concurrently".to_string(),
        ))
    }

    async fn get(&self, ticket_id: Uuid) -> MessagingResult<Option<SupportTicket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM support_tickets WHERE id = $1"
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SupportTicket::try_from).transpose()
    }

    async fn touch(&self, ticket_id: Uuid, text: &str) -> MessagingResult<SupportTicket> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE support_tickets
            SET last_message = $2, last_message_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(text)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(MessagingError::NotFound("ticket"))?.try_into()
    }

    async fn claim(&self, ticket_id: Uuid, admin_id: Uuid) -> MessagingResult<SupportTicket> {
        // Single conditional update: the status guard and the write are one statement
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE support_tickets
            SET status = 'assigned', assigned_admin_id = $2, updated_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(admin_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.explain_miss(ticket_id, "claim").await),
        }
    }

    async fn close(&self, ticket_id: Uuid, admin_id: Uuid) -> MessagingResult<SupportTicket> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE support_tickets
            SET status = 'closed',
                assigned_admin_id = COALESCE(assigned_admin_id, $2),
                closed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status <> 'closed'
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket_id)
        .bind(admin_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(self.explain_miss(ticket_id, "close").await),
        }
    }

    async fn list_by_status(&self, status: TicketStatus) -> MessagingResult<Vec<SupportTicket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TICKET_COLUMNS}
            FROM support_tickets
            WHERE status = $1
            ORDER BY updated_at DESC
            "#
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SupportTicket::try_from).collect()
    }
}

// =============================================================================
// Directory
// =============================================================================

#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn account(&self, user_id: Uuid) -> MessagingResult<Option<Account>> {
        let row: Option<AccountRow> = sqlx::query_as(
            "SELECT id, role, is_active, is_restricted FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(AccountRow::into_account))
    }

    async fn accounts_by_role(&self, role: Role) -> MessagingResult<Vec<Account>> {
        let rows: Vec<AccountRow> = sqlx::query_as(
            r#"
            SELECT id, role, is_active, is_restricted
            FROM users
            WHERE role = $1 AND is_active = TRUE AND is_restricted = FALSE
            "#,
        )
        .bind(role.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().filter_map(AccountRow::into_account).collect())
    }

    async fn admins(&self) -> MessagingResult<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin' AND is_active = TRUE")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }
}
