//! In-memory storage backend
//!
//! Holds one lock per conversation and one lock per ticket so writers on
//! different records never contend. The outer maps are only write-locked
//! to add or drop a record.
//!
//! Lock order is always `active_tickets` -> ticket and thread ->
//! `message_index`, never the reverse. Threads are emptied in place rather
//! than removed so an append never lands in a detached thread.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bazaar_shared::{conversation::ConversationKey, Account, Role};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{Directory, MessageStore, TicketStore};
use crate::error::{MessagingError, MessagingResult};
use crate::models::{Message, NewMessage, OpenedTicket, PageRequest, SupportTicket, TicketStatus};

type Thread = Arc<RwLock<Vec<Message>>>;
type TicketCell = Arc<Mutex<SupportTicket>>;

/// Process-local message and ticket storage
#[derive(Default)]
pub struct MemoryStore {
    /// conversation key -> messages in append order
    threads: RwLock<HashMap<ConversationKey, Thread>>,
    /// message id -> conversation key
    message_index: RwLock<HashMap<Uuid, ConversationKey>>,
    tickets: RwLock<HashMap<Uuid, TicketCell>>,
    /// user id -> id of the user's open or assigned ticket
    active_tickets: Mutex<HashMap<Uuid, Uuid>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn thread(&self, key: &ConversationKey) -> Option<Thread> {
        self.threads.read().await.get(key).cloned()
    }

    async fn thread_or_create(&self, key: &ConversationKey) -> Thread {
        if let Some(thread) = self.thread(key).await {
            return thread;
        }
        let mut threads = self.threads.write().await;
        Arc::clone(threads.entry(key.clone()).or_default())
    }

    async fn thread_of(&self, message_id: Uuid) -> Option<Thread> {
        let key = self.message_index.read().await.get(&message_id).cloned()?;
        self.thread(&key).await
    }

    async fn ticket_cell(&self, ticket_id: Uuid) -> Option<TicketCell> {
        self.tickets.read().await.get(&ticket_id).cloned()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append(&self, new: NewMessage) -> MessagingResult<Message> {
        let thread = self.thread_or_create(&new.conversation_key).await;
        let mut messages = thread.write().await;

        // Keep creation time non-decreasing within a thread even if the clock steps back
        let mut now = OffsetDateTime::now_utc();
        if let Some(last) = messages.last() {
            now = now.max(last.created_at);
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_key: new.conversation_key,
            sender_id: new.sender_id,
            receiver_id: new.receiver_id,
            text: new.text,
            is_read: false,
            read_at: None,
            is_edited: false,
            created_at: now,
            updated_at: now,
        };
        self.message_index
            .write()
            .await
            .insert(message.id, message.conversation_key.clone());
        messages.push(message.clone());

        Ok(message)
    }

    async fn get(&self, message_id: Uuid) -> MessagingResult<Option<Message>> {
        let Some(thread) = self.thread_of(message_id).await else {
            return Ok(None);
        };
        let messages = thread.read().await;
        Ok(messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn list_by_conversation(
        &self,
        key: &ConversationKey,
        page: PageRequest,
    ) -> MessagingResult<(Vec<Message>, i64)> {
        let Some(thread) = self.thread(key).await else {
            return Ok((Vec::new(), 0));
        };
        let messages = thread.read().await;
        let total = i64::try_from(messages.len()).unwrap_or(i64::MAX);

        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);

        // Walk newest-first like the database does, then flip for delivery
        let mut selected: Vec<Message> = messages
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        selected.reverse();

        Ok((selected, total))
    }

    async fn mark_read(&self, key: &ConversationKey, receiver_id: Uuid) -> MessagingResult<u64> {
        let Some(thread) = self.thread(key).await else {
            return Ok(0);
        };
        let mut messages = thread.write().await;
        let now = OffsetDateTime::now_utc();

        let mut updated = 0;
        for message in messages
            .iter_mut()
            .filter(|m| m.receiver_id == receiver_id && !m.is_read)
        {
            message.is_read = true;
            message.read_at = Some(now);
            message.updated_at = now;
            updated += 1;
        }

        Ok(updated)
    }

    async fn update_text(&self, message_id: Uuid, text: &str) -> MessagingResult<Option<Message>> {
        let Some(thread) = self.thread_of(message_id).await else {
            return Ok(None);
        };
        let mut messages = thread.write().await;
        let Some(message) = messages.iter_mut().find(|m| m.id == message_id) else {
            return Ok(None);
        };

        message.text = text.to_string();
        message.is_edited = true;
        message.updated_at = OffsetDateTime::now_utc();
        Ok(Some(message.clone()))
    }

    async fn delete(&self, message_id: Uuid) -> MessagingResult<bool> {
        let Some(thread) = self.thread_of(message_id).await else {
            return Ok(false);
        };
        let mut messages = thread.write().await;
        let before = messages.len();
        messages.retain(|m| m.id != message_id);
        let removed = messages.len() != before;
        drop(messages);

        self.message_index.write().await.remove(&message_id);
        Ok(removed)
    }

    async fn delete_conversation(&self, key: &ConversationKey) -> MessagingResult<u64> {
        let Some(thread) = self.thread(key).await else {
            return Ok(0);
        };
        let mut messages = thread.write().await;
        let removed: Vec<Message> = messages.drain(..).collect();

        let mut index = self.message_index.write().await;
        for message in &removed {
            index.remove(&message.id);
        }

        Ok(u64::try_from(removed.len()).unwrap_or(u64::MAX))
    }

    async fn unread_count(&self, user_id: Uuid) -> MessagingResult<i64> {
        let threads: Vec<Thread> = {
            let threads = self.threads.read().await;
            threads
                .iter()
                .filter(|(key, _)| key.involves(user_id))
                .map(|(_, thread)| Arc::clone(thread))
                .collect()
        };

        let mut count = 0;
        for thread in threads {
            let messages = thread.read().await;
            count += messages
                .iter()
                .filter(|m| m.receiver_id == user_id && !m.is_read)
                .count();
        }

        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn unread_in_conversation(
        &self,
        key: &ConversationKey,
        receiver_id: Uuid,
    ) -> MessagingResult<i64> {
        let Some(thread) = self.thread(key).await else {
            return Ok(0);
        };
        let messages = thread.read().await;
        let count = messages
            .iter()
            .filter(|m| m.receiver_id == receiver_id && !m.is_read)
            .count();

        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn counterparts(&self, user_id: Uuid) -> MessagingResult<Vec<Uuid>> {
        let threads: Vec<Thread> = {
            let threads = self.threads.read().await;
            threads
                .iter()
                .filter(|(key, _)| key.involves(user_id))
                .map(|(_, thread)| Arc::clone(thread))
                .collect()
        };

        let mut counterparts = HashSet::new();
        for thread in threads {
            let messages = thread.read().await;
            if let Some(message) = messages.first() {
                counterparts.insert(message.counterpart_of(user_id));
            }
        }

        Ok(counterparts.into_iter().collect())
    }

    async fn last_message(&self, key: &ConversationKey) -> MessagingResult<Option<Message>> {
        let Some(thread) = self.thread(key).await else {
            return Ok(None);
        };
        let messages = thread.read().await;
        Ok(messages.last().cloned())
    }
}

#[async_trait]
impl TicketStore for MemoryStore {
    async fn find_active(&self, user_id: Uuid) -> MessagingResult<Option<SupportTicket>> {
        let active = self.active_tickets.lock().await;
        let Some(ticket_id) = active.get(&user_id).copied() else {
            return Ok(None);
        };
        let Some(cell) = self.ticket_cell(ticket_id).await else {
            return Ok(None);
        };
        let ticket = cell.lock().await.clone();
        Ok(Some(ticket))
    }

    async fn open_or_reuse(
        &self,
        user_id: Uuid,
        first_message: Option<&str>,
    ) -> MessagingResult<OpenedTicket> {
        let mut active = self.active_tickets.lock().await;

        if let Some(ticket_id) = active.get(&user_id).copied() {
            if let Some(cell) = self.ticket_cell(ticket_id).await {
                let ticket = cell.lock().await.clone();
                if ticket.status.is_active() {
                    return Ok(OpenedTicket {
                        ticket,
                        created: false,
                    });
                }
            }
        }

        let now = OffsetDateTime::now_utc();
        let ticket = SupportTicket {
            id: Uuid::new_v4(),
            user_id,
            assigned_admin_id: None,
            status: TicketStatus::Open,
            last_message: first_message.map(str::to_string),
            last_message_at: first_message.map(|_| now),
            created_at: now,
            updated_at: now,
        };

        self.tickets
            .write()
            .await
            .insert(ticket.id, Arc::new(Mutex::new(ticket.clone())));
        active.insert(user_id, ticket.id);

        Ok(OpenedTicket {
            ticket,
            created: true,
        })
    }

    async fn get(&self, ticket_id: Uuid) -> MessagingResult<Option<SupportTicket>> {
        let Some(cell) = self.ticket_cell(ticket_id).await else {
            return Ok(None);
        };
        let ticket = cell.lock().await.clone();
        Ok(Some(ticket))
    }

    async fn touch(&self, ticket_id: Uuid, text: &str) -> MessagingResult<SupportTicket> {
        let cell = self
            .ticket_cell(ticket_id)
            .await
            .ok_or(MessagingError::NotFound("ticket"))?;
        let mut ticket = cell.lock().await;

        let now = OffsetDateTime::now_utc();
        ticket.last_message = Some(text.to_string());
        ticket.last_message_at = Some(now);
        ticket.updated_at = now;
        Ok(ticket.clone())
    }

    async fn claim(&self, ticket_id: Uuid, admin_id: Uuid) -> MessagingResult<SupportTicket> {
        let cell = self
            .ticket_cell(ticket_id)
            .await
            .ok_or(MessagingError::NotFound("ticket"))?;

        // Check and set under the ticket's own lock
        let mut ticket = cell.lock().await;
        if ticket.status != TicketStatus::Open {
            return Err(MessagingError::Conflict(format!(
                "cannot claim ticket in status '{}'",
                ticket.status.as_str()
            )));
        }

        ticket.status = TicketStatus::Assigned;
        ticket.assigned_admin_id = Some(admin_id);
        ticket.updated_at = OffsetDateTime::now_utc();
        Ok(ticket.clone())
    }

    async fn close(&self, ticket_id: Uuid, admin_id: Uuid) -> MessagingResult<SupportTicket> {
        let cell = self
            .ticket_cell(ticket_id)
            .await
            .ok_or(MessagingError::NotFound("ticket"))?;

        let mut active = self.active_tickets.lock().await;
        let mut ticket = cell.lock().await;
        if ticket.status == TicketStatus::Closed {
            return Err(MessagingError::Conflict(
                "cannot close ticket in status 'closed'".to_string(),
            ));
        }

        ticket.status = TicketStatus::Closed;
        if ticket.assigned_admin_id.is_none() {
            ticket.assigned_admin_id = Some(admin_id);
        }
        ticket.updated_at = OffsetDateTime::now_utc();
        if active.get(&ticket.user_id) == Some(&ticket.id) {
            active.remove(&ticket.user_id);
        }
        Ok(ticket.clone())
    }

    async fn list_by_status(&self, status: TicketStatus) -> MessagingResult<Vec<SupportTicket>> {
        let cells: Vec<TicketCell> = self.tickets.read().await.values().cloned().collect();

        let mut tickets = Vec::new();
        for cell in cells {
            let ticket = cell.lock().await;
            if ticket.status == status {
                tickets.push(ticket.clone());
            }
        }
        tickets.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        Ok(tickets)
    }
}

// =============================================================================
// Directory
// =============================================================================

/// Process-local account directory
#[derive(Default)]
pub struct MemoryDirectory {
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, account: Account) {
        self.accounts.write().await.insert(account.id, account);
    }

    /// Register an active, unrestricted account and return its id
    pub async fn add(&self, role: Role) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(Account {
            id,
            role,
            is_active: true,
            is_restricted: false,
        })
        .await;
        id
    }

    pub async fn remove(&self, user_id: Uuid) {
        self.accounts.write().await.remove(&user_id);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn account(&self, user_id: Uuid) -> MessagingResult<Option<Account>> {
        Ok(self.accounts.read().await.get(&user_id).cloned())
    }

    async fn accounts_by_role(&self, role: Role) -> MessagingResult<Vec<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .filter(|a| a.role == role && a.is_reachable())
            .cloned()
            .collect())
    }

    async fn admins(&self) -> MessagingResult<Vec<Uuid>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .filter(|a| a.role.is_admin() && a.is_active)
            .map(|a| a.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_shared::conversation_key;

    fn new_message(sender: Uuid, receiver: Uuid, text: &str) -> NewMessage {
        NewMessage {
            conversation_key: conversation_key(sender, receiver),
            sender_id: sender,
            receiver_id: receiver,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_pages_are_cut_newest_first_but_ascending() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        for i in 0..5 {
            store.append(new_message(a, b, &format!("m{i}"))).await.unwrap();
        }

        let key = conversation_key(a, b);
        let (first, total) = store
            .list_by_conversation(&key, PageRequest::new(1, 2))
            .await
            .unwrap();
        let (second, _) = store
            .list_by_conversation(&key, PageRequest::new(2, 2))
            .await
            .unwrap();

        assert_eq!(total, 5);
        let texts = |page: &[Message]| page.iter().map(|m| m.text.clone()).collect::<Vec<_>>();
        assert_eq!(texts(&first[..]), ["m3", "m4"]);
        assert_eq!(texts(&second[..]), ["m1", "m2"]);
        assert!(first.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_mark_read_only_touches_receiver_side() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.append(new_message(a, b, "to b")).await.unwrap();
        store.append(new_message(b, a, "to a")).await.unwrap();

        let key = conversation_key(a, b);
        assert_eq!(store.mark_read(&key, b).await.unwrap(), 1);
        assert_eq!(store.mark_read(&key, b).await.unwrap(), 0);
        assert_eq!(store.unread_count(a).await.unwrap(), 1);
        assert_eq!(store.unread_count(b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_conversation_clears_index() {
        let store = MemoryStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let message = store.append(new_message(a, b, "hello")).await.unwrap();

        let deleted = store
            .delete_conversation(&conversation_key(b, a))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(MessageStore::get(&store, message.id).await.unwrap().is_none());
        assert!(store.counterparts(a).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_appends_racing_conversation_delete_are_never_lost() {
        for _ in 0..50 {
            let store = Arc::new(MemoryStore::new());
            let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
            let key = conversation_key(a, b);

            let mut appends = Vec::new();
            for i in 0..12 {
                let store = Arc::clone(&store);
                appends.push(tokio::spawn(async move {
                    store.append(new_message(a, b, &format!("m{i}"))).await
                }));
            }
            let mut deletes = Vec::new();
            for _ in 0..4 {
                let store = Arc::clone(&store);
                let key = key.clone();
                deletes.push(tokio::spawn(
                    async move { store.delete_conversation(&key).await },
                ));
            }

            let mut acknowledged = 0;
            for handle in appends {
                handle.await.unwrap().unwrap();
                acknowledged += 1;
            }
            let mut deleted = 0;
            for handle in deletes {
                deleted += handle.await.unwrap().unwrap();
            }

            let (remaining, total) = store
                .list_by_conversation(&key, PageRequest::new(1, 100))
                .await
                .unwrap();
            assert_eq!(total, i64::try_from(remaining.len()).unwrap());
            assert_eq!(deleted + u64::try_from(remaining.len()).unwrap(), acknowledged);
            for message in &remaining {
                assert!(MessageStore::get(store.as_ref(), message.id)
                    .await
                    .unwrap()
                    .is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_closed_ticket_does_not_block_new_one() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();

        let first = store.open_or_reuse(user, Some("hi")).await.unwrap();
        let again = store.open_or_reuse(user, None).await.unwrap();
        assert!(first.created);
        assert!(!again.created);
        assert_eq!(first.ticket.id, again.ticket.id);

        let admin = Uuid::new_v4();
        let closed = store.close(first.ticket.id, admin).await.unwrap();
        assert_eq!(closed.assigned_admin_id, Some(admin));
        assert!(store.find_active(user).await.unwrap().is_none());

        let fresh = store.open_or_reuse(user, None).await.unwrap();
        assert!(fresh.created);
        assert_ne!(fresh.ticket.id, first.ticket.id);
        assert!(matches!(
            store.close(first.ticket.id, admin).await,
            Err(MessagingError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_directory_filters_unreachable_accounts() {
        let directory = MemoryDirectory::new();
        let provider = directory.add(Role::Provider).await;
        directory
            .insert(Account {
                id: Uuid::new_v4(),
                role: Role::Provider,
                is_active: false,
                is_restricted: false,
            })
            .await;

        let providers = directory.accounts_by_role(Role::Provider).await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].id, provider);
    }
}
