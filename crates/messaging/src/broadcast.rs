//! Admin bulk messaging
//!
//! A bulk send is a batch of independent two-party messages from one admin.
//! Each recipient's message is persisted on its own; live delivery follows
//! for every message that was saved. One failed save never undoes or blocks
//! the others.

use std::collections::HashSet;
use std::sync::Arc;

use bazaar_shared::{Principal, Role};
use serde::Serialize;
use uuid::Uuid;

use crate::chat::ChatService;
use crate::dispatch::Dispatcher;
use crate::error::{MessagingError, MessagingResult};
use crate::events::ServerEvent;
use crate::store::Directory;

/// Recipient selection for a bulk send
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkTarget {
    /// Every reachable provider and customer
    All,
    Providers,
    Customers,
    /// Exactly these identities (any role, including admins)
    Explicit(Vec<Uuid>),
}

impl BulkTarget {
    /// Parse a wire mode. `user_ids` is only consulted for `explicit`.
    pub fn parse(mode: &str, user_ids: Vec<Uuid>) -> MessagingResult<Self> {
        match mode {
            "all" => Ok(BulkTarget::All),
            "providers" => Ok(BulkTarget::Providers),
            "customers" => Ok(BulkTarget::Customers),
            "explicit" => Ok(BulkTarget::Explicit(user_ids)),
            other => Err(MessagingError::InvalidArgument(format!(
                "invalid recipient mode '{}'",
                other
            ))),
        }
    }
}

/// What a bulk send did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub recipients: usize,
    pub persisted: usize,
    pub delivered_live: usize,
    /// Recipients whose message could not be saved
    pub failed: Vec<Uuid>,
}

#[derive(Clone)]
pub struct Broadcaster {
    directory: Arc<dyn Directory>,
    chat: ChatService,
    dispatcher: Dispatcher,
}

impl Broadcaster {
    pub fn new(directory: Arc<dyn Directory>, chat: ChatService, dispatcher: Dispatcher) -> Self {
        Self {
            directory,
            chat,
            dispatcher,
        }
    }

    /// Send `text` from `sender` to every identity `target` resolves to
    pub async fn send_bulk(
        &self,
        sender: Principal,
        target: BulkTarget,
        text: &str,
    ) -> MessagingResult<BulkReport> {
        if !sender.is_admin() {
            tracing::warn!(user_id = %sender.id, "Non-admin attempted bulk send");
            return Err(MessagingError::Forbidden("administrator access required"));
        }
        self.chat.validate_text(text)?;

        let explicit = matches!(target, BulkTarget::Explicit(_));
        let recipients = self.resolve(sender.id, target).await?;
        if recipients.is_empty() {
            if explicit {
                return Err(MessagingError::InvalidArgument(
                    "no valid recipients".to_string(),
                ));
            }
            return Ok(BulkReport::default());
        }

        let mut messages = Vec::with_capacity(recipients.len());
        let mut failed = Vec::new();
        let mut last_error = None;
        for receiver_id in &recipients {
            match self.chat.persist(sender.id, *receiver_id, text).await {
                Ok(message) => messages.push(message),
                Err(e) => {
                    tracing::warn!(
                        sender_id = %sender.id,
                        receiver_id = %receiver_id,
                        error = %e,
                        "Bulk message not saved for recipient"
                    );
                    failed.push(*receiver_id);
                    last_error = Some(e);
                }
            }
        }
        if messages.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let mut delivered_live = 0;
        for message in &messages {
            let delivered = self
                .dispatcher
                .notify(
                    message.receiver_id,
                    ServerEvent::BulkMessage {
                        message: message.clone(),
                    },
                )
                .await;
            if delivered {
                delivered_live += 1;
            }
        }

        let report = BulkReport {
            recipients: recipients.len(),
            persisted: messages.len(),
            delivered_live,
            failed,
        };
        tracing::info!(
            sender_id = %sender.id,
            recipients = report.recipients,
            delivered_live = report.delivered_live,
            failed = report.failed.len(),
            "Bulk message sent"
        );

        Ok(report)
    }

    /// Concrete recipient ids, deduplicated, sender excluded
    async fn resolve(&self, sender_id: Uuid, target: BulkTarget) -> MessagingResult<Vec<Uuid>> {
        let candidates: Vec<Uuid> = match target {
            BulkTarget::All => {
                let mut ids = self.role_ids(Role::Provider).await?;
                ids.extend(self.role_ids(Role::Customer).await?);
                ids
            }
            BulkTarget::Providers => self.role_ids(Role::Provider).await?,
            BulkTarget::Customers => self.role_ids(Role::Customer).await?,
            BulkTarget::Explicit(user_ids) => {
                let mut ids = Vec::with_capacity(user_ids.len());
                for user_id in user_ids {
                    match self.directory.account(user_id).await? {
                        Some(account) if account.is_reachable() => ids.push(account.id),
                        _ => tracing::debug!(user_id = %user_id, "Skipping unreachable bulk recipient"),
                    }
                }
                ids
            }
        };

        let mut seen = HashSet::new();
        Ok(candidates
            .into_iter()
            .filter(|id| *id != sender_id && seen.insert(*id))
            .collect())
    }

    async fn role_ids(&self, role: Role) -> MessagingResult<Vec<Uuid>> {
        Ok(self
            .directory
            .accounts_by_role(role)
            .await?
            .into_iter()
            .map(|account| account.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::chat::ChatLimits;
    use crate::models::{Message, NewMessage, PageRequest};
    use crate::presence::{Connection, PresenceRegistry};
    use crate::store::{MemoryDirectory, MemoryStore, MessageStore};
    use async_trait::async_trait;
    use bazaar_shared::{conversation::ConversationKey, Account};
    use tokio::sync::mpsc;

    fn broadcaster(directory: Arc<MemoryDirectory>) -> Broadcaster {
        with_store(directory, Arc::new(MemoryStore::new()), PresenceRegistry::new())
    }

    fn with_store(
        directory: Arc<MemoryDirectory>,
        messages: Arc<dyn MessageStore>,
        presence: PresenceRegistry,
    ) -> Broadcaster {
        let dispatcher = Dispatcher::new(presence);
        let chat = ChatService::new(
            messages,
            directory.clone(),
            dispatcher.clone(),
            ChatLimits::default(),
        );
        Broadcaster::new(directory, chat, dispatcher)
    }

    /// Memory store whose `append` fails on the listed call numbers (1-based)
    struct FailingAppends {
        inner: MemoryStore,
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    impl FailingAppends {
        fn new(fail_on: Vec<usize>) -> Self {
            Self {
                inner: MemoryStore::new(),
                calls: AtomicUsize::new(0),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl MessageStore for FailingAppends {
        async fn append(&self, new: NewMessage) -> MessagingResult<Message> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(MessagingError::Storage("connection reset".to_string()));
            }
            self.inner.append(new).await
        }

        async fn get(&self, message_id: Uuid) -> MessagingResult<Option<Message>> {
            MessageStore::get(&self.inner, message_id).await
        }

        async fn list_by_conversation(
            &self,
            key: &ConversationKey,
            page: PageRequest,
        ) -> MessagingResult<(Vec<Message>, i64)> {
            self.inner.list_by_conversation(key, page).await
        }

        async fn mark_read(&self, key: &ConversationKey, receiver_id: Uuid) -> MessagingResult<u64> {
            self.inner.mark_read(key, receiver_id).await
        }

        async fn update_text(
            &self,
            message_id: Uuid,
            text: &str,
        ) -> MessagingResult<Option<Message>> {
            self.inner.update_text(message_id, text).await
        }

        async fn delete(&self, message_id: Uuid) -> MessagingResult<bool> {
            self.inner.delete(message_id).await
        }

        async fn delete_conversation(&self, key: &ConversationKey) -> MessagingResult<u64> {
            self.inner.delete_conversation(key).await
        }

        async fn unread_count(&self, user_id: Uuid) -> MessagingResult<i64> {
            self.inner.unread_count(user_id).await
        }

        async fn unread_in_conversation(
            &self,
            key: &ConversationKey,
            receiver_id: Uuid,
        ) -> MessagingResult<i64> {
            self.inner.unread_in_conversation(key, receiver_id).await
        }

        async fn counterparts(&self, user_id: Uuid) -> MessagingResult<Vec<Uuid>> {
            self.inner.counterparts(user_id).await
        }

        async fn last_message(&self, key: &ConversationKey) -> MessagingResult<Option<Message>> {
            self.inner.last_message(key).await
        }
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(BulkTarget::parse("all", vec![]).unwrap(), BulkTarget::All);
        assert_eq!(
            BulkTarget::parse("providers", vec![Uuid::new_v4()]).unwrap(),
            BulkTarget::Providers
        );
        assert!(matches!(
            BulkTarget::parse("everyone", vec![]),
            Err(MessagingError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_non_admin_is_forbidden() {
        let directory = Arc::new(MemoryDirectory::new());
        let provider = directory.add(Role::Provider).await;
        let bulk = broadcaster(directory);

        let result = bulk
            .send_bulk(Principal::new(provider, Role::Provider), BulkTarget::All, "hi")
            .await;
        assert!(matches!(result, Err(MessagingError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_empty_explicit_list_is_invalid() {
        let directory = Arc::new(MemoryDirectory::new());
        let admin = Principal::new(directory.add(Role::Admin).await, Role::Admin);
        let bulk = broadcaster(directory);

        let result = bulk
            .send_bulk(admin, BulkTarget::Explicit(vec![Uuid::new_v4(), admin.id]), "hi")
            .await;
        assert!(matches!(result, Err(MessagingError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_empty_role_target_succeeds_with_zero_sends() {
        let directory = Arc::new(MemoryDirectory::new());
        let admin = Principal::new(directory.add(Role::Admin).await, Role::Admin);
        let bulk = broadcaster(directory);

        let report = bulk.send_bulk(admin, BulkTarget::Customers, "hi").await.unwrap();
        assert_eq!(report, BulkReport::default());
    }

    #[tokio::test]
    async fn test_all_skips_admins_and_restricted_accounts() {
        let directory = Arc::new(MemoryDirectory::new());
        let admin = Principal::new(directory.add(Role::Admin).await, Role::Admin);
        directory.add(Role::Admin).await;
        directory.add(Role::Provider).await;
        directory.add(Role::Customer).await;
        directory
            .insert(Account {
                id: Uuid::new_v4(),
                role: Role::Customer,
                is_active: true,
                is_restricted: true,
            })
            .await;
        let bulk = broadcaster(directory);

        let report = bulk.send_bulk(admin, BulkTarget::All, "maintenance tonight").await.unwrap();
        assert_eq!(report.recipients, 2);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.delivered_live, 0);
    }

    #[tokio::test]
    async fn test_failed_save_does_not_sink_the_batch() {
        let directory = Arc::new(MemoryDirectory::new());
        let admin = Principal::new(directory.add(Role::Admin).await, Role::Admin);
        let presence = PresenceRegistry::new();
        let mut providers = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..3 {
            let id = directory.add(Role::Provider).await;
            let (tx, rx) = mpsc::channel(8);
            presence.set_online(Connection::new(id, tx)).await;
            providers.push(id);
            receivers.push(rx);
        }
        let store = Arc::new(FailingAppends::new(vec![2]));
        let bulk = with_store(directory, store.clone(), presence);

        let report = bulk
            .send_bulk(admin, BulkTarget::Explicit(providers.clone()), "price update")
            .await
            .unwrap();
        assert_eq!(report.recipients, 3);
        assert_eq!(report.persisted, 2);
        assert_eq!(report.delivered_live, 2);
        assert_eq!(report.failed, vec![providers[1]]);

        for (i, rx) in receivers.iter_mut().enumerate() {
            let got_live = matches!(rx.try_recv(), Ok(ServerEvent::BulkMessage { .. }));
            assert_eq!(got_live, i != 1);
            let unread = store.unread_count(providers[i]).await.unwrap();
            assert_eq!(unread, if i == 1 { 0 } else { 1 });
        }
    }

    #[tokio::test]
    async fn test_bulk_fails_only_when_nothing_saved() {
        let directory = Arc::new(MemoryDirectory::new());
        let admin = Principal::new(directory.add(Role::Admin).await, Role::Admin);
        let provider = directory.add(Role::Provider).await;
        let bulk = with_store(
            directory,
            Arc::new(FailingAppends::new(vec![1])),
            PresenceRegistry::new(),
        );

        let result = bulk
            .send_bulk(admin, BulkTarget::Explicit(vec![provider]), "hello")
            .await;
        assert!(matches!(result, Err(MessagingError::Storage(_))));
    }

    #[tokio::test]
    async fn test_explicit_list_skips_restricted_accounts() {
        let directory = Arc::new(MemoryDirectory::new());
        let admin = Principal::new(directory.add(Role::Admin).await, Role::Admin);
        let provider = directory.add(Role::Provider).await;
        let restricted = Uuid::new_v4();
        directory
            .insert(Account {
                id: restricted,
                role: Role::Provider,
                is_active: true,
                is_restricted: true,
            })
            .await;
        let bulk = broadcaster(directory);

        let report = bulk
            .send_bulk(admin, BulkTarget::Explicit(vec![provider, restricted]), "hi")
            .await
            .unwrap();
        assert_eq!(report.recipients, 1);
        assert_eq!(report.persisted, 1);

        let only_restricted = bulk
            .send_bulk(admin, BulkTarget::Explicit(vec![restricted]), "hi")
            .await;
        assert!(matches!(only_restricted, Err(MessagingError::InvalidArgument(_))));
    }
}
