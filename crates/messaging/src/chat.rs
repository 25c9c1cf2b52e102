//! Two-party messaging
//!
//! Persists messages through the [`MessageStore`] and hands live
//! notifications to the [`Dispatcher`]. Persistence always completes (or
//! fails) before any delivery is attempted, and delivery never fails an
//! operation.

use std::sync::Arc;

use bazaar_shared::{conversation_key, Principal};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::error::{MessagingError, MessagingResult};
use crate::events::ServerEvent;
use crate::models::{ConversationSummary, Message, MessagePage, NewMessage, PageRequest};
use crate::store::{Directory, MessageStore};

/// Input limits applied before anything reaches storage
#[derive(Debug, Clone, Copy)]
pub struct ChatLimits {
    pub max_text_len: usize,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for ChatLimits {
    fn default() -> Self {
        Self {
            max_text_len: 5000,
            default_page_size: 50,
            max_page_size: 100,
        }
    }
}

#[derive(Clone)]
pub struct ChatService {
    messages: Arc<dyn MessageStore>,
    directory: Arc<dyn Directory>,
    dispatcher: Dispatcher,
    limits: ChatLimits,
}

impl ChatService {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        directory: Arc<dyn Directory>,
        dispatcher: Dispatcher,
        limits: ChatLimits,
    ) -> Self {
        Self {
            messages,
            directory,
            dispatcher,
            limits,
        }
    }

    pub fn limits(&self) -> ChatLimits {
        self.limits
    }

    /// Reject empty or oversized text
    pub fn validate_text(&self, text: &str) -> MessagingResult<()> {
        if text.trim().is_empty() {
            return Err(MessagingError::InvalidArgument(
                "message text cannot be empty".to_string(),
            ));
        }
        if text.chars().count() > self.limits.max_text_len {
            return Err(MessagingError::InvalidArgument(format!(
                "message text too long (max {} characters)",
                self.limits.max_text_len
            )));
        }
        Ok(())
    }

    /// Send a two-party message and notify the receiver if online
    pub async fn send(
        &self,
        sender: Principal,
        receiver_id: Uuid,
        text: &str,
    ) -> MessagingResult<Message> {
        self.validate_text(text)?;
        if self.directory.account(receiver_id).await?.is_none() {
            return Err(MessagingError::NotFound("user"));
        }

        let message = self.persist(sender.id, receiver_id, text).await?;
        let delivered = self
            .dispatcher
            .notify(
                receiver_id,
                ServerEvent::NewMessage {
                    message: message.clone(),
                },
            )
            .await;

        tracing::debug!(
            message_id = %message.id,
            sender_id = %sender.id,
            receiver_id = %receiver_id,
            delivered,
            "Message sent"
        );

        Ok(message)
    }

    /// Append without validation or notification. Callers own both.
    pub(crate) async fn persist(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        text: &str,
    ) -> MessagingResult<Message> {
        self.messages
            .append(NewMessage {
                conversation_key: conversation_key(sender_id, receiver_id),
                sender_id,
                receiver_id,
                text: text.to_string(),
            })
            .await
    }

    /// One page of the conversation between `viewer` and `counterpart_id`
    pub async fn page(
        &self,
        viewer: Principal,
        counterpart_id: Uuid,
        page: Option<u32>,
        page_size: Option<u32>,
    ) -> MessagingResult<MessagePage> {
        let page_size = page_size
            .unwrap_or(self.limits.default_page_size)
            .min(self.limits.max_page_size);
        let request = PageRequest::new(page.unwrap_or(1), page_size);

        let key = conversation_key(viewer.id, counterpart_id);
        let (messages, total) = self.messages.list_by_conversation(&key, request).await?;

        Ok(MessagePage {
            messages,
            total,
            page: request.page,
            page_size: request.page_size,
        })
    }

    pub async fn unread_count(&self, user_id: Uuid) -> MessagingResult<i64> {
        self.messages.unread_count(user_id).await
    }

    /// The viewer's conversations, most recent first.
    ///
    /// Counterparts that no longer resolve are skipped. Non-admin viewers
    /// never see admin counterparts here; those threads surface only through
    /// the support path.
    pub async fn conversations(&self, viewer: Principal) -> MessagingResult<Vec<ConversationSummary>> {
        let counterparts = self.messages.counterparts(viewer.id).await?;

        let mut summaries = Vec::with_capacity(counterparts.len());
        for counterpart_id in counterparts {
            let Some(account) = self.directory.account(counterpart_id).await? else {
                continue;
            };
            if account.role.is_admin() && !viewer.is_admin() {
                continue;
            }

            let key = conversation_key(viewer.id, counterpart_id);
            let Some(last_message) = self.messages.last_message(&key).await? else {
                continue;
            };
            let unread_count = self.messages.unread_in_conversation(&key, viewer.id).await?;

            summaries.push(ConversationSummary {
                counterpart_id,
                last_message,
                unread_count,
            });
        }

        summaries.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
        Ok(summaries)
    }

    /// Mark everything `counterpart_id` sent to the viewer as read
    pub async fn mark_read(&self, viewer: Principal, counterpart_id: Uuid) -> MessagingResult<u64> {
        let key = conversation_key(viewer.id, counterpart_id);
        let updated = self.messages.mark_read(&key, viewer.id).await?;
        if updated > 0 {
            tracing::debug!(user_id = %viewer.id, conversation_key = %key, updated, "Conversation marked read");
        }
        Ok(updated)
    }

    /// Replace a message's text. Only its sender may edit it.
    pub async fn edit(
        &self,
        editor: Principal,
        message_id: Uuid,
        text: &str,
    ) -> MessagingResult<Message> {
        self.validate_text(text)?;
        let message = self.owned_message(editor, message_id).await?;

        let updated = self
            .messages
            .update_text(message.id, text)
            .await?
            .ok_or(MessagingError::NotFound("message"))?;

        self.dispatcher
            .notify(
                updated.receiver_id,
                ServerEvent::MessageEdited {
                    message: updated.clone(),
                },
            )
            .await;

        Ok(updated)
    }

    /// Remove a message. Only its sender may delete it.
    pub async fn delete(&self, editor: Principal, message_id: Uuid) -> MessagingResult<()> {
        let message = self.owned_message(editor, message_id).await?;

        if !self.messages.delete(message.id).await? {
            return Err(MessagingError::NotFound("message"));
        }

        self.dispatcher
            .notify(
                message.receiver_id,
                ServerEvent::MessageDeleted {
                    message_id: message.id,
                    conversation_key: message.conversation_key,
                },
            )
            .await;

        Ok(())
    }

    /// Remove the whole thread between the viewer and `counterpart_id`
    pub async fn delete_conversation(
        &self,
        viewer: Principal,
        counterpart_id: Uuid,
    ) -> MessagingResult<u64> {
        let key = conversation_key(viewer.id, counterpart_id);
        let deleted = self.messages.delete_conversation(&key).await?;

        if deleted > 0 {
            tracing::info!(user_id = %viewer.id, conversation_key = %key, deleted, "Conversation deleted");
            self.dispatcher
                .notify(
                    counterpart_id,
                    ServerEvent::ConversationDeleted {
                        conversation_key: key,
                    },
                )
                .await;
        }

        Ok(deleted)
    }

    /// Relay a typing indicator. Nothing is persisted.
    pub async fn typing(&self, sender_id: Uuid, receiver_id: Uuid, is_typing: bool) -> bool {
        self.dispatcher
            .notify(
                receiver_id,
                ServerEvent::Typing {
                    sender_id,
                    is_typing,
                },
            )
            .await
    }

    async fn owned_message(&self, editor: Principal, message_id: Uuid) -> MessagingResult<Message> {
        let message = self
            .messages
            .get(message_id)
            .await?
            .ok_or(MessagingError::NotFound("message"))?;

        if message.sender_id != editor.id {
            tracing::warn!(
                user_id = %editor.id,
                message_id = %message_id,
                "Attempt to modify another user's message"
            );
            return Err(MessagingError::Forbidden("only the sender may modify a message"));
        }

        Ok(message)
    }
}
