//! Messaging facade
//!
//! Wires the services over one set of stores and one presence registry, and
//! owns the cross-service flows.

use std::sync::Arc;

use bazaar_shared::Principal;
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::chat::{ChatLimits, ChatService};
use crate::dispatch::Dispatcher;
use crate::error::MessagingResult;
use crate::models::Message;
use crate::presence::PresenceRegistry;
use crate::store::{Directory, MessageStore, TicketStore};
use crate::support::SupportDesk;

#[derive(Clone)]
pub struct Messenger {
    chat: ChatService,
    support: SupportDesk,
    broadcaster: Broadcaster,
    dispatcher: Dispatcher,
}

impl Messenger {
    pub fn new(
        messages: Arc<dyn MessageStore>,
        tickets: Arc<dyn TicketStore>,
        directory: Arc<dyn Directory>,
        presence: PresenceRegistry,
        limits: ChatLimits,
    ) -> Self {
        let dispatcher = Dispatcher::new(presence);
        let chat = ChatService::new(messages, directory.clone(), dispatcher.clone(), limits);
        let support = SupportDesk::new(tickets, directory.clone(), chat.clone(), dispatcher.clone());
        let broadcaster = Broadcaster::new(directory, chat.clone(), dispatcher.clone());

        Self {
            chat,
            support,
            broadcaster,
            dispatcher,
        }
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    pub fn support(&self) -> &SupportDesk {
        &self.support
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn presence(&self) -> &PresenceRegistry {
        self.dispatcher.presence()
    }

    /// Two-party send.
    ///
    /// When an admin sends, the receiver's open support ticket (if any) is
    /// claimed for that admin after the message is stored. A failed implicit
    /// claim never fails the send.
    pub async fn send_direct(
        &self,
        sender: Principal,
        receiver_id: Uuid,
        text: &str,
    ) -> MessagingResult<Message> {
        let message = self.chat.send(sender, receiver_id, text).await?;

        if sender.is_admin() {
            if let Err(err) = self
                .support
                .implicit_claim_on_first_response(sender, receiver_id)
                .await
            {
                tracing::warn!(
                    admin_id = %sender.id,
                    user_id = %receiver_id,
                    error = %err,
                    "Implicit ticket claim failed"
                );
            }
        }

        Ok(message)
    }
}
