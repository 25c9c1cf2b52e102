//! Support ticket desk
//!
//! Drives the `open -> assigned -> closed` lifecycle. Every open -> assigned
//! transition, explicit or implicit, goes through [`SupportDesk::assign`] and
//! therefore through the store's atomic claim.

use std::sync::Arc;

use bazaar_shared::Principal;
use serde::Serialize;
use uuid::Uuid;

use crate::chat::ChatService;
use crate::dispatch::Dispatcher;
use crate::error::{MessagingError, MessagingResult};
use crate::events::ServerEvent;
use crate::models::{Message, OpenedTicket, SupportTicket, TicketStatus};
use crate::store::{Directory, TicketStore};

/// Outcome of a user posting to support
#[derive(Debug, Clone, Serialize)]
pub struct SupportPost {
    pub ticket: SupportTicket,
    pub created: bool,
    /// Set when the ticket was assigned and the text went to the admin as a
    /// two-party message
    pub message: Option<Message>,
}

#[derive(Clone)]
pub struct SupportDesk {
    tickets: Arc<dyn TicketStore>,
    directory: Arc<dyn Directory>,
    chat: ChatService,
    dispatcher: Dispatcher,
}

impl SupportDesk {
    pub fn new(
        tickets: Arc<dyn TicketStore>,
        directory: Arc<dyn Directory>,
        chat: ChatService,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            tickets,
            directory,
            chat,
            dispatcher,
        }
    }

    /// Open a support session, reusing the user's active ticket if any
    pub async fn open_session(&self, user: Principal) -> MessagingResult<OpenedTicket> {
        ensure_not_admin(user)?;

        let opened = self.tickets.open_or_reuse(user.id, None).await?;
        if opened.created {
            tracing::info!(ticket_id = %opened.ticket.id, user_id = %user.id, "Support ticket opened");
            self.notify_admins(&ServerEvent::SupportRequest {
                ticket: opened.ticket.clone(),
                is_new: true,
            })
            .await;
        }

        Ok(opened)
    }

    /// Post a support message.
    ///
    /// Opens a ticket if the user has none. While the ticket is open the text
    /// only advances the ticket and is announced to online admins; once
    /// assigned it becomes a normal message to the assigned admin.
    pub async fn post_message(&self, user: Principal, text: &str) -> MessagingResult<SupportPost> {
        ensure_not_admin(user)?;
        self.chat.validate_text(text)?;

        let opened = self.tickets.open_or_reuse(user.id, Some(text)).await?;
        if opened.created {
            tracing::info!(ticket_id = %opened.ticket.id, user_id = %user.id, "Support ticket opened");
            self.notify_admins(&ServerEvent::SupportRequest {
                ticket: opened.ticket.clone(),
                is_new: true,
            })
            .await;
            return Ok(SupportPost {
                ticket: opened.ticket,
                created: true,
                message: None,
            });
        }

        let ticket = opened.ticket;
        match (ticket.status, ticket.assigned_admin_id) {
            (TicketStatus::Assigned, Some(admin_id)) => {
                let message = self.chat.persist(user.id, admin_id, text).await?;
                let ticket = self.tickets.touch(ticket.id, text).await?;
                self.dispatcher
                    .notify(
                        admin_id,
                        ServerEvent::NewMessage {
                            message: message.clone(),
                        },
                    )
                    .await;

                Ok(SupportPost {
                    ticket,
                    created: false,
                    message: Some(message),
                })
            }
            _ => {
                let ticket = self.tickets.touch(ticket.id, text).await?;
                self.notify_admins(&ServerEvent::SupportRequest {
                    ticket: ticket.clone(),
                    is_new: false,
                })
                .await;

                Ok(SupportPost {
                    ticket,
                    created: false,
                    message: None,
                })
            }
        }
    }

    /// Tickets in `status` (default `open`). Admin only.
    pub async fn list(
        &self,
        viewer: Principal,
        status: Option<TicketStatus>,
    ) -> MessagingResult<Vec<SupportTicket>> {
        ensure_admin(viewer)?;
        self.tickets
            .list_by_status(status.unwrap_or(TicketStatus::Open))
            .await
    }

    /// Explicitly claim an open ticket. Admin only.
    pub async fn claim(&self, admin: Principal, ticket_id: Uuid) -> MessagingResult<SupportTicket> {
        ensure_admin(admin)?;
        self.assign(ticket_id, admin.id).await
    }

    /// Assign the user's open ticket to `admin` as a side effect of the
    /// admin's first direct reply.
    ///
    /// Returns the ticket if this call performed the assignment. Losing the
    /// race to another admin is not an error here.
    pub async fn implicit_claim_on_first_response(
        &self,
        admin: Principal,
        user_id: Uuid,
    ) -> MessagingResult<Option<SupportTicket>> {
        if !admin.is_admin() {
            return Ok(None);
        }

        let Some(ticket) = self.tickets.find_active(user_id).await? else {
            return Ok(None);
        };
        if ticket.status != TicketStatus::Open {
            return Ok(None);
        }

        match self.assign(ticket.id, admin.id).await {
            Ok(ticket) => Ok(Some(ticket)),
            Err(MessagingError::Conflict(reason)) => {
                tracing::debug!(
                    ticket_id = %ticket.id,
                    admin_id = %admin.id,
                    reason = %reason,
                    "Implicit claim lost the race"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Close a ticket. Terminal; a closed ticket is never re-opened.
    pub async fn close(&self, admin: Principal, ticket_id: Uuid) -> MessagingResult<SupportTicket> {
        ensure_admin(admin)?;

        let ticket = self.tickets.close(ticket_id, admin.id).await?;
        tracing::info!(ticket_id = %ticket.id, admin_id = %admin.id, "Support ticket closed");

        let event = ServerEvent::TicketClosed {
            ticket_id: ticket.id,
        };
        self.dispatcher.notify(ticket.user_id, event.clone()).await;
        if let Some(assigned) = ticket.assigned_admin_id {
            self.dispatcher.notify(assigned, event).await;
        }

        Ok(ticket)
    }

    async fn assign(&self, ticket_id: Uuid, admin_id: Uuid) -> MessagingResult<SupportTicket> {
        let ticket = self.tickets.claim(ticket_id, admin_id).await?;
        tracing::info!(ticket_id = %ticket.id, admin_id = %admin_id, "Support ticket assigned");

        self.dispatcher
            .notify(
                ticket.user_id,
                ServerEvent::TicketAssigned {
                    ticket_id: ticket.id,
                    admin_id,
                },
            )
            .await;

        let others: Vec<Uuid> = self
            .admins()
            .await
            .into_iter()
            .filter(|id| *id != admin_id)
            .collect();
        self.dispatcher
            .notify_many(
                &others,
                &ServerEvent::TicketClaimed {
                    ticket_id: ticket.id,
                    admin_id,
                },
            )
            .await;

        Ok(ticket)
    }

    async fn notify_admins(&self, event: &ServerEvent) -> usize {
        let admins = self.admins().await;
        self.dispatcher.notify_many(&admins, event).await
    }

    /// Admin ids for fan-out. A lookup failure only costs live notifications.
    async fn admins(&self) -> Vec<Uuid> {
        match self.directory.admins().await {
            Ok(admins) => admins,
            Err(err) => {
                tracing::warn!(error = %err, "Failed to enumerate admins for notification");
                Vec::new()
            }
        }
    }
}

fn ensure_admin(principal: Principal) -> MessagingResult<()> {
    if principal.is_admin() {
        Ok(())
    } else {
        Err(MessagingError::Forbidden("administrator access required"))
    }
}

fn ensure_not_admin(principal: Principal) -> MessagingResult<()> {
    if principal.is_admin() {
        Err(MessagingError::Forbidden(
            "administrators cannot open support tickets",
        ))
    } else {
        Ok(())
    }
}
