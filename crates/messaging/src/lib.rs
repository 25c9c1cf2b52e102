//! Bazaar messaging core
//!
//! Two-party messaging, presence, live notification dispatch, support
//! tickets and admin bulk sends. Transport-agnostic: the API crate adapts
//! these services to HTTP and WebSocket.

// Allow unwrap/expect in tests - panics are acceptable in test code
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod broadcast;
pub mod chat;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod messenger;
pub mod models;
pub mod presence;
pub mod store;
pub mod support;

pub use broadcast::{Broadcaster, BulkReport, BulkTarget};
pub use chat::{ChatLimits, ChatService};
pub use dispatch::Dispatcher;
pub use error::{MessagingError, MessagingResult};
pub use events::{ClientEvent, ServerEvent};
pub use messenger::Messenger;
pub use models::{
    ConversationSummary, Message, MessagePage, OpenedTicket, PageRequest, SupportTicket,
    TicketStatus,
};
pub use presence::{Connection, DeliveryError, PresenceRegistry};
pub use support::{SupportDesk, SupportPost};
