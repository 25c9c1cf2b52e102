//! WebSocket support for real-time features
//!
//! One socket per authenticated session. Connecting registers the user in the
//! presence registry; everything the messaging core dispatches for that user
//! is forwarded over the socket as JSON `ServerEvent`s. Inbound frames are
//! parsed as `ClientEvent`s (ping, typing indicators).

pub mod handler;

pub use handler::ws_handler;
