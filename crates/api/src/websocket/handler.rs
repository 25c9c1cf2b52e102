//! WebSocket handler for Axum
//!
//! Handles WebSocket connections, authentication, presence lifecycle and
//! client event routing.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use bazaar_messaging::{ClientEvent, Connection, ServerEvent};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: String,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket
/// Authenticates via query parameter token instead of middleware Extension
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, ApiError> {
    let auth_user = app_state
        .auth_state()
        .authenticate(&params.token)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "WebSocket auth failed");
            e
        })?;

    tracing::info!(user_id = %auth_user.user_id, "WebSocket connection upgrade requested");

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, auth_user, app_state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, auth_user: AuthUser, app_state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded so a stalled client cannot grow memory without limit
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(app_state.config.ws_outbound_buffer);

    let conn = connect(&app_state, auth_user.user_id, tx).await;
    let session_id = conn.session_id;

    // Spawn task to send messages to client
    let send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(e) => {
                    tracing::error!(error = ?e, "Failed to serialize WebSocket event");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = ?e, "WebSocket receive error");
                break;
            }
        };

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => handle_client_event(event, &conn, &app_state).await,
                Err(e) => {
                    tracing::warn!(
                        session_id = %session_id,
                        error = ?e,
                        "Failed to parse client event"
                    );
                    reply(
                        &conn,
                        ServerEvent::Error {
                            message: "Invalid event format".to_string(),
                        },
                    );
                }
            },
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            Message::Binary(_) => {}
        }
    }

    tracing::info!(session_id = %session_id, user_id = %auth_user.user_id, "WebSocket connection closing");
    disconnect(&app_state, session_id).await;

    send_task.abort();
}

/// Register the connection and announce the user
async fn connect(
    app_state: &AppState,
    user_id: Uuid,
    tx: mpsc::Sender<ServerEvent>,
) -> Arc<Connection> {
    let presence = app_state.presence();
    let conn = presence.set_online(Connection::new(user_id, tx)).await;

    reply(
        &conn,
        ServerEvent::Connected {
            session_id: conn.session_id,
        },
    );
    reply(
        &conn,
        ServerEvent::PresenceBatch {
            users: presence.online_users().await,
        },
    );

    let notified = app_state
        .messenger
        .dispatcher()
        .broadcast(
            &ServerEvent::PresenceUpdate {
                user_id,
                online: true,
            },
            Some(user_id),
        )
        .await;
    tracing::debug!(user_id = %user_id, session_id = %conn.session_id, notified, "User online");

    conn
}

/// Drop the connection. Offline is only announced when this session was
/// still the user's live one.
async fn disconnect(app_state: &AppState, session_id: Uuid) {
    let Some(user_id) = app_state.presence().set_offline(session_id).await else {
        tracing::debug!(session_id = %session_id, "Stale session closed, user still online");
        return;
    };

    app_state
        .messenger
        .dispatcher()
        .broadcast(
            &ServerEvent::PresenceUpdate {
                user_id,
                online: false,
            },
            Some(user_id),
        )
        .await;
    tracing::debug!(user_id = %user_id, session_id = %session_id, "User offline");
}

/// Handle client event
async fn handle_client_event(event: ClientEvent, conn: &Connection, app_state: &AppState) {
    match event {
        ClientEvent::Ping => reply(conn, ServerEvent::Pong),

        ClientEvent::TypingStart { receiver_id } => {
            app_state
                .messenger
                .chat()
                .typing(conn.user_id, receiver_id, true)
                .await;
        }

        ClientEvent::TypingStop { receiver_id } => {
            app_state
                .messenger
                .chat()
                .typing(conn.user_id, receiver_id, false)
                .await;
        }
    }
}

/// Queue an event on this connection's own channel
fn reply(conn: &Connection, event: ServerEvent) {
    let kind = event.kind();
    if let Err(e) = conn.send(event) {
        tracing::debug!(session_id = %conn.session_id, event = kind, error = %e, "Reply dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::memory_state;
    use bazaar_shared::Role;

    #[tokio::test]
    async fn test_connect_announces_presence() {
        let (state, directory) = memory_state();
        let watcher = directory.add(Role::Admin).await;
        let user = directory.add(Role::Customer).await;

        let (watcher_tx, mut watcher_rx) = mpsc::channel(8);
        connect(&state, watcher, watcher_tx).await;
        assert!(matches!(watcher_rx.try_recv(), Ok(ServerEvent::Connected { .. })));
        assert!(matches!(
            watcher_rx.try_recv(),
            Ok(ServerEvent::PresenceBatch { users }) if users == vec![watcher]
        ));

        let (user_tx, mut user_rx) = mpsc::channel(8);
        let conn = connect(&state, user, user_tx).await;
        assert!(matches!(
            user_rx.try_recv(),
            Ok(ServerEvent::Connected { session_id }) if session_id == conn.session_id
        ));
        match user_rx.try_recv() {
            Ok(ServerEvent::PresenceBatch { mut users }) => {
                users.sort();
                let mut expected = vec![watcher, user];
                expected.sort();
                assert_eq!(users, expected);
            }
            other => panic!("Expected PresenceBatch, got {:?}", other),
        }
        assert!(matches!(
            watcher_rx.try_recv(),
            Ok(ServerEvent::PresenceUpdate { user_id, online: true }) if user_id == user
        ));

        disconnect(&state, conn.session_id).await;
        assert!(matches!(
            watcher_rx.try_recv(),
            Ok(ServerEvent::PresenceUpdate { user_id, online: false }) if user_id == user
        ));
    }

    #[tokio::test]
    async fn test_stale_disconnect_is_silent() {
        let (state, directory) = memory_state();
        let watcher = directory.add(Role::Provider).await;
        let user = directory.add(Role::Customer).await;

        let (watcher_tx, mut watcher_rx) = mpsc::channel(8);
        connect(&state, watcher, watcher_tx).await;

        let (old_tx, _old_rx) = mpsc::channel(8);
        let old = connect(&state, user, old_tx).await;
        let (new_tx, _new_rx) = mpsc::channel(8);
        connect(&state, user, new_tx).await;
        while watcher_rx.try_recv().is_ok() {}

        disconnect(&state, old.session_id).await;
        assert!(state.presence().is_online(user).await);
        assert!(watcher_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_and_typing() {
        let (state, directory) = memory_state();
        let alice = directory.add(Role::Customer).await;
        let bob = directory.add(Role::Provider).await;

        let (alice_tx, mut alice_rx) = mpsc::channel(8);
        let alice_conn = connect(&state, alice, alice_tx).await;
        let (bob_tx, mut bob_rx) = mpsc::channel(8);
        connect(&state, bob, bob_tx).await;
        while alice_rx.try_recv().is_ok() {}
        while bob_rx.try_recv().is_ok() {}

        handle_client_event(ClientEvent::Ping, &alice_conn, &state).await;
        assert!(matches!(alice_rx.try_recv(), Ok(ServerEvent::Pong)));

        handle_client_event(
            ClientEvent::TypingStart { receiver_id: bob },
            &alice_conn,
            &state,
        )
        .await;
        assert!(matches!(
            bob_rx.try_recv(),
            Ok(ServerEvent::Typing { sender_id, is_typing: true }) if sender_id == alice
        ));
    }
}
