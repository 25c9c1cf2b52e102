//! API routes

pub mod health;
pub mod messages;
pub mod support;


use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{auth::require_auth, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Protected API routes (auth required) - under /api/v1
    let protected_api_routes = Router::new()
        // Messaging
        .route("/messages", post(messages::send_message))
        .route("/messages/conversations", get(messages::list_conversations))
        .route("/messages/unread-count", get(messages::unread_count))
        .route("/messages/bulk", post(messages::send_bulk))
        .route(
            "/messages/with/:user_id",
            get(messages::get_conversation).delete(messages::delete_conversation),
        )
        .route("/messages/with/:user_id/read", post(messages::mark_conversation_read))
        .route(
            "/messages/:message_id",
            patch(messages::edit_message).delete(messages::delete_message),
        )
        // Support
        .route("/support/session", post(support::open_session))
        .route("/support/messages", post(support::post_message))
        // Admin support
        .route("/admin/support/tickets", get(support::admin_list_tickets))
        .route("/admin/support/tickets/:ticket_id/claim", post(support::admin_claim_ticket))
        .route("/admin/support/tickets/:ticket_id/close", post(support::admin_close_ticket))
        .layer(middleware::from_fn_with_state(auth_state, require_auth));

    // WebSocket routes (auth handled in handler via query parameter)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let api_v1_routes = Router::new()
        .merge(protected_api_routes)
        .merge(websocket_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
