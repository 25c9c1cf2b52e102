//! Support ticket routes
//!
//! Users open sessions and post messages; admins list, claim and close
//! tickets. Role checks live in the messaging core.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use bazaar_messaging::{OpenedTicket, SupportPost, SupportTicket, TicketStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SupportMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct ListTicketsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TicketListResponse {
    pub tickets: Vec<SupportTicket>,
}

// =============================================================================
// User Handlers
// =============================================================================

/// Open a support session, or resume the active one
pub async fn open_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<OpenedTicket>> {
    let opened = state
        .messenger
        .support()
        .open_session(auth_user.principal())
        .await?;

    Ok(Json(opened))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<SupportMessageRequest>,
) -> ApiResult<Json<SupportPost>> {
    let post = state
        .messenger
        .support()
        .post_message(auth_user.principal(), &req.text)
        .await?;

    Ok(Json(post))
}

// =============================================================================
// Admin Handlers
// =============================================================================

/// List tickets by status (default: open)
pub async fn admin_list_tickets(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<ListTicketsQuery>,
) -> ApiResult<Json<TicketListResponse>> {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => Some(
            TicketStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("invalid ticket status '{}'", raw)))?,
        ),
    };

    let tickets = state
        .messenger
        .support()
        .list(auth_user.principal(), status)
        .await?;

    Ok(Json(TicketListResponse { tickets }))
}

pub async fn admin_claim_ticket(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<SupportTicket>> {
    let ticket = state
        .messenger
        .support()
        .claim(auth_user.principal(), ticket_id)
        .await?;

    Ok(Json(ticket))
}

pub async fn admin_close_ticket(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(ticket_id): Path<Uuid>,
) -> ApiResult<Json<SupportTicket>> {
    let ticket = state
        .messenger
        .support()
        .close(auth_user.principal(), ticket_id)
        .await?;

    Ok(Json(ticket))
}
