//! Two-party messaging routes
//!
//! Thin adapters over the messaging core. The authenticated caller is always
//! the acting principal.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use bazaar_messaging::{BulkReport, BulkTarget, ConversationSummary, Message, MessagePage};
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
pub struct SendMessageRequest {
    pub receiver_id: Uuid,
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct BulkMessageRequest {
    /// `all`, `providers`, `customers` or `explicit`
    pub mode: String,
    #[serde(default)]
    pub user_ids: Vec<Uuid>,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct UpdatedResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// Send a message to another user
pub async fn send_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<(StatusCode, Json<Message>)> {
    if req.receiver_id == auth_user.user_id {
        return Err(ApiError::BadRequest(
            "cannot send a message to yourself".to_string(),
        ));
    }

    let message = state
        .messenger
        .send_direct(auth_user.principal(), req.receiver_id, &req.text)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// List the caller's conversations, most recent first
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<ConversationsResponse>> {
    let conversations = state
        .messenger
        .chat()
        .conversations(auth_user.principal())
        .await?;

    Ok(Json(ConversationsResponse { conversations }))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UnreadCountResponse>> {
    let count = state.messenger.chat().unread_count(auth_user.user_id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

/// One page of the conversation with `user_id`
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Json<MessagePage>> {
    let page = state
        .messenger
        .chat()
        .page(auth_user.principal(), user_id, query.page, query.page_size)
        .await?;

    Ok(Json(page))
}

pub async fn mark_conversation_read(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<UpdatedResponse>> {
    let updated = state
        .messenger
        .chat()
        .mark_read(auth_user.principal(), user_id)
        .await?;

    Ok(Json(UpdatedResponse { updated }))
}

pub async fn delete_conversation(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<DeletedResponse>> {
    let deleted = state
        .messenger
        .chat()
        .delete_conversation(auth_user.principal(), user_id)
        .await?;

    Ok(Json(DeletedResponse { deleted }))
}

pub async fn edit_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
    Json(req): Json<EditMessageRequest>,
) -> ApiResult<Json<Message>> {
    let message = state
        .messenger
        .chat()
        .edit(auth_user.principal(), message_id, &req.text)
        .await?;

    Ok(Json(message))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(message_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .messenger
        .chat()
        .delete(auth_user.principal(), message_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Admin: send one message to many users
pub async fn send_bulk(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<BulkMessageRequest>,
) -> ApiResult<Json<BulkReport>> {
    let target = BulkTarget::parse(&req.mode, req.user_ids)?;
    let report = state
        .messenger
        .broadcaster()
        .send_bulk(auth_user.principal(), target, &req.text)
        .await?;

    Ok(Json(report))
}
