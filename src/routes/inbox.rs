use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    Extension,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::inbox_dto::{
        LinkClientPayload, ListConversationsQuery, ListMessagesQuery, MarkReadPayload,
        SendMessagePayload, SendMessageResponse,
    },
    error::Result,
    middleware::auth::RequestContext,
    AppState,
};

#[axum::debug_handler]
pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListConversationsQuery>,
) -> Result<impl IntoResponse> {
    let list = state
        .conversation_service
        .list(
            ctx.business_id()?,
            query.page.unwrap_or(1),
            query.per_page.unwrap_or(30),
            query.unread_only.unwrap_or(false),
        )
        .await?;
    Ok(Json(list))
}

#[axum::debug_handler]
pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let conversation = state
        .conversation_service
        .get(ctx.business_id()?, id)
        .await?;
    Ok(Json(conversation))
}

#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<impl IntoResponse> {
    let business_id = ctx.business_id()?;
    state.conversation_service.get(business_id, id).await?;
    let messages = state
        .message_service
        .list_for_conversation(business_id, id, query.before, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(messages))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{id}/messages",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = SendMessagePayload,
    responses(
        (status = 200, description = "Send attempted; `ok` is false when the provider rejected it", body = SendMessageResponse),
        (status = 400, description = "Invalid text or no WhatsApp number connected"),
        (status = 404, description = "Conversation not found")
    )
)]
#[axum::debug_handler]
pub async fn send_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SendMessagePayload>,
) -> Result<Json<SendMessageResponse>> {
    payload.validate()?;
    let response = state.send_service.send_text(&ctx, id, &payload.text).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/conversations/{id}/read",
    params(
        ("id" = Uuid, Path, description = "Conversation ID")
    ),
    request_body = MarkReadPayload,
    responses(
        (status = 200, description = "Conversation acknowledged"),
        (status = 400, description = "Message belongs to another conversation"),
        (status = 404, description = "Conversation not found")
    )
)]
#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<MarkReadPayload>,
) -> Result<impl IntoResponse> {
    let conversation = state
        .conversation_service
        .mark_read(ctx.business_id()?, id, payload.up_to_message_id)
        .await?;
    Ok(Json(conversation))
}

#[axum::debug_handler]
pub async fn link_client(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LinkClientPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let (client, conversation) = state
        .client_service
        .upsert_and_link(ctx.business_id()?, id, payload.name.as_deref())
        .await?;
    Ok(Json(json!({ "client": client, "conversation": conversation })))
}
