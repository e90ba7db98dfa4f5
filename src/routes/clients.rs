use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use validator::Validate;

use crate::{
    dto::inbox_dto::{CreateClientPayload, ListClientsQuery},
    error::Result,
    middleware::auth::RequestContext,
    AppState,
};

#[axum::debug_handler]
pub async fn list_clients(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListClientsQuery>,
) -> Result<impl IntoResponse> {
    let clients = state
        .client_service
        .list(
            ctx.business_id()?,
            query.search.as_deref(),
            query.limit.unwrap_or(100),
        )
        .await?;
    Ok(Json(clients))
}

#[axum::debug_handler]
pub async fn create_client(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateClientPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let client = state
        .client_service
        .upsert(ctx.business_id()?, payload.name.as_deref(), &payload.phone)
        .await?;
    Ok((StatusCode::CREATED, Json(client)))
}
