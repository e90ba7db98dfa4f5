use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::admin_dto::{
        BindWhatsAppPayload, CreateBusinessPayload, ListBusinessesQuery, OnboardingTokenResponse,
        OutboxRetryResponse, OverviewQuery, OverviewRange,
    },
    error::Result,
    middleware::auth::RequestContext,
    AppState,
};

#[utoipa::path(
    get,
    path = "/api/admin/overview",
    params(
        ("range" = Option<String>, Query, description = "One of 2h, 24h (default), 7d, 30d")
    ),
    responses(
        (status = 200, description = "KPIs, alerts and drill-down tables"),
        (status = 400, description = "Unknown range"),
        (status = 403, description = "Not an admin session")
    )
)]
#[axum::debug_handler]
pub async fn overview(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<OverviewQuery>,
) -> Result<impl IntoResponse> {
    let range = OverviewRange::parse(query.range.as_deref())?;
    let overview = state.admin_service.overview(&ctx, range).await?;
    Ok(Json(overview))
}

#[utoipa::path(
    post,
    path = "/api/admin/outbox/{id}/retry",
    params(
        ("id" = Uuid, Path, description = "Outbox message ID")
    ),
    responses(
        (status = 200, description = "Requeued", body = OutboxRetryResponse),
        (status = 400, description = "Outbox message is not FAILED"),
        (status = 404, description = "Outbox message not found")
    )
)]
#[axum::debug_handler]
pub async fn retry_outbox(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
) -> Result<Json<OutboxRetryResponse>> {
    let row = state.admin_service.retry_outbox(&ctx, id).await?;
    Ok(Json(OutboxRetryResponse::from(row)))
}

#[axum::debug_handler]
pub async fn list_businesses(
    State(state): State<AppState>,
    Query(query): Query<ListBusinessesQuery>,
) -> Result<impl IntoResponse> {
    let businesses = state
        .business_service
        .list(query.include_deleted.unwrap_or(false))
        .await?;
    Ok(Json(businesses))
}

#[axum::debug_handler]
pub async fn create_business(
    State(state): State<AppState>,
    Json(payload): Json<CreateBusinessPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let business = state.business_service.create(&payload.name).await?;
    Ok((StatusCode::CREATED, Json(business)))
}

#[axum::debug_handler]
pub async fn delete_business(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let business = state.business_service.soft_delete(id).await?;
    Ok(Json(business))
}

#[axum::debug_handler]
pub async fn restore_business(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let business = state.business_service.restore(id).await?;
    Ok(Json(business))
}

#[axum::debug_handler]
pub async fn bind_whatsapp(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<BindWhatsAppPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let account = state
        .tenant_service
        .bind_whatsapp_account(id, &payload)
        .await?;
    Ok(Json(account))
}

#[axum::debug_handler]
pub async fn issue_onboarding_token(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let token = state.onboarding_service.issue(id).await?;
    Ok((
        StatusCode::CREATED,
        Json(OnboardingTokenResponse {
            token: token.token,
            business_id: token.business_id,
            expires_at: token.expires_at,
        }),
    ))
}
