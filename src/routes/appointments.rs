use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::appointment_dto::{
        CreateAppointmentPayload, ListAppointmentsQuery, ReschedulePayload,
        UpdateAppointmentStatusPayload,
    },
    error::Result,
    middleware::auth::RequestContext,
    AppState,
};

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ListAppointmentsQuery>,
) -> Result<impl IntoResponse> {
    let appointments = state
        .appointment_service
        .list(ctx.business_id()?, query.from, query.to)
        .await?;
    Ok(Json(appointments))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Json(payload): Json<CreateAppointmentPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let appointment = state
        .appointment_service
        .create(ctx.business_id()?, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReschedulePayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let appointment = state
        .appointment_service
        .reschedule(ctx.business_id()?, id, &payload)
        .await?;
    Ok(Json(appointment))
}

#[axum::debug_handler]
pub async fn update_appointment_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateAppointmentStatusPayload>,
) -> Result<impl IntoResponse> {
    let appointment = state
        .appointment_service
        .set_status(ctx.business_id()?, id, payload.status)
        .await?;
    Ok(Json(appointment))
}
