use axum::Json;
use utoipa::OpenApi;

use crate::dto::admin_dto::OutboxRetryResponse;
use crate::dto::inbox_dto::{MarkReadPayload, SendMessagePayload, SendMessageResponse};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::health::health,
        crate::routes::webhook::verify,
        crate::routes::webhook::receive,
        crate::routes::inbox::send_message,
        crate::routes::inbox::mark_read,
        crate::routes::admin::overview,
        crate::routes::admin::retry_outbox,
    ),
    components(schemas(SendMessagePayload, SendMessageResponse, MarkReadPayload, OutboxRetryResponse)),
    tags(
        (name = "booking-backend", description = "WhatsApp inbox, delivery pipeline and operations monitoring")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
