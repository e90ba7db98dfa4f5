use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;

use crate::{
    config::get_config,
    error::{Error, Result},
    services::webhook_service::{verify_subscription, IngestOutcome},
    utils::signature::verify_hub_signature,
    AppState,
};

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

#[derive(Debug, Deserialize, Default)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/webhooks/whatsapp",
    params(
        ("hub.mode" = String, Query, description = "Always `subscribe`"),
        ("hub.verify_token" = String, Query, description = "Shared verify token"),
        ("hub.challenge" = String, Query, description = "Echoed back on success")
    ),
    responses(
        (status = 200, description = "Challenge echoed as plain text"),
        (status = 403, description = "Verify token mismatch")
    )
)]
pub async fn verify(Query(query): Query<VerifyQuery>) -> Response {
    let config = get_config();
    match verify_subscription(
        query.mode.as_deref(),
        query.verify_token.as_deref(),
        query.challenge.as_deref(),
        &config.whatsapp_verify_token,
    ) {
        Some(challenge) => (StatusCode::OK, challenge).into_response(),
        None => {
            tracing::warn!(mode = ?query.mode, "webhook verification rejected");
            Error::Forbidden("verification failed".to_string()).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/webhooks/whatsapp",
    responses(
        (status = 200, description = "Accepted; `processed` tells whether a business owned it"),
        (status = 400, description = "Malformed JSON"),
        (status = 401, description = "Bad X-Hub-Signature-256"),
        (status = 500, description = "Processing failed; the provider should redeliver")
    )
)]
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestOutcome>> {
    if let Some(secret) = get_config().whatsapp_app_secret.as_deref() {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_hub_signature(signature, &body, secret) {
            return Err(Error::Unauthorized("invalid webhook signature".to_string()));
        }
    }

    let outcome = state.webhook_service.ingest(&body).await?;
    Ok(Json(outcome))
}
