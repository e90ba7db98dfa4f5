pub mod admin;
pub mod appointments;
pub mod auth;
pub mod clients;
pub mod health;
pub mod inbox;
pub mod openapi;
pub mod webhook;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    config::get_config,
    middleware::{
        auth::{require_admin, require_tenant},
        cors::cors_layer,
        rate_limit::{rps_middleware, RateLimiter},
    },
    AppState,
};

pub fn build_router(state: AppState) -> Router {
    let config = get_config();

    let base_routes = Router::new()
        .route("/health", get(health::health))
        .route("/api/openapi.json", get(openapi::openapi_json));

    let webhook_api = Router::new()
        .route(
            "/api/webhooks/whatsapp",
            get(webhook::verify).post(webhook::receive),
        )
        .layer(from_fn_with_state(
            RateLimiter::new(config.webhook_rps),
            rps_middleware,
        ));

    let session_api = Router::new()
        .route("/api/auth/admin", post(auth::admin_login))
        .route("/api/auth/onboarding", post(auth::redeem_onboarding))
        .route("/api/auth/logout", post(auth::logout));

    let tenant_api = Router::new()
        .route("/api/conversations", get(inbox::list_conversations))
        .route("/api/conversations/:id", get(inbox::get_conversation))
        .route(
            "/api/conversations/:id/messages",
            get(inbox::list_messages).post(inbox::send_message),
        )
        .route("/api/conversations/:id/read", post(inbox::mark_read))
        .route("/api/conversations/:id/client", post(inbox::link_client))
        .route(
            "/api/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/api/appointments",
            get(appointments::list_appointments).post(appointments::create_appointment),
        )
        .route(
            "/api/appointments/:id",
            patch(appointments::reschedule_appointment),
        )
        .route(
            "/api/appointments/:id/status",
            post(appointments::update_appointment_status),
        )
        .layer(from_fn(require_tenant));

    let admin_api = Router::new()
        .route("/api/auth/impersonate", post(auth::impersonate))
        .route("/api/admin/overview", get(admin::overview))
        .route("/api/admin/outbox/:id/retry", post(admin::retry_outbox))
        .route(
            "/api/admin/businesses",
            get(admin::list_businesses).post(admin::create_business),
        )
        .route("/api/admin/businesses/:id", delete(admin::delete_business))
        .route(
            "/api/admin/businesses/:id/restore",
            post(admin::restore_business),
        )
        .route(
            "/api/admin/businesses/:id/whatsapp",
            put(admin::bind_whatsapp),
        )
        .route(
            "/api/admin/businesses/:id/onboarding-tokens",
            post(admin::issue_onboarding_token),
        )
        .layer(from_fn(require_admin));

    let app_api = Router::new()
        .merge(session_api)
        .merge(tenant_api)
        .merge(admin_api)
        .layer(from_fn_with_state(
            RateLimiter::new(config.app_rps),
            rps_middleware,
        ));

    base_routes
        .merge(webhook_api)
        .merge(app_api)
        .with_state(state)
        .layer(cors_layer(config.app_origin.as_deref()))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024))
}
