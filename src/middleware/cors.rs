use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};

/// Credentialed CORS for the configured app origin; permissive when none is set.
pub fn cors_layer(app_origin: Option<&str>) -> CorsLayer {
    let origin = app_origin.and_then(|o| HeaderValue::from_str(o.trim_end_matches('/')).ok());
    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::PATCH,
                Method::DELETE,
            ])
            .allow_headers([header::CONTENT_TYPE, header::ACCEPT]),
        None => CorsLayer::new()
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_origin(Any),
    }
}
