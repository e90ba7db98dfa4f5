use axum::{
    extract::State,
    response::{IntoResponse, Json},
    Extension,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use validator::Validate;

use crate::{
    config::get_config,
    dto::auth_dto::{AdminLoginPayload, ImpersonatePayload, RedeemOnboardingPayload},
    error::{Error, Result},
    middleware::auth::{clear_session_cookie, issue_session_token, session_cookie, RequestContext},
    utils::crypto::verify_password,
    AppState,
};

fn with_session(jar: CookieJar, ctx: &RequestContext) -> Result<(CookieJar, Json<serde_json::Value>)> {
    let token = issue_session_token(ctx)?;
    Ok((
        jar.add(session_cookie(token)),
        Json(json!({ "businessId": ctx.business_id, "isAdmin": ctx.is_admin })),
    ))
}

#[axum::debug_handler]
pub async fn admin_login(
    jar: CookieJar,
    Json(payload): Json<AdminLoginPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let Some(hash) = get_config().admin_password_hash.as_deref() else {
        return Err(Error::Forbidden("admin login is not configured".to_string()));
    };
    let valid = verify_password(&payload.password, hash)
        .map_err(|e| Error::Internal(format!("stored admin hash unreadable: {}", e)))?;
    if !valid {
        tracing::warn!("admin login rejected");
        return Err(Error::Unauthorized("invalid password".to_string()));
    }
    with_session(jar, &RequestContext::admin())
}

/// Admin selects a business to act as; keeps admin rights.
#[axum::debug_handler]
pub async fn impersonate(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    jar: CookieJar,
    Json(payload): Json<ImpersonatePayload>,
) -> Result<impl IntoResponse> {
    ctx.ensure_admin()?;
    let business = state.business_service.get_active(payload.business_id).await?;
    tracing::info!(business_id = %business.id, "admin impersonating business");
    with_session(
        jar,
        &RequestContext {
            business_id: Some(business.id),
            is_admin: true,
        },
    )
}

#[axum::debug_handler]
pub async fn redeem_onboarding(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<RedeemOnboardingPayload>,
) -> Result<impl IntoResponse> {
    payload.validate()?;
    let business_id = state.onboarding_service.redeem(&payload.token).await?;
    with_session(jar, &RequestContext::for_business(business_id))
}

#[axum::debug_handler]
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    (clear_session_cookie(jar), Json(json!({ "ok": true })))
}
