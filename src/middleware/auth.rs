use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub exp: usize,
    pub business_id: Option<Uuid>,
    #[serde(default)]
    pub is_admin: bool,
}

/// Caller identity handed to every core operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestContext {
    pub business_id: Option<Uuid>,
    pub is_admin: bool,
}

impl RequestContext {
    pub fn for_business(business_id: Uuid) -> Self {
        Self {
            business_id: Some(business_id),
            is_admin: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            business_id: None,
            is_admin: true,
        }
    }

    pub fn business_id(&self) -> Result<Uuid> {
        self.business_id
            .ok_or_else(|| Error::Forbidden("no business selected for this session".to_string()))
    }

    pub fn ensure_admin(&self) -> Result<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(Error::Forbidden("admin session required".to_string()))
        }
    }
}

impl From<&SessionClaims> for RequestContext {
    fn from(claims: &SessionClaims) -> Self {
        Self {
            business_id: claims.business_id,
            is_admin: claims.is_admin,
        }
    }
}

pub fn issue_session_token(ctx: &RequestContext) -> Result<String> {
    let config = crate::config::get_config();
    let exp = crate::utils::time::now() + Duration::hours(config.session_ttl_hours);
    let sub = match (ctx.is_admin, ctx.business_id) {
        (true, _) => "admin".to_string(),
        (false, Some(id)) => format!("business:{}", id),
        (false, None) => return Err(Error::Internal("session without identity".to_string())),
    };
    let claims = SessionClaims {
        sub,
        exp: exp.timestamp().max(0) as usize,
        business_id: ctx.business_id,
        is_admin: ctx.is_admin,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn decode_session_token(token: &str) -> Result<SessionClaims> {
    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    )?;
    Ok(data.claims)
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    let config = crate::config::get_config();
    Cookie::build((SESSION_COOKIE, token))
        .http_only(true)
        .secure(config.cookie_secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

pub fn clear_session_cookie(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/"))
}

fn context_from_jar(jar: &CookieJar) -> Result<RequestContext> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Err(Error::Unauthorized("missing session".to_string()));
    };
    let claims = decode_session_token(cookie.value())
        .map_err(|_| Error::Unauthorized("invalid session".to_string()))?;
    Ok(RequestContext::from(&claims))
}

/// Inserts `RequestContext` as a request extension. A session scoped to one business (owner, onboarded user or impersonating admin).
pub async fn require_tenant(jar: CookieJar, mut req: Request, next: Next) -> Response {
    let ctx = match context_from_jar(&jar) {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = ctx.business_id() {
        return e.into_response();
    }
    req.extensions_mut().insert(ctx);
    next.run(req).await
}

pub async fn require_admin(jar: CookieJar, mut req: Request, next: Next) -> Response {
    let ctx = match context_from_jar(&jar) {
        Ok(ctx) => ctx,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = ctx.ensure_admin() {
        return e.into_response();
    }
    req.extensions_mut().insert(ctx);
    next.run(req).await
}
