use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::onboarding_token::OnboardingToken;
use crate::utils::time::now;
use crate::utils::token::generate_token;

const TOKEN_LENGTH: usize = 40;

#[derive(Clone)]
pub struct OnboardingService {
    pool: PgPool,
    ttl: Duration,
}

impl OnboardingService {
    pub fn new(pool: PgPool, ttl_hours: i64) -> Self {
        Self {
            pool,
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }

    pub async fn issue(&self, business_id: Uuid) -> Result<OnboardingToken> {
        let token = sqlx::query_as::<_, OnboardingToken>(
            r#"
            INSERT INTO onboarding_tokens (token, business_id, expires_at)
            SELECT $1, id, $3 FROM businesses WHERE id = $2 AND deleted_at IS NULL
            RETURNING *
            "#,
        )
        .bind(generate_token(TOKEN_LENGTH))
        .bind(business_id)
        .bind(now() + self.ttl)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("business not found".to_string()))?;
        Ok(token)
    }

    /// Single use: the token is consumed even when it turns out to be expired.
    pub async fn redeem(&self, token: &str) -> Result<Uuid> {
        let consumed = sqlx::query_as::<_, OnboardingToken>(
            r#"
            DELETE FROM onboarding_tokens t
            USING businesses b
            WHERE t.token = $1 AND b.id = t.business_id AND b.deleted_at IS NULL
            RETURNING t.*
            "#,
        )
        .bind(token.trim())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::BadRequest("invalid onboarding token".to_string()))?;

        if consumed.expires_at <= now() {
            return Err(Error::BadRequest("onboarding token expired".to_string()));
        }
        tracing::info!(business_id = %consumed.business_id, "onboarding token redeemed");
        Ok(consumed.business_id)
    }
}
