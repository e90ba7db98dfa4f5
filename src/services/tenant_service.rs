use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::is_unique_violation;
use crate::dto::admin_dto::BindWhatsAppPayload;
use crate::dto::whatsapp_dto::WebhookPayload;
use crate::error::{Error, Result};
use crate::models::channel_account::{ChannelAccount, PROVIDER_WHATSAPP};
use crate::services::whatsapp_client::ChannelCredentials;
use crate::utils::phone::normalize_phone;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTenant {
    pub business_id: Uuid,
    pub phone_number_id: String,
    pub to_phone: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TenantResolutionError {
    #[error("webhook payload carries no metadata.phone_number_id")]
    MissingPhoneNumberId,
    #[error("no active business owns phone_number_id {0}")]
    UnknownPhoneNumberId(String),
    #[error("tenant lookup failed: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Clone)]
pub struct TenantService {
    pool: PgPool,
    fallback_access_token: Option<String>,
}

impl TenantService {
    pub fn new(pool: PgPool, fallback_access_token: Option<String>) -> Self {
        Self {
            pool,
            fallback_access_token,
        }
    }

    /// Maps a webhook to its owning business. Fails closed: an unmapped id never guesses a tenant.
    pub async fn resolve_webhook(
        &self,
        payload: &WebhookPayload,
    ) -> std::result::Result<ResolvedTenant, TenantResolutionError> {
        let metadata = payload
            .metadata()
            .ok_or(TenantResolutionError::MissingPhoneNumberId)?;
        let phone_number_id = metadata.phone_number_id.trim().to_string();

        let account = self
            .find_active_account(&phone_number_id)
            .await?
            .ok_or_else(|| TenantResolutionError::UnknownPhoneNumberId(phone_number_id.clone()))?;

        Ok(ResolvedTenant {
            business_id: account.business_id,
            phone_number_id,
            to_phone: normalize_phone(&metadata.display_phone_number),
        })
    }

    pub async fn find_active_account(
        &self,
        phone_number_id: &str,
    ) -> std::result::Result<Option<ChannelAccount>, sqlx::Error> {
        sqlx::query_as::<_, ChannelAccount>(
            r#"
            SELECT ca.* FROM channel_accounts ca
            JOIN businesses b ON b.id = ca.business_id
            WHERE ca.provider = $1 AND ca.phone_number_id = $2
              AND ca.is_active AND b.deleted_at IS NULL
            "#,
        )
        .bind(PROVIDER_WHATSAPP)
        .bind(phone_number_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn account_for_business(&self, business_id: Uuid) -> Result<Option<ChannelAccount>> {
        let account = sqlx::query_as::<_, ChannelAccount>(
            r#"
            SELECT * FROM channel_accounts
            WHERE business_id = $1 AND provider = $2 AND is_active
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(business_id)
        .bind(PROVIDER_WHATSAPP)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn credentials_for(&self, business_id: Uuid) -> Result<ChannelCredentials> {
        let account = self.account_for_business(business_id).await?.ok_or_else(|| {
            Error::BadRequest("business has no WhatsApp number connected".to_string())
        })?;
        let access_token = account
            .access_token()
            .map(str::to_string)
            .or_else(|| self.fallback_access_token.clone())
            .ok_or_else(|| {
                Error::BadRequest("WhatsApp account has no access token configured".to_string())
            })?;
        Ok(ChannelCredentials {
            phone_number_id: account.phone_number_id,
            access_token,
        })
    }

    /// Binds a provider phone-number id to a business. A number already owned by another
    /// active business is a conflict; the existing binding is left untouched. A number
    /// still held by a soft-deleted business is released and rebound.
    pub async fn bind_whatsapp_account(
        &self,
        business_id: Uuid,
        payload: &BindWhatsAppPayload,
    ) -> Result<ChannelAccount> {
        let phone_number_id = payload.phone_number_id.trim();
        let config = json!({
            "access_token": payload.access_token,
            "display_phone_number": payload.display_phone_number.as_deref().map(normalize_phone),
        });

        let mut tx = self.pool.begin().await?;

        let business_exists: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM businesses WHERE id = $1 AND deleted_at IS NULL")
                .bind(business_id)
                .fetch_optional(&mut *tx)
                .await?;
        if business_exists.is_none() {
            return Err(Error::NotFound("business not found".to_string()));
        }

        let mut existing = sqlx::query_as::<_, ChannelAccount>(
            r#"
            SELECT * FROM channel_accounts
            WHERE provider = $1 AND phone_number_id = $2 AND is_active
            FOR UPDATE
            "#,
        )
        .bind(PROVIDER_WHATSAPP)
        .bind(phone_number_id)
        .fetch_optional(&mut *tx)
        .await?;

        // A soft-deleted owner no longer holds its number.
        if let Some(current) = existing.as_ref().filter(|c| c.business_id != business_id) {
            let (owner_deleted,): (bool,) =
                sqlx::query_as("SELECT deleted_at IS NOT NULL FROM businesses WHERE id = $1")
                    .bind(current.business_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if owner_deleted {
                sqlx::query(
                    "UPDATE channel_accounts SET is_active = FALSE, updated_at = NOW() WHERE id = $1",
                )
                .bind(current.id)
                .execute(&mut *tx)
                .await?;
                tracing::info!(
                    phone_number_id,
                    previous_owner = %current.business_id,
                    "released WhatsApp number held by a deleted business"
                );
                existing = None;
            }
        }

        let account = match existing {
            Some(current) if current.business_id != business_id => {
                tracing::warn!(
                    phone_number_id,
                    owner = %current.business_id,
                    requested_by = %business_id,
                    "rejected WhatsApp binding owned by another business"
                );
                return Err(Error::Conflict(
                    "phone_number_id is already bound to another business".to_string(),
                ));
            }
            Some(current) => {
                sqlx::query_as::<_, ChannelAccount>(
                    r#"
                    UPDATE channel_accounts SET config = config || jsonb_strip_nulls($2), updated_at = NOW()
                    WHERE id = $1
                    RETURNING *
                    "#,
                )
                .bind(current.id)
                .bind(&config)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE channel_accounts SET is_active = FALSE, updated_at = NOW()
                    WHERE business_id = $1 AND provider = $2 AND is_active
                    "#,
                )
                .bind(business_id)
                .bind(PROVIDER_WHATSAPP)
                .execute(&mut *tx)
                .await?;

                sqlx::query_as::<_, ChannelAccount>(
                    r#"
                    INSERT INTO channel_accounts (id, business_id, provider, phone_number_id, config)
                    VALUES ($1, $2, $3, $4, jsonb_strip_nulls($5))
                    RETURNING *
                    "#,
                )
                .bind(Uuid::new_v4())
                .bind(business_id)
                .bind(PROVIDER_WHATSAPP)
                .bind(phone_number_id)
                .bind(&config)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e, Some("channel_accounts_active_phone_number_id")) {
                        Error::Conflict(
                            "phone_number_id is already bound to another business".to_string(),
                        )
                    } else {
                        Error::from(e)
                    }
                })?
            }
        };

        tx.commit().await?;
        tracing::info!(%business_id, phone_number_id, "WhatsApp number bound");
        Ok(account)
    }
}
