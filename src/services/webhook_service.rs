use serde::Serialize;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::whatsapp_dto::WebhookPayload;
use crate::error::{Error, Result};
use crate::models::channel_account::PROVIDER_WHATSAPP;
use crate::models::message::{CreateInboundMessage, InboundInsert};
use crate::services::conversation_service::{ConversationService, InboundContact};
use crate::services::message_service::MessageService;
use crate::services::tenant_service::{ResolvedTenant, TenantResolutionError, TenantService};
use crate::utils::phone::{contact_key, normalize_phone};
use crate::utils::signature::secrets_match;
use crate::utils::time::{from_unix_str, now};

#[derive(Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    pub ok: bool,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<Uuid>,
    pub statuses_applied: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Uuid>,
    pub duplicate: bool,
}

impl IngestOutcome {
    fn not_processed(reason: String) -> Self {
        Self {
            ok: true,
            processed: false,
            reason: Some(reason),
            ..Default::default()
        }
    }
}

#[derive(Clone)]
pub struct WebhookService {
    pool: PgPool,
    tenants: TenantService,
    conversations: ConversationService,
    messages: MessageService,
}

impl WebhookService {
    pub fn new(
        pool: PgPool,
        tenants: TenantService,
        conversations: ConversationService,
        messages: MessageService,
    ) -> Self {
        Self {
            pool,
            tenants,
            conversations,
            messages,
        }
    }

    /// Processes one provider callback. Every resolved callback leaves an audit row;
    /// an unexpected failure after that point is recorded on the row and surfaces as 500
    /// so the provider redelivers.
    pub async fn ingest(&self, body: &[u8]) -> Result<IngestOutcome> {
        let mut raw: JsonValue = serde_json::from_slice(body)
            .map_err(|e| Error::BadRequest(format!("malformed webhook body: {}", e)))?;
        strip_nul(&mut raw);
        let payload: WebhookPayload = match serde_json::from_value(raw.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "webhook body has an unexpected shape");
                return Ok(IngestOutcome::not_processed(format!("unexpected webhook shape: {}", e)));
            }
        };

        let tenant = match self.tenants.resolve_webhook(&payload).await {
            Ok(tenant) => tenant,
            Err(TenantResolutionError::Database(e)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!(reason = %e, "webhook not attributable to a business");
                return Ok(IngestOutcome::not_processed(e.to_string()));
            }
        };

        let event_id = self
            .record_received(tenant.business_id, &payload.event_type(), &raw)
            .await?;

        match self.process(&tenant, &payload).await {
            Ok(mut outcome) => {
                self.mark_processed(event_id).await?;
                outcome.event_id = Some(event_id);
                Ok(outcome)
            }
            Err(e) => {
                tracing::error!(%event_id, business_id = %tenant.business_id, error = ?e, "webhook processing failed");
                if let Err(mark_err) = self.mark_failed(event_id, &e.to_string()).await {
                    tracing::error!(%event_id, error = ?mark_err, "could not mark webhook event failed");
                }
                Err(e)
            }
        }
    }

    async fn process(&self, tenant: &ResolvedTenant, payload: &WebhookPayload) -> Result<IngestOutcome> {
        let mut statuses_applied = 0;
        for status in payload.statuses() {
            statuses_applied += self
                .messages
                .apply_status(tenant.business_id, PROVIDER_WHATSAPP, status)
                .await?;
        }

        let Some((inbound, raw_message, profile_name)) = payload.first_message() else {
            return Ok(IngestOutcome {
                ok: true,
                processed: true,
                statuses_applied,
                ..Default::default()
            });
        };

        let at = from_unix_str(&inbound.timestamp).unwrap_or_else(now);
        let key = contact_key(&inbound.from);
        let phone = normalize_phone(&inbound.from);
        let conversation = self
            .conversations
            .upsert_inbound(
                tenant.business_id,
                &InboundContact {
                    contact_key: &key,
                    contact_phone: &phone,
                    display: profile_name.as_deref(),
                },
                at,
            )
            .await?;

        if conversation.client_id.is_none() {
            if let Some(client_id) = self
                .conversations
                .link_existing_client(conversation.id, &phone)
                .await?
            {
                tracing::info!(conversation_id = %conversation.id, %client_id, "linked conversation to client");
            }
        }

        let inserted = self
            .messages
            .insert_inbound(CreateInboundMessage {
                conversation_id: conversation.id,
                business_id: tenant.business_id,
                provider: PROVIDER_WHATSAPP.to_string(),
                provider_message_id: inbound.id.clone(),
                text: inbound.display_text(),
                payload: raw_message,
                received_at: at,
            })
            .await?;

        let (message_id, duplicate) = match inserted {
            InboundInsert::Created(message) => {
                self.conversations.record_inbound(conversation.id, at).await?;
                tracing::info!(
                    business_id = %tenant.business_id,
                    conversation_id = %conversation.id,
                    provider_message_id = %inbound.id,
                    "inbound message stored"
                );
                (Some(message.id), false)
            }
            InboundInsert::Duplicate => (None, true),
        };

        Ok(IngestOutcome {
            ok: true,
            processed: true,
            statuses_applied,
            message_id,
            duplicate,
            ..Default::default()
        })
    }

    async fn record_received(&self, business_id: Uuid, event_type: &str, payload: &JsonValue) -> Result<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO webhook_events (id, business_id, provider, event_type, payload, status)
            VALUES ($1, $2, $3, $4, $5, 'RECEIVED')
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(PROVIDER_WHATSAPP)
        .bind(event_type)
        .bind(payload)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn mark_processed(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'PROCESSED', processed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'FAILED', error = $2, processed_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Postgres rejects U+0000 in both TEXT and JSONB, so it is dropped from every string and key.
fn strip_nul(value: &mut JsonValue) {
    match value {
        JsonValue::String(s) if s.contains('\0') => s.retain(|c| c != '\0'),
        JsonValue::Array(items) => items.iter_mut().for_each(strip_nul),
        JsonValue::Object(map) => {
            if map.keys().any(|k| k.contains('\0')) {
                let entries = std::mem::take(map);
                for (key, v) in entries {
                    map.insert(key.replace('\0', ""), v);
                }
            }
            map.values_mut().for_each(strip_nul);
        }
        _ => {}
    }
}

/// Subscription handshake: echoes the challenge only for a matching verify token.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    match (mode, token) {
        (Some("subscribe"), Some(token)) if secrets_match(token, expected_token) => {
            Some(challenge.unwrap_or_default().to_string())
        }
        _ => None,
    }
}
