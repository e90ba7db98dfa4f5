use chrono::{DateTime, Utc};
use serde_json::{json, Value as JsonValue};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::is_unique_violation;
use crate::dto::whatsapp_dto::Status;
use crate::error::Result;
use crate::models::message::{CreateInboundMessage, InboundInsert, Message, MessageStatus};
use crate::utils::time::{from_unix_str, now};

const PROVIDER_MESSAGE_KEY: &str = "messages_provider_message_id_key";

#[derive(Clone)]
pub struct MessageService {
    pool: PgPool,
}

impl MessageService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts an inbound message. A replayed provider id is reported as `Duplicate`, not an error.
    pub async fn insert_inbound(&self, msg: CreateInboundMessage) -> Result<InboundInsert> {
        let inserted = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, conversation_id, business_id, direction, provider, provider_message_id,
                text, payload, status, delivered_at, created_at, updated_at
            )
            VALUES ($1, $2, $3, 'INBOUND', $4, $5, $6, $7, 'DELIVERED', $8, $8, NOW())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(msg.conversation_id)
        .bind(msg.business_id)
        .bind(&msg.provider)
        .bind(&msg.provider_message_id)
        .bind(&msg.text)
        .bind(&msg.payload)
        .bind(msg.received_at)
        .fetch_one(&self.pool)
        .await;

        match inserted {
            Ok(message) => Ok(InboundInsert::Created(message)),
            Err(e) if is_unique_violation(&e, Some(PROVIDER_MESSAGE_KEY)) => {
                tracing::debug!(
                    provider_message_id = %msg.provider_message_id,
                    "duplicate inbound message ignored"
                );
                Ok(InboundInsert::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Applies one provider delivery receipt to the matching outbound message.
    /// Returns the number of rows changed; unknown ids and unknown statuses change nothing.
    pub async fn apply_status(
        &self,
        business_id: Uuid,
        provider: &str,
        status: &Status,
    ) -> Result<u64> {
        let Some(target) = map_provider_status(&status.status) else {
            tracing::debug!(status = %status.status, "ignoring unknown delivery status");
            return Ok(0);
        };
        if status.id.is_empty() {
            return Ok(0);
        }
        let at = from_unix_str(&status.timestamp).unwrap_or_else(now);

        let result = match target {
            MessageStatus::Failed => {
                let failure = json!({
                    "providerFailure": {
                        "errors": status.errors,
                        "at": at,
                    }
                });
                sqlx::query(
                    r#"
                    UPDATE messages
                    SET status = 'FAILED', payload = payload || $4::jsonb, updated_at = NOW()
                    WHERE business_id = $1 AND provider = $2 AND provider_message_id = $3
                      AND direction = 'OUTBOUND' AND status IN ('QUEUED', 'SENT')
                    "#,
                )
                .bind(business_id)
                .bind(provider)
                .bind(&status.id)
                .bind(failure)
                .execute(&self.pool)
                .await?
            }
            _ => {
                sqlx::query(
                    r#"
                    UPDATE messages
                    SET status = GREATEST(status, $4),
                        delivered_at = CASE WHEN $4 = 'DELIVERED'::message_status
                            THEN COALESCE(delivered_at, $5) ELSE delivered_at END,
                        read_at = CASE WHEN $4 = 'READ'::message_status
                            THEN COALESCE(read_at, $5) ELSE read_at END,
                        updated_at = NOW()
                    WHERE business_id = $1 AND provider = $2 AND provider_message_id = $3
                      AND direction = 'OUTBOUND' AND status <> 'FAILED'
                    "#,
                )
                .bind(business_id)
                .bind(provider)
                .bind(&status.id)
                .bind(target)
                .bind(at)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            tracing::debug!(provider_message_id = %status.id, "delivery status matched no message");
        }
        Ok(result.rows_affected())
    }

    /// Records provider acceptance. A FAILED row only reaches here through an operator retry.
    pub async fn mark_sent(
        &self,
        message_id: Uuid,
        provider_message_id: &str,
        send_meta: JsonValue,
    ) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET status = CASE WHEN status = 'FAILED' THEN 'SENT'::message_status
                    ELSE GREATEST(status, 'SENT'::message_status) END,
                provider_message_id = $2,
                payload = payload || $3::jsonb,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(provider_message_id)
        .bind(send_meta)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }

    pub async fn mark_failed(&self, message_id: Uuid, failure_meta: JsonValue) -> Result<Message> {
        let message = sqlx::query_as::<_, Message>(
            r#"
            UPDATE messages
            SET status = 'FAILED', payload = payload || $2::jsonb, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(failure_meta)
        .fetch_one(&self.pool)
        .await?;
        Ok(message)
    }

    /// Newest first, paged backwards with `before`.
    pub async fn list_for_conversation(
        &self,
        business_id: Uuid,
        conversation_id: Uuid,
        before: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            r#"
            SELECT * FROM messages
            WHERE business_id = $1 AND conversation_id = $2
              AND ($3::timestamptz IS NULL OR created_at < $3)
            ORDER BY created_at DESC, seq DESC
            LIMIT $4
            "#,
        )
        .bind(business_id)
        .bind(conversation_id)
        .bind(before)
        .bind(limit.clamp(1, 200))
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }
}

/// Provider receipt string to lifecycle status. Anything else is ignored.
pub fn map_provider_status(raw: &str) -> Option<MessageStatus> {
    match raw {
        "sent" => Some(MessageStatus::Sent),
        "delivered" => Some(MessageStatus::Delivered),
        "read" => Some(MessageStatus::Read),
        "failed" => Some(MessageStatus::Failed),
        _ => None,
    }
}
