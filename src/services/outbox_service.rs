use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::conversation::Conversation;
use crate::models::message::Message;
use crate::models::outbox::{OutboxMessage, OutboxStatus};

const MAX_RETRY_DELAY_SECS: i64 = 3600;
const BASE_RETRY_DELAY_SECS: i64 = 30;

#[derive(Clone)]
pub struct OutboxService {
    pool: PgPool,
}

impl OutboxService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Writes the outbox row and its provisional QUEUED message in one transaction.
    pub async fn enqueue(
        &self,
        conversation: &Conversation,
        provider: &str,
        to_phone: &str,
        text: &str,
    ) -> Result<(OutboxMessage, Message)> {
        let outbox_id = Uuid::new_v4();
        let message_id = Uuid::new_v4();
        let contact_key = conversation
            .contact_key
            .clone()
            .unwrap_or_else(|| to_phone.to_string());

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO outbox_messages (
                id, business_id, conversation_id, provider, contact_key, to_phone, text,
                status, attempt_count, next_attempt_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'PENDING', 0, NOW())
            "#,
        )
        .bind(outbox_id)
        .bind(conversation.business_id)
        .bind(conversation.id)
        .bind(provider)
        .bind(&contact_key)
        .bind(to_phone)
        .bind(text)
        .execute(&mut *tx)
        .await?;

        let message = sqlx::query_as::<_, Message>(
            r#"
            INSERT INTO messages (
                id, conversation_id, business_id, direction, provider, text, payload, status
            )
            VALUES ($1, $2, $3, 'OUTBOUND', $4, $5, $6, 'QUEUED')
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(conversation.id)
        .bind(conversation.business_id)
        .bind(provider)
        .bind(text)
        .bind(json!({ "outboxId": outbox_id }))
        .fetch_one(&mut *tx)
        .await?;

        let outbox = sqlx::query_as::<_, OutboxMessage>(
            "UPDATE outbox_messages SET message_id = $2 WHERE id = $1 RETURNING *",
        )
        .bind(outbox_id)
        .bind(message_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_at = GREATEST(last_message_at, $2), updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(conversation.id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((outbox, message))
    }

    /// PENDING -> SENDING. `None` when another sender got there first.
    pub async fn claim(&self, id: Uuid) -> Result<Option<OutboxMessage>> {
        let claimed = sqlx::query_as::<_, OutboxMessage>(
            r#"
            UPDATE outbox_messages
            SET status = 'SENDING', attempt_count = attempt_count + 1, updated_at = NOW()
            WHERE id = $1 AND status = 'PENDING'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(claimed)
    }

    pub async fn claim_due(&self, limit: i64) -> Result<Vec<OutboxMessage>> {
        let claimed = sqlx::query_as::<_, OutboxMessage>(
            r#"
            UPDATE outbox_messages
            SET status = 'SENDING', attempt_count = attempt_count + 1, updated_at = NOW()
            WHERE id IN (
                SELECT id FROM outbox_messages
                WHERE status = 'PENDING' AND next_attempt_at <= NOW()
                ORDER BY next_attempt_at ASC
                FOR UPDATE SKIP LOCKED
                LIMIT $1
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(claimed)
    }

    pub async fn mark_sent(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_messages SET status = 'SENT', last_error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_messages SET status = 'FAILED', last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Back to PENDING after a failed worker attempt, due again after the backoff delay.
    pub async fn reschedule(&self, id: Uuid, attempt_count: i32, error: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE outbox_messages
            SET status = 'PENDING',
                last_error = $2,
                next_attempt_at = NOW() + make_interval(secs => $3),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(retry_delay_secs(attempt_count) as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Manual admin retry: FAILED -> PENDING, due now. Any other status is rejected untouched.
    pub async fn retry(&self, id: Uuid) -> Result<OutboxMessage> {
        let retried = sqlx::query_as::<_, OutboxMessage>(
            r#"
            UPDATE outbox_messages
            SET status = 'PENDING', next_attempt_at = NOW(), last_error = NULL, updated_at = NOW()
            WHERE id = $1 AND status = 'FAILED'
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = retried {
            tracing::info!(outbox_id = %id, attempts = row.attempt_count, "outbox message requeued");
            return Ok(row);
        }

        let current: Option<(OutboxStatus,)> =
            sqlx::query_as("SELECT status FROM outbox_messages WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match current {
            Some((status,)) => Err(Error::BadRequest(format!(
                "only FAILED outbox messages can be retried (current status: {:?})",
                status
            ))),
            None => Err(Error::NotFound("outbox message not found".to_string())),
        }
    }
}

/// Delay before the next worker attempt: 30s doubling per attempt, capped at one hour.
pub fn retry_delay_secs(attempt_count: i32) -> i64 {
    let exponent = (attempt_count - 1).clamp(0, 20) as u32;
    (BASE_RETRY_DELAY_SECS * 2_i64.pow(exponent)).min(MAX_RETRY_DELAY_SECS)
}
