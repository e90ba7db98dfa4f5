use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::conversation::{Conversation, CHANNEL_WHATSAPP};
use crate::utils::phone::{contact_key, display_phone};

#[derive(Clone)]
pub struct ConversationService {
    pool: PgPool,
}

#[derive(Debug, Serialize)]
pub struct ConversationList {
    pub items: Vec<Conversation>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Clone)]
pub struct InboundContact<'a> {
    pub contact_key: &'a str,
    pub contact_phone: &'a str,
    pub display: Option<&'a str>,
}

impl ConversationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Finds or creates the thread for a contact and bumps `last_message_at` (never backwards).
    /// A legacy row keyed only by phone is adopted instead of creating a second thread.
    /// New threads without a profile name are labelled with the formatted phone.
    pub async fn upsert_inbound(
        &self,
        business_id: Uuid,
        contact: &InboundContact<'_>,
        at: DateTime<Utc>,
    ) -> Result<Conversation> {
        let mut tx = self.pool.begin().await?;

        // Legacy rows carry only a free-form phone. Key them with the same
        // canonicalization as new rows so both shapes of a number match.
        let legacy: Vec<(Uuid, Option<String>)> = sqlx::query_as(
            r#"
            SELECT id, contact_phone FROM conversations
            WHERE business_id = $1 AND channel = $2 AND contact_key IS NULL
            ORDER BY created_at ASC
            FOR UPDATE
            "#,
        )
        .bind(business_id)
        .bind(CHANNEL_WHATSAPP)
        .fetch_all(&mut *tx)
        .await?;

        let candidate = legacy.into_iter().find_map(|(id, phone)| {
            phone
                .filter(|p| contact_key(p) == contact.contact_key)
                .map(|_| id)
        });
        if let Some(legacy_id) = candidate {
            let adopted = sqlx::query(
                r#"
                UPDATE conversations SET contact_key = $3, updated_at = NOW()
                WHERE id = $1
                  AND NOT EXISTS (
                      SELECT 1 FROM conversations
                      WHERE business_id = $2 AND channel = $4 AND contact_key = $3
                  )
                "#,
            )
            .bind(legacy_id)
            .bind(business_id)
            .bind(contact.contact_key)
            .bind(CHANNEL_WHATSAPP)
            .execute(&mut *tx)
            .await?;
            if adopted.rows_affected() > 0 {
                tracing::info!(%business_id, conversation_id = %legacy_id, contact_key = contact.contact_key, "adopted legacy conversation");
            }
        }

        let conversation = sqlx::query_as::<_, Conversation>(
            r#"
            INSERT INTO conversations (
                id, business_id, channel, contact_key, contact_phone, contact_display, last_message_at
            ) VALUES ($1, $2, $3, $4, $5, COALESCE($6, $8), $7)
            ON CONFLICT (business_id, channel, contact_key) DO UPDATE SET
                last_message_at = GREATEST(conversations.last_message_at, EXCLUDED.last_message_at),
                contact_display = COALESCE($6, conversations.contact_display),
                contact_phone = COALESCE(conversations.contact_phone, EXCLUDED.contact_phone),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(CHANNEL_WHATSAPP)
        .bind(contact.contact_key)
        .bind(contact.contact_phone)
        .bind(contact.display)
        .bind(at)
        .bind(display_phone(contact.contact_phone))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(conversation)
    }

    /// Links an existing client with the same phone. Never creates one.
    pub async fn link_existing_client(
        &self,
        conversation_id: Uuid,
        phone: &str,
    ) -> Result<Option<Uuid>> {
        let linked: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE conversations c SET client_id = cl.id, updated_at = NOW()
            FROM clients cl
            WHERE c.id = $1 AND c.client_id IS NULL
              AND cl.business_id = c.business_id AND cl.phone = $2
            RETURNING cl.id
            "#,
        )
        .bind(conversation_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(linked.map(|(id,)| id))
    }

    pub async fn record_inbound(&self, conversation_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE conversations
            SET unread_count = unread_count + 1,
                last_message_at = GREATEST(last_message_at, $2),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, business_id: Uuid, id: Uuid) -> Result<Conversation> {
        sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1 AND business_id = $2",
        )
        .bind(id)
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("conversation not found".to_string()))
    }

    pub async fn list(
        &self,
        business_id: Uuid,
        page: i64,
        per_page: i64,
        unread_only: bool,
    ) -> Result<ConversationList> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);
        let offset = (page - 1) * per_page;

        let items = sqlx::query_as::<_, Conversation>(
            r#"
            SELECT * FROM conversations
            WHERE business_id = $1 AND ($2 = FALSE OR unread_count > 0)
            ORDER BY last_message_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(business_id)
        .bind(unread_only)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM conversations
            WHERE business_id = $1 AND ($2 = FALSE OR unread_count > 0)
            "#,
        )
        .bind(business_id)
        .bind(unread_only)
        .fetch_one(&self.pool)
        .await?;

        Ok(ConversationList {
            items,
            total,
            page,
            per_page,
        })
    }

    /// Acknowledges everything up to `message_id`. Inbound messages newer than it stay unread.
    pub async fn mark_read(
        &self,
        business_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<Conversation> {
        self.get(business_id, conversation_id).await?;

        sqlx::query_as::<_, Conversation>(
            r#"
            UPDATE conversations c SET
                last_read_message_id = m.id,
                unread_count = (
                    SELECT COUNT(*)::int FROM messages newer
                    WHERE newer.conversation_id = c.id
                      AND newer.direction = 'INBOUND'
                      AND (newer.created_at, newer.seq) > (m.created_at, m.seq)
                ),
                updated_at = NOW()
            FROM messages m
            WHERE c.id = $1 AND c.business_id = $2
              AND m.id = $3 AND m.conversation_id = c.id
            RETURNING c.*
            "#,
        )
        .bind(conversation_id)
        .bind(business_id)
        .bind(message_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::BadRequest("message does not belong to this conversation".to_string()))
    }
}
