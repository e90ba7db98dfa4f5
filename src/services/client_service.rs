use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::client::Client;
use crate::models::conversation::Conversation;
use crate::utils::phone::normalize_phone;

#[derive(Clone)]
pub struct ClientService {
    pool: PgPool,
}

impl ClientService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, business_id: Uuid, search: Option<&str>, limit: i64) -> Result<Vec<Client>> {
        let pattern = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s));
        let clients = sqlx::query_as::<_, Client>(
            r#"
            SELECT * FROM clients
            WHERE business_id = $1
              AND ($2::text IS NULL OR name ILIKE $2 OR phone LIKE $2)
            ORDER BY COALESCE(name, phone) ASC
            LIMIT $3
            "#,
        )
        .bind(business_id)
        .bind(pattern)
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;
        Ok(clients)
    }

    /// Creates or renames the client owning this phone. The phone is stored in canonical form.
    pub async fn upsert(&self, business_id: Uuid, name: Option<&str>, phone: &str) -> Result<Client> {
        let mut conn = self.pool.acquire().await?;
        upsert_client(&mut conn, business_id, name, phone).await
    }

    /// Upserts the client for the conversation's contact and links it, atomically.
    pub async fn upsert_and_link(
        &self,
        business_id: Uuid,
        conversation_id: Uuid,
        name: Option<&str>,
    ) -> Result<(Client, Conversation)> {
        let mut tx = self.pool.begin().await?;

        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT * FROM conversations WHERE id = $1 AND business_id = $2 FOR UPDATE",
        )
        .bind(conversation_id)
        .bind(business_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("conversation not found".to_string()))?;
        let phone = conversation.dialable_phone().ok_or_else(|| {
            Error::BadRequest("conversation has no contact phone".to_string())
        })?;

        let client = upsert_client(&mut tx, business_id, name, &phone).await?;
        let conversation = sqlx::query_as::<_, Conversation>(
            "UPDATE conversations SET client_id = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(conversation.id)
        .bind(client.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((client, conversation))
    }
}

pub(crate) async fn upsert_client(
    conn: &mut PgConnection,
    business_id: Uuid,
    name: Option<&str>,
    phone: &str,
) -> Result<Client> {
    let phone = normalize_phone(phone);
    if phone.is_empty() {
        return Err(Error::BadRequest("phone is required".to_string()));
    }
    let name = name.map(str::trim).filter(|n| !n.is_empty());
    let client = sqlx::query_as::<_, Client>(
        r#"
        INSERT INTO clients (id, business_id, name, phone)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT ON CONSTRAINT clients_business_phone_key DO UPDATE SET
            name = COALESCE(EXCLUDED.name, clients.name),
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(business_id)
    .bind(name)
    .bind(&phone)
    .fetch_one(&mut *conn)
    .await?;
    Ok(client)
}
