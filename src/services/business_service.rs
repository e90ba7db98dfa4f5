use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::business::Business;

#[derive(Clone)]
pub struct BusinessService {
    pool: PgPool,
}

impl BusinessService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str) -> Result<Business> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::BadRequest("name is required".to_string()));
        }
        let business = sqlx::query_as::<_, Business>(
            "INSERT INTO businesses (id, name) VALUES ($1, $2) RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        tracing::info!(business_id = %business.id, "business created");
        Ok(business)
    }

    pub async fn list(&self, include_deleted: bool) -> Result<Vec<Business>> {
        let businesses = sqlx::query_as::<_, Business>(
            r#"
            SELECT * FROM businesses
            WHERE $1 OR deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
        )
        .bind(include_deleted)
        .fetch_all(&self.pool)
        .await?;
        Ok(businesses)
    }

    pub async fn get_active(&self, id: Uuid) -> Result<Business> {
        sqlx::query_as::<_, Business>("SELECT * FROM businesses WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("business not found".to_string()))
    }

    /// Hides the business. Rows are kept; webhooks for its number stop resolving.
    pub async fn soft_delete(&self, id: Uuid) -> Result<Business> {
        let business = sqlx::query_as::<_, Business>(
            r#"
            UPDATE businesses SET deleted_at = COALESCE(deleted_at, NOW()), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("business not found".to_string()))?;
        tracing::info!(business_id = %id, "business soft-deleted");
        Ok(business)
    }

    /// Clears `deleted_at`. A number released to another business while deleted stays there.
    pub async fn restore(&self, id: Uuid) -> Result<Business> {
        let business = sqlx::query_as::<_, Business>(
            r#"
            UPDATE businesses SET deleted_at = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("business not found".to_string()))?;
        tracing::info!(business_id = %id, "business restored");
        Ok(business)
    }
}
