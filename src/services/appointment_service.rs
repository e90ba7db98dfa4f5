use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::appointment_dto::{CreateAppointmentPayload, ReschedulePayload};
use crate::error::{Error, Result};
use crate::models::appointment::{Appointment, AppointmentStatus};
use crate::models::conversation::Conversation;
use crate::services::client_service::upsert_client;
use crate::utils::time::now;

#[derive(Clone)]
pub struct AppointmentService {
    pool: PgPool,
}

fn check_window(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<()> {
    if ends_at <= starts_at {
        return Err(Error::BadRequest("ends_at must be after starts_at".to_string()));
    }
    Ok(())
}

impl AppointmentService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Schedules an appointment. When booked from a conversation without a linked client,
    /// the client is created from the contact phone and linked in the same transaction.
    pub async fn create(&self, business_id: Uuid, payload: &CreateAppointmentPayload) -> Result<Appointment> {
        check_window(payload.starts_at, payload.ends_at)?;
        let mut tx = self.pool.begin().await?;

        let conversation = match payload.conversation_id {
            Some(id) => Some(
                sqlx::query_as::<_, Conversation>(
                    "SELECT * FROM conversations WHERE id = $1 AND business_id = $2 FOR UPDATE",
                )
                .bind(id)
                .bind(business_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| Error::NotFound("conversation not found".to_string()))?,
            ),
            None => None,
        };

        let client_id = match (payload.client_id, &conversation) {
            (Some(client_id), _) => {
                let owned: Option<(Uuid,)> =
                    sqlx::query_as("SELECT id FROM clients WHERE id = $1 AND business_id = $2")
                        .bind(client_id)
                        .bind(business_id)
                        .fetch_optional(&mut *tx)
                        .await?;
                if owned.is_none() {
                    return Err(Error::NotFound("client not found".to_string()));
                }
                Some(client_id)
            }
            (None, Some(conv)) if conv.client_id.is_some() => conv.client_id,
            (None, Some(conv)) => match conv.dialable_phone() {
                Some(phone) => {
                    let client =
                        upsert_client(&mut tx, business_id, conv.contact_display.as_deref(), &phone)
                            .await?;
                    sqlx::query(
                        "UPDATE conversations SET client_id = $2, updated_at = NOW() WHERE id = $1",
                    )
                    .bind(conv.id)
                    .bind(client.id)
                    .execute(&mut *tx)
                    .await?;
                    tracing::info!(conversation_id = %conv.id, client_id = %client.id, "backfilled client for appointment");
                    Some(client.id)
                }
                None => None,
            },
            (None, None) => None,
        };

        let appointment = sqlx::query_as::<_, Appointment>(
            r#"
            INSERT INTO appointments (
                id, business_id, conversation_id, client_id, starts_at, ends_at, service, notes, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'SCHEDULED')
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(business_id)
        .bind(payload.conversation_id)
        .bind(client_id)
        .bind(payload.starts_at)
        .bind(payload.ends_at)
        .bind(payload.service.trim())
        .bind(payload.notes.as_deref())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(appointment)
    }

    pub async fn list(
        &self,
        business_id: Uuid,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Appointment>> {
        let from = from.unwrap_or_else(|| now() - Duration::days(1));
        let to = to.unwrap_or_else(|| from + Duration::days(31));
        check_window(from, to)?;
        let appointments = sqlx::query_as::<_, Appointment>(
            r#"
            SELECT * FROM appointments
            WHERE business_id = $1 AND starts_at < $3 AND ends_at > $2
            ORDER BY starts_at ASC
            "#,
        )
        .bind(business_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(appointments)
    }

    pub async fn reschedule(
        &self,
        business_id: Uuid,
        id: Uuid,
        payload: &ReschedulePayload,
    ) -> Result<Appointment> {
        check_window(payload.starts_at, payload.ends_at)?;
        let updated = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments
            SET starts_at = $3, ends_at = $4, notes = COALESCE($5, notes), updated_at = NOW()
            WHERE id = $1 AND business_id = $2 AND status = 'SCHEDULED'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_id)
        .bind(payload.starts_at)
        .bind(payload.ends_at)
        .bind(payload.notes.as_deref())
        .fetch_optional(&self.pool)
        .await?;
        match updated {
            Some(appointment) => Ok(appointment),
            None => Err(self.not_scheduled(business_id, id).await?),
        }
    }

    /// Closes a scheduled appointment as completed, canceled or no-show.
    pub async fn set_status(
        &self,
        business_id: Uuid,
        id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment> {
        if status == AppointmentStatus::Scheduled {
            return Err(Error::BadRequest(
                "appointments cannot be moved back to SCHEDULED".to_string(),
            ));
        }
        let updated = sqlx::query_as::<_, Appointment>(
            r#"
            UPDATE appointments SET status = $3, updated_at = NOW()
            WHERE id = $1 AND business_id = $2 AND status = 'SCHEDULED'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(business_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;
        match updated {
            Some(appointment) => Ok(appointment),
            None => Err(self.not_scheduled(business_id, id).await?),
        }
    }

    async fn not_scheduled(&self, business_id: Uuid, id: Uuid) -> Result<Error> {
        let current: Option<(AppointmentStatus,)> =
            sqlx::query_as("SELECT status FROM appointments WHERE id = $1 AND business_id = $2")
                .bind(id)
                .bind(business_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(match current {
            Some((status,)) => Error::BadRequest(format!(
                "appointment is {:?}, only scheduled appointments can change",
                status
            )),
            None => Error::NotFound("appointment not found".to_string()),
        })
    }
}
