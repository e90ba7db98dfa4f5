use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::models::appointment::AppointmentStatus;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAppointmentPayload {
    pub conversation_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[validate(length(min = 1, max = 200))]
    pub service: String,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReschedulePayload {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentStatusPayload {
    pub status: AppointmentStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListAppointmentsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
