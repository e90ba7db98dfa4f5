use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const CHANNEL_WHATSAPP: &str = "whatsapp";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: Uuid,
    pub business_id: Uuid,
    pub channel: String,
    pub contact_key: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_display: Option<String>,
    pub client_id: Option<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub unread_count: i32,
    pub last_read_message_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Number to dial for outbound sends. Legacy rows may only carry one of the two columns.
    pub fn dialable_phone(&self) -> Option<String> {
        self.contact_phone
            .as_deref()
            .or(self.contact_key.as_deref())
            .map(crate::utils::phone::normalize_phone)
            .filter(|p| !p.is_empty())
    }
}
