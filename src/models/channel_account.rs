use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

pub const PROVIDER_WHATSAPP: &str = "whatsapp";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelAccount {
    pub id: Uuid,
    pub business_id: Uuid,
    pub provider: String,
    pub phone_number_id: String,
    #[serde(skip_serializing)]
    pub config: JsonValue,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChannelAccount {
    pub fn access_token(&self) -> Option<&str> {
        self.config
            .get("access_token")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn display_phone_number(&self) -> Option<&str> {
        self.config
            .get("display_phone_number")
            .and_then(|v| v.as_str())
    }
}
