use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_direction", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Declaration order matches the database enum, which is the lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "message_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub business_id: Uuid,
    pub direction: MessageDirection,
    pub provider: String,
    pub provider_message_id: Option<String>,
    pub text: String,
    pub payload: JsonValue,
    pub status: MessageStatus,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateInboundMessage {
    pub conversation_id: Uuid,
    pub business_id: Uuid,
    pub provider: String,
    pub provider_message_id: String,
    pub text: String,
    pub payload: JsonValue,
    pub received_at: DateTime<Utc>,
}

/// Result of an idempotent inbound insert.
#[derive(Debug)]
pub enum InboundInsert {
    Created(Message),
    Duplicate,
}
