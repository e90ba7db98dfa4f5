use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::message::Message;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SendMessagePayload {
    #[validate(length(min = 1, max = 4096))]
    pub text: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageResponse {
    pub ok: bool,
    #[schema(value_type = Object)]
    pub message: Message,
    pub outbox_id: Uuid,
    pub used_template: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MarkReadPayload {
    pub up_to_message_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LinkClientPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListConversationsQuery {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub unread_only: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListMessagesQuery {
    pub before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 7, max = 32))]
    pub phone: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListClientsQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
}
