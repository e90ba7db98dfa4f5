use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::Error;
use crate::models::outbox::{OutboxMessage, OutboxStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum OverviewRange {
    #[serde(rename = "2h")]
    TwoHours,
    #[default]
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl OverviewRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverviewRange::TwoHours => "2h",
            OverviewRange::OneDay => "24h",
            OverviewRange::SevenDays => "7d",
            OverviewRange::ThirtyDays => "30d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            OverviewRange::TwoHours => Duration::hours(2),
            OverviewRange::OneDay => Duration::hours(24),
            OverviewRange::SevenDays => Duration::days(7),
            OverviewRange::ThirtyDays => Duration::days(30),
        }
    }

    pub fn parse(raw: Option<&str>) -> Result<Self, Error> {
        match raw.map(str::trim) {
            None | Some("") => Ok(Self::default()),
            Some("2h") => Ok(OverviewRange::TwoHours),
            Some("24h") => Ok(OverviewRange::OneDay),
            Some("7d") => Ok(OverviewRange::SevenDays),
            Some("30d") => Ok(OverviewRange::ThirtyDays),
            Some(other) => Err(Error::BadRequest(format!(
                "invalid range '{}', expected one of 2h|24h|7d|30d",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct OverviewQuery {
    pub range: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminOverview {
    pub range: OverviewRange,
    pub generated_at: DateTime<Utc>,
    pub cached: bool,
    pub kpis: Kpis,
    pub alerts: Vec<Alert>,
    pub tables: OverviewTables,
    pub limitations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Kpis {
    pub webhook: WebhookKpis,
    pub outbox: OutboxKpis,
    pub delivery: DeliveryKpis,
    pub messages: MessageKpis,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookKpis {
    pub total: i64,
    pub failed: i64,
    pub failed_rate: f64,
    pub total_2h: i64,
    pub failed_2h: i64,
    pub failed_rate_2h: f64,
    pub last_received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxKpis {
    pub backlog: i64,
    pub pending: i64,
    pub sending: i64,
    pub failed: i64,
    pub oldest_pending_age_sec: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryKpis {
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
    pub read_rate: f64,
    pub delivered_rate: f64,
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKpis {
    pub inbound: i64,
    pub outbound: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Red,
    Yellow,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub code: &'static str,
    pub level: AlertLevel,
    pub message: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewTables {
    pub stuck_outbox: Vec<StuckOutboxRow>,
    pub failed_outbox: Vec<FailedOutboxRow>,
    pub top_businesses: Vec<BusinessVolumeRow>,
    pub risk_businesses: Vec<RiskBusinessRow>,
    pub recent_webhook_failures: Vec<WebhookFailureRow>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StuckOutboxRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub business_name: Option<String>,
    pub status: OutboxStatus,
    pub attempt_count: i32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub age_sec: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FailedOutboxRow {
    pub id: Uuid,
    pub business_id: Uuid,
    pub business_name: Option<String>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BusinessVolumeRow {
    pub business_id: Uuid,
    pub business_name: Option<String>,
    pub total: i64,
    pub inbound: i64,
    pub outbound: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct RiskBusinessRow {
    pub business_id: Uuid,
    pub business_name: Option<String>,
    pub failures_2h: i64,
    pub pending: i64,
    pub risk_score: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct WebhookFailureRow {
    pub id: Uuid,
    pub business_id: Option<Uuid>,
    pub event_type: String,
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutboxRetryResponse {
    pub id: Uuid,
    #[schema(value_type = String, example = "PENDING")]
    pub status: OutboxStatus,
    pub attempt_count: i32,
    pub next_attempt_at: DateTime<Utc>,
}

impl From<OutboxMessage> for OutboxRetryResponse {
    fn from(row: OutboxMessage) -> Self {
        Self {
            id: row.id,
            status: row.status,
            attempt_count: row.attempt_count,
            next_attempt_at: row.next_attempt_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBusinessPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ListBusinessesQuery {
    pub include_deleted: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BindWhatsAppPayload {
    #[validate(length(min = 1, max = 64))]
    pub phone_number_id: String,
    pub access_token: Option<String>,
    pub display_phone_number: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OnboardingTokenResponse {
    pub token: String,
    pub business_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_defaults_to_24h_and_rejects_unknown_values() {
        assert_eq!(OverviewRange::parse(None).unwrap(), OverviewRange::OneDay);
        assert_eq!(OverviewRange::parse(Some("")).unwrap(), OverviewRange::OneDay);
        assert_eq!(OverviewRange::parse(Some("7d")).unwrap(), OverviewRange::SevenDays);
        assert!(matches!(OverviewRange::parse(Some("1y")), Err(Error::BadRequest(_))));
    }

    #[test]
    fn kpis_serialize_in_camel_case() {
        let kpis = Kpis {
            webhook: WebhookKpis {
                failed_rate_2h: 0.05,
                ..Default::default()
            },
            outbox: OutboxKpis {
                oldest_pending_age_sec: Some(601),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&kpis).unwrap();
        assert_eq!(json["webhook"]["failedRate2h"], 0.05);
        assert_eq!(json["outbox"]["oldestPendingAgeSec"], 601);
        assert_eq!(serde_json::to_value(OverviewRange::TwoHours).unwrap(), "2h");
    }
}
