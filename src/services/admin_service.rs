use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::dto::admin_dto::{
    AdminOverview, Alert, AlertLevel, BusinessVolumeRow, DeliveryKpis, FailedOutboxRow, Kpis,
    MessageKpis, OutboxKpis, OverviewRange, OverviewTables, RiskBusinessRow, StuckOutboxRow,
    WebhookFailureRow, WebhookKpis,
};
use crate::error::Result;
use crate::middleware::auth::RequestContext;
use crate::models::outbox::OutboxMessage;
use crate::services::outbox_service::OutboxService;
use crate::utils::cache::ResponseCache;
use crate::utils::time::now;

const ALL_RANGES: [OverviewRange; 4] = [
    OverviewRange::TwoHours,
    OverviewRange::OneDay,
    OverviewRange::SevenDays,
    OverviewRange::ThirtyDays,
];

const STUCK_AFTER_SECS: i64 = 300;
const TABLE_LIMIT: i64 = 20;

const WH_FAIL_RATE_THRESHOLD: f64 = 0.02;
const WH_FAIL_RATE_MIN_EVENTS: i64 = 50;
const WH_STALE_AFTER_SECS: i64 = 3600;
const OUTBOX_OLD_AFTER_SECS: i64 = 300;
const OUTBOX_BACKLOG_THRESHOLD: i64 = 50;
const DELIVERY_FAIL_RATE_THRESHOLD: f64 = 0.05;
const DELIVERY_FAIL_MIN_ATTEMPTS: i64 = 20;

#[derive(Clone)]
pub struct AdminService {
    pool: PgPool,
    outbox: OutboxService,
    cache: Arc<dyn ResponseCache<AdminOverview>>,
    cache_ttl: StdDuration,
}

impl AdminService {
    pub fn new(
        pool: PgPool,
        outbox: OutboxService,
        cache: Arc<dyn ResponseCache<AdminOverview>>,
        cache_ttl: StdDuration,
    ) -> Self {
        Self {
            pool,
            outbox,
            cache,
            cache_ttl,
        }
    }

    pub async fn overview(&self, ctx: &RequestContext, range: OverviewRange) -> Result<AdminOverview> {
        ctx.ensure_admin()?;

        if let Some(mut hit) = self.cache.get(range.as_str()) {
            hit.cached = true;
            return Ok(hit);
        }

        let generated_at = now();
        let since = generated_at - range.duration();
        let since_2h = generated_at - Duration::hours(2);

        let (webhook, outbox, delivery, messages) = tokio::try_join!(
            self.webhook_kpis(since, since_2h),
            self.outbox_kpis(since, generated_at),
            self.delivery_kpis(since),
            self.message_kpis(since),
        )?;
        let (stuck_outbox, failed_outbox, top_businesses, risk_businesses, recent_webhook_failures) = tokio::try_join!(
            self.stuck_outbox(generated_at),
            self.failed_outbox(since),
            self.top_businesses(since),
            self.risk_businesses(since_2h),
            self.recent_webhook_failures(since),
        )?;

        let kpis = Kpis {
            webhook,
            outbox,
            delivery,
            messages,
        };
        let tables = OverviewTables {
            stuck_outbox,
            failed_outbox,
            top_businesses,
            risk_businesses,
            recent_webhook_failures,
        };
        let overview = AdminOverview {
            range,
            generated_at,
            cached: false,
            alerts: compute_alerts(&kpis, &tables, generated_at),
            kpis,
            tables,
            limitations: limitations(),
        };

        self.cache
            .set(range.as_str(), overview.clone(), self.cache_ttl);
        Ok(overview)
    }

    /// Admin requeue of a FAILED outbox row. Drops cached overviews so the change shows up.
    pub async fn retry_outbox(&self, ctx: &RequestContext, id: Uuid) -> Result<OutboxMessage> {
        ctx.ensure_admin()?;
        let row = self.outbox.retry(id).await?;
        for range in ALL_RANGES {
            self.cache.expire(range.as_str());
        }
        Ok(row)
    }

    async fn webhook_kpis(&self, since: DateTime<Utc>, since_2h: DateTime<Utc>) -> Result<WebhookKpis> {
        let (total, failed, total_2h, failed_2h, last_received_at): (
            i64,
            i64,
            i64,
            i64,
            Option<DateTime<Utc>>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE received_at >= $1),
                COUNT(*) FILTER (WHERE received_at >= $1 AND status = 'FAILED'),
                COUNT(*) FILTER (WHERE received_at >= $2),
                COUNT(*) FILTER (WHERE received_at >= $2 AND status = 'FAILED'),
                MAX(received_at)
            FROM webhook_events
            "#,
        )
        .bind(since)
        .bind(since_2h)
        .fetch_one(&self.pool)
        .await?;

        Ok(WebhookKpis {
            total,
            failed,
            failed_rate: ratio(failed, total),
            total_2h,
            failed_2h,
            failed_rate_2h: ratio(failed_2h, total_2h),
            last_received_at,
        })
    }

    async fn outbox_kpis(&self, since: DateTime<Utc>, at: DateTime<Utc>) -> Result<OutboxKpis> {
        let (backlog, pending, sending, failed, oldest_pending_age_sec): (
            i64,
            i64,
            i64,
            i64,
            Option<i64>,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status IN ('PENDING', 'SENDING')),
                COUNT(*) FILTER (WHERE status = 'PENDING'),
                COUNT(*) FILTER (WHERE status = 'SENDING'),
                COUNT(*) FILTER (WHERE status = 'FAILED' AND updated_at >= $1),
                (MAX(GREATEST(0, EXTRACT(EPOCH FROM ($2 - CASE
                    WHEN status = 'PENDING' THEN next_attempt_at
                    ELSE updated_at
                END)))) FILTER (WHERE status IN ('PENDING', 'SENDING')))::BIGINT
            FROM outbox_messages
            "#,
        )
        .bind(since)
        .bind(at)
        .fetch_one(&self.pool)
        .await?;

        Ok(OutboxKpis {
            backlog,
            pending,
            sending,
            failed,
            oldest_pending_age_sec,
        })
    }

    async fn delivery_kpis(&self, since: DateTime<Utc>) -> Result<DeliveryKpis> {
        let (sent, delivered, read, failed): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status IN ('SENT', 'DELIVERED', 'READ')),
                COUNT(*) FILTER (WHERE status IN ('DELIVERED', 'READ')),
                COUNT(*) FILTER (WHERE status = 'READ'),
                COUNT(*) FILTER (WHERE status = 'FAILED')
            FROM messages
            WHERE direction = 'OUTBOUND' AND created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(DeliveryKpis {
            sent,
            delivered,
            read,
            failed,
            read_rate: ratio(read, sent),
            delivered_rate: ratio(delivered, sent),
            failure_rate: ratio(failed, sent + failed),
        })
    }

    async fn message_kpis(&self, since: DateTime<Utc>) -> Result<MessageKpis> {
        let (inbound, outbound): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE direction = 'INBOUND'),
                COUNT(*) FILTER (WHERE direction = 'OUTBOUND')
            FROM messages
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(MessageKpis { inbound, outbound })
    }

    async fn stuck_outbox(&self, at: DateTime<Utc>) -> Result<Vec<StuckOutboxRow>> {
        let rows = sqlx::query_as::<_, StuckOutboxRow>(
            r#"
            SELECT * FROM (
                SELECT o.id, o.business_id, b.name AS business_name, o.status, o.attempt_count,
                       o.next_attempt_at, o.last_error,
                       EXTRACT(EPOCH FROM ($1 - CASE
                           WHEN o.status = 'PENDING' THEN o.next_attempt_at
                           ELSE o.updated_at
                       END))::BIGINT AS age_sec
                FROM outbox_messages o
                LEFT JOIN businesses b ON b.id = o.business_id
                WHERE o.status IN ('PENDING', 'SENDING')
            ) due
            WHERE due.age_sec > $2
            ORDER BY due.age_sec DESC
            LIMIT $3
            "#,
        )
        .bind(at)
        .bind(STUCK_AFTER_SECS)
        .bind(TABLE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn failed_outbox(&self, since: DateTime<Utc>) -> Result<Vec<FailedOutboxRow>> {
        let rows = sqlx::query_as::<_, FailedOutboxRow>(
            r#"
            SELECT o.id, o.business_id, b.name AS business_name, o.attempt_count, o.last_error, o.updated_at
            FROM outbox_messages o
            LEFT JOIN businesses b ON b.id = o.business_id
            WHERE o.status = 'FAILED' AND o.updated_at >= $1
            ORDER BY o.updated_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(TABLE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn top_businesses(&self, since: DateTime<Utc>) -> Result<Vec<BusinessVolumeRow>> {
        let rows = sqlx::query_as::<_, BusinessVolumeRow>(
            r#"
            SELECT m.business_id, b.name AS business_name,
                   COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE m.direction = 'INBOUND') AS inbound,
                   COUNT(*) FILTER (WHERE m.direction = 'OUTBOUND') AS outbound
            FROM messages m
            LEFT JOIN businesses b ON b.id = m.business_id
            WHERE m.created_at >= $1
            GROUP BY m.business_id, b.name
            ORDER BY total DESC
            LIMIT 10
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn risk_businesses(&self, since_2h: DateTime<Utc>) -> Result<Vec<RiskBusinessRow>> {
        let rows = sqlx::query_as::<_, RiskBusinessRow>(
            r#"
            WITH failures AS (
                SELECT business_id, COUNT(*) AS n FROM outbox_messages
                WHERE status = 'FAILED' AND updated_at >= $1
                GROUP BY business_id
                UNION ALL
                SELECT business_id, COUNT(*) AS n FROM webhook_events
                WHERE status = 'FAILED' AND received_at >= $1 AND business_id IS NOT NULL
                GROUP BY business_id
            ),
            failure_totals AS (
                SELECT business_id, SUM(n)::BIGINT AS failures FROM failures GROUP BY business_id
            ),
            pending AS (
                SELECT business_id, COUNT(*) AS pending FROM outbox_messages
                WHERE status = 'PENDING'
                GROUP BY business_id
            )
            SELECT b.id AS business_id, b.name AS business_name,
                   COALESCE(f.failures, 0) AS failures_2h,
                   COALESCE(p.pending, 0) AS pending,
                   COALESCE(f.failures, 0) * 3 + COALESCE(p.pending, 0) AS risk_score
            FROM businesses b
            LEFT JOIN failure_totals f ON f.business_id = b.id
            LEFT JOIN pending p ON p.business_id = b.id
            WHERE COALESCE(f.failures, 0) >= 3 OR COALESCE(p.pending, 0) >= 10
            ORDER BY risk_score DESC
            LIMIT $2
            "#,
        )
        .bind(since_2h)
        .bind(TABLE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent_webhook_failures(&self, since: DateTime<Utc>) -> Result<Vec<WebhookFailureRow>> {
        let rows = sqlx::query_as::<_, WebhookFailureRow>(
            r#"
            SELECT id, business_id, event_type, error, received_at
            FROM webhook_events
            WHERE status = 'FAILED' AND received_at >= $1
            ORDER BY received_at DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(TABLE_LIMIT)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn ratio(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn limitations() -> Vec<String> {
    vec![
        "Cached per process for a few seconds; other instances may show different numbers.".to_string(),
        "Delivery funnel counts outbound messages created in the range by their current status.".to_string(),
        "SENDING rows are never resolved automatically and need a manual look.".to_string(),
    ]
}

/// Threshold rules over one snapshot. Pure so it can be evaluated without a database.
pub fn compute_alerts(kpis: &Kpis, tables: &OverviewTables, at: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    let webhook = &kpis.webhook;
    if webhook.total_2h >= WH_FAIL_RATE_MIN_EVENTS && webhook.failed_rate_2h > WH_FAIL_RATE_THRESHOLD {
        alerts.push(Alert {
            code: "WH_FAIL_RATE_HIGH",
            level: AlertLevel::Red,
            message: format!(
                "{} of {} webhook events failed in the last 2h ({:.1}%)",
                webhook.failed_2h,
                webhook.total_2h,
                webhook.failed_rate_2h * 100.0
            ),
        });
    }

    let stale = match webhook.last_received_at {
        Some(last) => (at - last).num_seconds() > WH_STALE_AFTER_SECS,
        None => true,
    };
    if stale {
        alerts.push(Alert {
            code: "WH_STALE",
            level: AlertLevel::Yellow,
            message: "No webhook events received in the last hour".to_string(),
        });
    }

    if let Some(age) = kpis.outbox.oldest_pending_age_sec {
        if age > OUTBOX_OLD_AFTER_SECS {
            alerts.push(Alert {
                code: "OUTBOX_OLD",
                level: AlertLevel::Yellow,
                message: format!("Oldest pending outbox message is {}s overdue", age),
            });
        }
    }

    if kpis.outbox.backlog >= OUTBOX_BACKLOG_THRESHOLD {
        alerts.push(Alert {
            code: "OUTBOX_BACKLOG",
            level: AlertLevel::Yellow,
            message: format!("{} outbox messages waiting to be sent", kpis.outbox.backlog),
        });
    }

    let delivery = &kpis.delivery;
    let attempted = delivery.sent + delivery.failed;
    if attempted >= DELIVERY_FAIL_MIN_ATTEMPTS && ratio(delivery.failed, attempted) > DELIVERY_FAIL_RATE_THRESHOLD {
        alerts.push(Alert {
            code: "DELIVERY_FAIL_RATE",
            level: AlertLevel::Red,
            message: format!(
                "{} of {} outbound messages failed ({:.1}%)",
                delivery.failed,
                attempted,
                ratio(delivery.failed, attempted) * 100.0
            ),
        });
    }

    if !tables.risk_businesses.is_empty() {
        alerts.push(Alert {
            code: "RISK_BUSINESSES",
            level: AlertLevel::Yellow,
            message: format!("{} businesses need attention", tables.risk_businesses.len()),
        });
    }

    alerts
}
