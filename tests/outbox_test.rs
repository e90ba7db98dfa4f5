mod common;

use axum::http::StatusCode;
use sqlx::PgPool;
use uuid::Uuid;

use common::{admin_cookie, rejected, seed_conversation, seed_tenant, send_json, setup_app};

/// Inserts an outbound message with its outbox row in the given status.
async fn seed_outbox(pool: &PgPool, business_id: Uuid, conversation_id: Uuid, status: &str) -> (Uuid, Uuid) {
    let message_id = Uuid::new_v4();
    let outbox_id = Uuid::new_v4();
    let message_status = if status == "FAILED" { "FAILED" } else { "SENT" };
    sqlx::query(
        r#"
        INSERT INTO messages (id, conversation_id, business_id, direction, provider, text, status)
        VALUES ($1, $2, $3, 'OUTBOUND', 'whatsapp', 'Recordatorio', $4::message_status)
        "#,
    )
    .bind(message_id)
    .bind(conversation_id)
    .bind(business_id)
    .bind(message_status)
    .execute(pool)
    .await
    .expect("seed message");
    sqlx::query(
        r#"
        INSERT INTO outbox_messages (
            id, business_id, conversation_id, message_id, provider, contact_key, to_phone, text,
            status, attempt_count, last_error
        )
        VALUES ($1, $2, $3, $4, 'whatsapp', '5215512345678', '5215512345678', 'Recordatorio',
                $5::outbox_status, 1, $6)
        "#,
    )
    .bind(outbox_id)
    .bind(business_id)
    .bind(conversation_id)
    .bind(message_id)
    .bind(status)
    .bind((status == "FAILED").then_some("boom"))
    .execute(pool)
    .await
    .expect("seed outbox");
    (outbox_id, message_id)
}

#[tokio::test]
async fn retry_rejects_rows_that_are_not_failed() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    let (outbox_id, _) = seed_outbox(&t.pool, business_id, conversation_id, "SENT").await;

    let cookie = admin_cookie();
    let (status, _) = send_json(
        &t.app,
        "POST",
        &format!("/api/admin/outbox/{}/retry", outbox_id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (unchanged,): (String,) = sqlx::query_as("SELECT status::TEXT FROM outbox_messages WHERE id = $1")
        .bind(outbox_id)
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert_eq!(unchanged, "SENT");

    let (status, _) = send_json(
        &t.app,
        "POST",
        &format!("/api/admin/outbox/{}/retry", Uuid::new_v4()),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn retry_requires_admin_session() {
    let t = setup_app().await;
    let (business_id, _) = seed_tenant(&t.pool).await;
    let (status, _) = send_json(
        &t.app,
        "POST",
        &format!("/api/admin/outbox/{}/retry", Uuid::new_v4()),
        Some(&common::tenant_cookie(business_id)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn retried_row_is_delivered_by_worker() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    let (outbox_id, message_id) = seed_outbox(&t.pool, business_id, conversation_id, "FAILED").await;

    let (status, json) = send_json(
        &t.app,
        "POST",
        &format!("/api/admin/outbox/{}/retry", outbox_id),
        Some(&admin_cookie()),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "PENDING");
    assert_eq!(json["attemptCount"], 1);

    let (last_error,): (Option<String>,) = sqlx::query_as("SELECT last_error FROM outbox_messages WHERE id = $1")
        .bind(outbox_id)
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert!(last_error.is_none());

    // Other due rows in the shared database may be drained first.
    let worker = t.state.outbox_worker();
    let mut delivered = false;
    for _ in 0..20 {
        worker.run_once().await.expect("worker pass");
        let (status,): (String,) = sqlx::query_as("SELECT status::TEXT FROM outbox_messages WHERE id = $1")
            .bind(outbox_id)
            .fetch_one(&t.pool)
            .await
            .unwrap();
        if status == "SENT" {
            delivered = true;
            break;
        }
    }
    assert!(delivered, "outbox row was never delivered");

    let (message_status, provider_id): (String, Option<String>) =
        sqlx::query_as("SELECT status::TEXT, provider_message_id FROM messages WHERE id = $1")
            .bind(message_id)
            .fetch_one(&t.pool)
            .await
            .unwrap();
    assert_eq!(message_status, "SENT");
    assert!(provider_id.is_some());
}

#[tokio::test]
async fn worker_reschedules_transient_failures() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    let (outbox_id, _) = seed_outbox(&t.pool, business_id, conversation_id, "FAILED").await;
    // Not due yet, so no concurrent worker pass picks it up.
    sqlx::query(
        r#"
        UPDATE outbox_messages
        SET status = 'PENDING', attempt_count = 0, next_attempt_at = NOW() + INTERVAL '1 hour'
        WHERE id = $1
        "#,
    )
    .bind(outbox_id)
    .execute(&t.pool)
    .await
    .unwrap();

    t.whatsapp.push_text(Err(rejected(1, "Service temporarily unavailable")));
    let row = t
        .state
        .outbox_service
        .claim(outbox_id)
        .await
        .expect("claim")
        .expect("row was pending");
    assert_eq!(row.attempt_count, 1);
    t.state.outbox_worker().deliver(&row).await.expect("deliver");

    let (status, attempts, last_error, next_attempt_in): (String, i32, Option<String>, f64) = sqlx::query_as(
        r#"
        SELECT status::TEXT, attempt_count, last_error,
               EXTRACT(EPOCH FROM (next_attempt_at - NOW()))::FLOAT8
        FROM outbox_messages WHERE id = $1
        "#,
    )
    .bind(outbox_id)
    .fetch_one(&t.pool)
    .await
    .unwrap();
    assert_eq!(status, "PENDING");
    assert_eq!(attempts, 1);
    assert_eq!(last_error.as_deref(), Some("Service temporarily unavailable"));
    assert!(next_attempt_in > 20.0 && next_attempt_in <= 30.0);
}

#[tokio::test]
async fn worker_gives_up_after_max_attempts() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    let (outbox_id, message_id) = seed_outbox(&t.pool, business_id, conversation_id, "SENT").await;
    sqlx::query(
        r#"
        UPDATE outbox_messages
        SET status = 'PENDING', attempt_count = 2, next_attempt_at = NOW() + INTERVAL '1 hour'
        WHERE id = $1
        "#,
    )
    .bind(outbox_id)
    .execute(&t.pool)
    .await
    .unwrap();
    sqlx::query("UPDATE messages SET status = 'QUEUED' WHERE id = $1")
        .bind(message_id)
        .execute(&t.pool)
        .await
        .unwrap();

    t.whatsapp.push_text(Err(rejected(1, "Service temporarily unavailable")));
    let row = t
        .state
        .outbox_service
        .claim(outbox_id)
        .await
        .expect("claim")
        .expect("row was pending");
    // OUTBOX_MAX_ATTEMPTS is 3 in the test environment.
    t.state.outbox_worker().deliver(&row).await.expect("deliver");

    let (status,): (String,) = sqlx::query_as("SELECT status::TEXT FROM outbox_messages WHERE id = $1")
        .bind(outbox_id)
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert_eq!(status, "FAILED");
    let (message_status,): (String,) = sqlx::query_as("SELECT status::TEXT FROM messages WHERE id = $1")
        .bind(message_id)
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert_eq!(message_status, "FAILED");
}
