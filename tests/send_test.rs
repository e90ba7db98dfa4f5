mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{accepted, rejected, seed_conversation, seed_tenant, send_json, setup_app, tenant_cookie};

#[tokio::test]
async fn accepted_text_is_sent_without_template() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    t.whatsapp.push_text(Ok(accepted("wamid.TXT1")));

    let cookie = tenant_cookie(business_id);
    let (status, json) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/messages", conversation_id),
        Some(&cookie),
        Some(json!({ "text": "Su cita es mañana a las 10" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["usedTemplate"], false);
    assert_eq!(json["message"]["status"], "SENT");
    assert_eq!(json["message"]["provider_message_id"], "wamid.TXT1");
    assert_eq!(json["message"]["direction"], "OUTBOUND");

    let calls = t.whatsapp.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].starts_with("text:"));

    let (outbox_status,): (String,) = sqlx::query_as("SELECT status::TEXT FROM outbox_messages WHERE conversation_id = $1")
        .bind(conversation_id)
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert_eq!(outbox_status, "SENT");
}

#[tokio::test]
async fn expired_session_falls_back_to_template() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    t.whatsapp.push_text(Err(rejected(131047, "Re-engagement message")));
    t.whatsapp.push_template(Ok(accepted("wamid.TPL1")));

    let cookie = tenant_cookie(business_id);
    let (status, json) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/messages", conversation_id),
        Some(&cookie),
        Some(json!({ "text": "Hola de nuevo" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], true);
    assert_eq!(json["usedTemplate"], true);
    assert_eq!(json["message"]["provider_message_id"], "wamid.TPL1");
    assert_eq!(json["message"]["payload"]["usedTemplate"], true);

    let calls = t.whatsapp.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].starts_with("template:"));
    assert!(calls[1].ends_with(":hello_world:es_MX"));
}

#[tokio::test]
async fn failed_template_marks_message_failed() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    t.whatsapp.push_text(Err(rejected(131047, "Re-engagement message")));
    t.whatsapp.push_template(Err(rejected(132001, "Template name does not exist")));

    let cookie = tenant_cookie(business_id);
    let (status, json) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/messages", conversation_id),
        Some(&cookie),
        Some(json!({ "text": "Hola de nuevo" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["ok"], false);
    assert_eq!(json["usedTemplate"], true);
    assert!(json["error"].is_string());
    assert_eq!(json["message"]["status"], "FAILED");
    assert_eq!(json["message"]["payload"]["failure"]["usedTemplate"], true);

    let (outbox_status, last_error): (String, Option<String>) = sqlx::query_as(
        "SELECT status::TEXT, last_error FROM outbox_messages WHERE conversation_id = $1",
    )
    .bind(conversation_id)
    .fetch_one(&t.pool)
    .await
    .unwrap();
    assert_eq!(outbox_status, "FAILED");
    assert!(last_error.is_some());
}

#[tokio::test]
async fn blank_text_is_rejected_before_enqueue() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;

    let cookie = tenant_cookie(business_id);
    let (status, _) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/messages", conversation_id),
        Some(&cookie),
        Some(json!({ "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM outbox_messages WHERE conversation_id = $1")
        .bind(conversation_id)
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
    assert!(t.whatsapp.calls().is_empty());
}

#[tokio::test]
async fn other_tenants_cannot_send_into_a_conversation() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    let (intruder, _) = seed_tenant(&t.pool).await;

    let (status, _) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/messages", conversation_id),
        Some(&tenant_cookie(intruder)),
        Some(json!({ "text": "Hola" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/messages", conversation_id),
        None,
        Some(json!({ "text": "Hola" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
