mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use common::{inbound_text_payload_at, post_webhook, seed_conversation, seed_tenant, send_json, setup_app, tenant_cookie};

#[tokio::test]
async fn mark_read_clears_unread_up_to_acknowledged_message() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    for (body, ts) in [("Quiero una cita", 1_700_000_100), ("Para el viernes", 1_700_000_200)] {
        let wamid = format!("wamid.{}", Uuid::new_v4().simple());
        post_webhook(
            &t.app,
            &inbound_text_payload_at(&phone_number_id, "5215512345678", &wamid, body, ts),
        )
        .await;
    }
    let cookie = tenant_cookie(business_id);

    let (status, list) = send_json(&t.app, "GET", "/api/conversations?unread_only=true", Some(&cookie), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 1);
    assert_eq!(list["items"][0]["unread_count"], 3);

    let (status, messages) = send_json(
        &t.app,
        "GET",
        &format!("/api/conversations/{}/messages", conversation_id),
        Some(&cookie),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let messages = messages.as_array().expect("messages").clone();
    assert_eq!(messages.len(), 3);
    // Newest first; acknowledge the middle one.
    let middle = messages[1]["id"].as_str().unwrap().to_string();

    let (status, conversation) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/read", conversation_id),
        Some(&cookie),
        Some(json!({ "up_to_message_id": middle })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversation["unread_count"], 1);
    assert_eq!(conversation["last_read_message_id"], middle.as_str());

    let (status, _) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/read", conversation_id),
        Some(&cookie),
        Some(json!({ "up_to_message_id": Uuid::new_v4() })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conversations_are_scoped_to_the_session_business() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    let (other, _) = seed_tenant(&t.pool).await;

    let (status, _) = send_json(
        &t.app,
        "GET",
        &format!("/api/conversations/{}", conversation_id),
        Some(&tenant_cookie(other)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = send_json(&t.app, "GET", "/api/conversations", Some(&tenant_cookie(other)), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["total"], 0);
}

#[tokio::test]
async fn appointment_from_conversation_backfills_client() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    let cookie = tenant_cookie(business_id);

    let starts_at = Utc::now() + Duration::days(2);
    let (status, appointment) = send_json(
        &t.app,
        "POST",
        "/api/appointments",
        Some(&cookie),
        Some(json!({
            "conversation_id": conversation_id,
            "starts_at": starts_at,
            "ends_at": starts_at + Duration::minutes(45),
            "service": "Corte"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(appointment["status"], "SCHEDULED");
    let client_id = appointment["client_id"].as_str().expect("client backfilled").to_string();

    let (linked,): (Option<Uuid>,) = sqlx::query_as("SELECT client_id FROM conversations WHERE id = $1")
        .bind(conversation_id)
        .fetch_one(&t.pool)
        .await
        .unwrap();
    assert_eq!(linked.map(|id| id.to_string()), Some(client_id));

    let id = appointment["id"].as_str().unwrap();
    let (status, done) = send_json(
        &t.app,
        "POST",
        &format!("/api/appointments/{}/status", id),
        Some(&cookie),
        Some(json!({ "status": "COMPLETED" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "COMPLETED");

    let (status, _) = send_json(
        &t.app,
        "PATCH",
        &format!("/api/appointments/{}", id),
        Some(&cookie),
        Some(json!({
            "starts_at": starts_at + Duration::days(1),
            "ends_at": starts_at + Duration::days(1) + Duration::minutes(45)
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn appointment_window_must_be_positive() {
    let t = setup_app().await;
    let (business_id, _) = seed_tenant(&t.pool).await;
    let starts_at = Utc::now() + Duration::days(1);

    let (status, _) = send_json(
        &t.app,
        "POST",
        "/api/appointments",
        Some(&tenant_cookie(business_id)),
        Some(json!({
            "starts_at": starts_at,
            "ends_at": starts_at,
            "service": "Corte"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mark_read_keeps_later_message_from_the_same_second_unread() {
    let t = setup_app().await;
    let (business_id, phone_number_id) = seed_tenant(&t.pool).await;
    let conversation_id = seed_conversation(&t.app, &t.pool, business_id, &phone_number_id, "5215512345678").await;
    let first = format!("wamid.{}", Uuid::new_v4().simple());
    let second = format!("wamid.{}", Uuid::new_v4().simple());
    for (wamid, body) in [(&first, "Hola otra vez"), (&second, "Sigues ahi?")] {
        post_webhook(
            &t.app,
            &inbound_text_payload_at(&phone_number_id, "5215512345678", wamid, body, 1_700_000_500),
        )
        .await;
    }

    let (first_id,): (Uuid,) = sqlx::query_as("SELECT id FROM messages WHERE provider_message_id = $1")
        .bind(&first)
        .fetch_one(&t.pool)
        .await
        .unwrap();

    let (status, conversation) = send_json(
        &t.app,
        "POST",
        &format!("/api/conversations/{}/read", conversation_id),
        Some(&tenant_cookie(business_id)),
        Some(json!({ "up_to_message_id": first_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(conversation["unread_count"], 1);

    let (status, messages) = send_json(
        &t.app,
        "GET",
        &format!("/api/conversations/{}/messages", conversation_id),
        Some(&tenant_cookie(business_id)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(messages[0]["provider_message_id"], second.as_str());
}
