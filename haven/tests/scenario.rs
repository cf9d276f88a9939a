//! Full lifecycle runs against the HTTP surface: registration through
//! approval, listing through moderation, rental through return, and an
//! escalated triage turn.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use tower::util::ServiceExt;

use haven::api::{self, AppState};
use haven_core::accounts::Accounts;
use haven_core::auth::Hs256Tokens;
use haven_core::events::EventBus;
use haven_core::model::AssetStatus;
use haven_core::moderation::ApproveAll;
use haven_core::rental::RentalEngine;
use haven_core::store::{HubStore, MemoryHost};
use haven_core::triage::{KeywordClassifier, OfflineModel, TriageService};

async fn test_app() -> (Router, Arc<HubStore>) {
    let store = Arc::new(HubStore::new(Arc::new(MemoryHost::new())));
    let tokens = Arc::new(Hs256Tokens::new("test-secret"));
    let events = EventBus::new();
    let accounts = Arc::new(Accounts::new(store.clone(), tokens.clone(), events.clone()));
    accounts
        .seed_admin("admin@hub.test", "operator secret")
        .await
        .unwrap();
    let rentals = Arc::new(RentalEngine::new(store.clone(), events.clone()));
    let triage = Arc::new(TriageService::new(
        store.clone(),
        Arc::new(OfflineModel),
        Arc::new(KeywordClassifier::default()),
        events.clone(),
    ));
    let app = api::router(AppState {
        store: store.clone(),
        accounts,
        rentals,
        triage,
        validator: Arc::new(ApproveAll),
        verifier: tokens,
        events,
    });
    (app, store)
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(serde_json::json!({ "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "login failed: {body}");
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn rental_lifecycle_end_to_end() {
    let (app, store) = test_app().await;
    let admin = login(&app, "admin@hub.test", "operator secret").await;

    // Register and approve the renter.
    let (status, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(serde_json::json!({
            "name": "A",
            "email": "a@x.com",
            "password": "long enough secret"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let renter_id = body["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/users/{renter_id}/approval"),
        Some(&admin),
        Some(serde_json::json!({ "approval": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let renter = login(&app, "a@x.com", "long enough secret").await;

    // List and approve the asset.
    let (status, body) = send(
        &app,
        "POST",
        "/assets",
        Some(&admin),
        Some(serde_json::json!({
            "name": "bike-1",
            "description": "city bike",
            "listing": { "kind": "rent", "daily_rate": 100 },
            "location": "Harare"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["moderation"], "pending");
    let asset_id = body["id"].as_str().unwrap().to_string();

    // Not visible in the marketplace until approved.
    let (_, listings) = send(&app, "GET", "/assets", Some(&renter), None).await;
    assert_eq!(listings.as_array().unwrap().len(), 0);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/assets/{asset_id}/moderation"),
        Some(&admin),
        Some(serde_json::json!({ "moderation": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Rent for three days at 100/day.
    let (status, transaction) = send(
        &app,
        "POST",
        &format!("/assets/{asset_id}/rent"),
        Some(&renter),
        Some(serde_json::json!({ "days": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(transaction["total_cost"], 300);
    assert_eq!(transaction["status"], "pending_approval");
    assert_eq!(transaction["deposit_held"], true);
    assert_eq!(transaction["asset_name"], "bike-1");
    let transaction_id = transaction["id"].as_str().unwrap().to_string();

    // The asset is occupied now; a second rental conflicts.
    let (status, _) = send(
        &app,
        "POST",
        &format!("/assets/{asset_id}/rent"),
        Some(&renter),
        Some(serde_json::json!({ "days": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Operator pipeline: dispatch, deliver, process the return.
    for (to, expect_deposit) in [("in_transit", true), ("active", true), ("returned", false)] {
        let (status, body) = send(
            &app,
            "PUT",
            &format!("/rentals/{transaction_id}/status"),
            Some(&admin),
            Some(serde_json::json!({ "status": to })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "transition to {to}: {body}");
        assert_eq!(body["status"], to);
        assert_eq!(body["deposit_held"], expect_deposit);
    }

    // The asset is available again.
    let doc = store.read().await.unwrap();
    assert_eq!(doc.assets[0].status, AssetStatus::Available);
    assert_eq!(doc.transactions.len(), 1);

    // And a renter sees their transaction history, newest first.
    let (_, history) = send(&app, "GET", "/rentals", Some(&renter), None).await;
    assert_eq!(history.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn escalated_triage_turns_reach_the_audit_log() {
    let (app, _) = test_app().await;
    let admin = login(&app, "admin@hub.test", "operator secret").await;

    // Register, approve and promote a nurse.
    let (_, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(serde_json::json!({
            "name": "Nurse Dee",
            "email": "dee@x.com",
            "password": "long enough secret"
        })),
    )
    .await;
    let nurse_id = body["id"].as_str().unwrap().to_string();
    send(
        &app,
        "PUT",
        &format!("/users/{nurse_id}/approval"),
        Some(&admin),
        Some(serde_json::json!({ "approval": "approved" })),
    )
    .await;
    send(
        &app,
        "PUT",
        &format!("/users/{nurse_id}/role"),
        Some(&admin),
        Some(serde_json::json!({ "role": "nurse" })),
    )
    .await;
    let nurse = login(&app, "dee@x.com", "long enough secret").await;

    // An ordinary turn leaves no trace.
    let (status, reply) = send(
        &app,
        "POST",
        "/triage/chat",
        Some(&admin),
        Some(serde_json::json!({ "message": "I feel great today" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["escalated"], false);

    // An escalated turn switches the persona and is audited, even though
    // the model behind this app always fails.
    let (status, reply) = send(
        &app,
        "POST",
        "/triage/chat",
        Some(&admin),
        Some(serde_json::json!({ "message": "I am bleeding badly" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["escalated"], true);
    assert_eq!(reply["switch_to_triage"], true);
    assert_eq!(reply["persona"], "nurse");

    let (status, log) = send(&app, "GET", "/triage/log", Some(&nurse), None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = log.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["escalated"], true);
    assert_eq!(entries[0]["saved"], true);

    // The nurse can prune the log.
    let entry_id = entries[0]["id"].as_str().unwrap().to_string();
    let (status, _) = send(
        &app,
        "DELETE",
        &format!("/triage/log/{entry_id}"),
        Some(&nurse),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, log) = send(&app, "GET", "/triage/log", Some(&nurse), None).await;
    assert_eq!(log.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn support_tickets_resolve_once() {
    let (app, _) = test_app().await;
    let admin = login(&app, "admin@hub.test", "operator secret").await;
    let (_, body) = send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(serde_json::json!({
            "name": "Chipo",
            "email": "chipo@x.com",
            "password": "long enough secret"
        })),
    )
    .await;
    let user_id = body["id"].as_str().unwrap().to_string();
    send(
        &app,
        "PUT",
        &format!("/users/{user_id}/approval"),
        Some(&admin),
        Some(serde_json::json!({ "approval": "approved" })),
    )
    .await;
    let user = login(&app, "chipo@x.com", "long enough secret").await;

    let (status, ticket) = send(
        &app,
        "POST",
        "/tickets",
        Some(&user),
        Some(serde_json::json!({
            "kind": "return",
            "subject": "damaged bag",
            "message": "the zip broke on arrival"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ticket["status"], "pending");
    assert_eq!(ticket["user_name"], "Chipo");
    let ticket_id = ticket["id"].as_str().unwrap().to_string();

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/tickets/{ticket_id}/reply"),
        Some(&admin),
        Some(serde_json::json!({ "reply": "replacement dispatched" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        "PUT",
        &format!("/tickets/{ticket_id}/reply"),
        Some(&admin),
        Some(serde_json::json!({ "reply": "again" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // The user sees their resolved ticket.
    let (_, tickets) = send(&app, "GET", "/tickets", Some(&user), None).await;
    assert_eq!(tickets[0]["status"], "resolved");
    assert_eq!(tickets[0]["admin_reply"], "replacement dispatched");
}
