//! Integration tests for admin operation endpoints.
//!
//! Covers the lifecycle sweep and admin-only access.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::{TimeZone, Utc};
use common::{
    appointment_state, create_user, json_request_with_auth, parse_response_body,
    post_request_with_auth, slot_state, uuid_field, Scenario, TestContext,
};
use serde_json::json;
use tower::ServiceExt;

// ============================================================================
// Sweep
// ============================================================================

#[tokio::test]
async fn test_sweep_expires_open_and_realizes_reserved_slots() {
    // Slots live on a date no other test books, so the global sweep only
    // touches this test's rows.
    let Some(before) = TestContext::at(Utc.with_ymd_and_hms(2025, 7, 31, 12, 0, 0).unwrap()).await
    else {
        return;
    };
    let scenario = Scenario::new(&before.pool, 30).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-08-01", "09:00", "10:00", false),
        &scenario.advisor.user.token,
    );
    let response = before.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = parse_response_body(response).await;
    let reserved_slot = uuid_field(&body["slots"][0], "id");
    let open_slot = uuid_field(&body["slots"][1], "id");

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/appointments",
        json!({ "slotId": reserved_slot }),
        &scenario.teacher.user.token,
    );
    let response = before.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let appointment_id = uuid_field(&parse_response_body(response).await, "id");

    // 11:00 local, after both slots ended.
    let after = TestContext::at(Utc.with_ymd_and_hms(2025, 8, 1, 15, 0, 0).unwrap())
        .await
        .unwrap();
    let admin = create_user(&after.pool, true).await;

    let response = after
        .app
        .clone()
        .oneshot(post_request_with_auth("/api/v1/admin/sweep", &admin.token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let report = parse_response_body(response).await;
    assert!(report["expired"].as_i64().unwrap() >= 1);
    assert!(report["realized"].as_i64().unwrap() >= 1);
    assert!(report["completedAppointments"].as_i64().unwrap() >= 1);

    assert_eq!(slot_state(&after.pool, open_slot).await, "EXPIRED");
    assert_eq!(slot_state(&after.pool, reserved_slot).await, "REALIZED");
    assert_eq!(appointment_state(&after.pool, appointment_id).await, "COMPLETED");

    // Terminal states stay put on the next pass.
    let report = after.state.reservations.sweep().await.unwrap();
    assert_eq!(report.realized, 0);
    assert_eq!(slot_state(&after.pool, reserved_slot).await, "REALIZED");
}

// ============================================================================
// Access
// ============================================================================

#[tokio::test]
async fn test_sweep_requires_admin() {
    let Some(ctx) = TestContext::at(Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()).await
    else {
        return;
    };
    let user = create_user(&ctx.pool, false).await;

    let response = ctx
        .app
        .clone()
        .oneshot(post_request_with_auth("/api/v1/admin/sweep", &user.token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = ctx
        .app
        .clone()
        .oneshot(post_request_with_auth(
            "/api/v1/admin/calendar/watch-all",
            &user.token,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_sweep_without_token_is_unauthorized() {
    let Some(ctx) = TestContext::at(Utc.with_ymd_and_hms(2025, 7, 1, 12, 0, 0).unwrap()).await
    else {
        return;
    };

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/admin/sweep")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v1/admin/sweep")
        .header("Authorization", "Bearer not-a-jwt")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_reports_database_and_calendar() {
    let Some(ctx) = TestContext::at(Utc::now()).await else {
        return;
    };

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert!(body["calendar"].is_object());
}
