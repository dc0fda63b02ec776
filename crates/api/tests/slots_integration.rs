//! Integration tests for slot opening, search and conflict handling.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{TimeZone, Utc};
use common::{
    create_advisor, create_resource, create_service, create_teacher, get_request_with_auth,
    json_request_with_auth, parse_response_body, slot_state, uuid_field, Scenario, TestContext,
    TEST_TIMEZONE,
};
use domain::errors::exclusion_conflict;
use domain::models::RemoteEvent;
use domain::ErrorKind;
use persistence::repositories::SlotRepository;
use uuid::Uuid;
use serde_json::json;
use tower::ServiceExt;

fn morning_of_first() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, 12, 0, 0).unwrap()
}

/// Opening body for the scenario's service in another room.
fn open_body_in(
    scenario: &Scenario,
    resource_id: Uuid,
    date: &str,
    start: &str,
    end: &str,
    allow_conflicts: bool,
) -> serde_json::Value {
    let mut body = scenario.open_body(date, start, end, allow_conflicts);
    body["resourceId"] = json!(resource_id);
    body
}

#[tokio::test]
async fn test_open_slots_segments_window_by_service_duration() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-01", "09:00", "10:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = parse_response_body(response).await;
    assert_eq!(body["createdSlots"], 3);
    assert_eq!(body["skipped"], 0);
    let slots = body["slots"].as_array().unwrap();
    assert_eq!(slots[0]["start"], "2025-09-01T09:00:00-04:00");
    assert_eq!(slots[2]["end"], "2025-09-01T10:30:00-04:00");
    assert!(slots.iter().all(|s| s["state"] == "OPEN"));

    // Visible to teachers in the search.
    let uri = format!(
        "/api/v1/slots?serviceId={}&resourceId={}&fromDate=2025-09-01&toDate=2025-09-01&timezone={}",
        scenario.service_id, scenario.resource_id, TEST_TIMEZONE
    );
    let response = ctx
        .app
        .clone()
        .oneshot(get_request_with_auth(&uri, &scenario.teacher.user.token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    let found = body["data"].as_array().unwrap();
    assert_eq!(found.len(), 3);
    assert_eq!(found[1]["start"], "2025-09-01T09:30:00-04:00");
}

#[tokio::test]
async fn test_open_slots_drops_trailing_partial_segment() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 40).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-03", "09:00", "10:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = parse_response_body(response).await;
    assert_eq!(body["createdSlots"], 2);
}

#[tokio::test]
async fn test_open_slots_conflict_rejects_then_skips_with_allow() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-04", "09:00", "09:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let existing = parse_response_body(response).await;
    let existing_id = existing["slots"][0]["id"].as_str().unwrap().to_string();

    // Overlaps the existing slot: nothing is written.
    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-04", "09:00", "10:00", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "RESOURCE_BUSY");
    let conflicts = body["extra"]["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["slotId"], existing_id.as_str());

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-04", "09:00", "10:00", true),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = parse_response_body(response).await;
    assert_eq!(body["createdSlots"], 1);
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["slots"][0]["start"], "2025-09-04T09:30:00-04:00");
}

#[tokio::test]
async fn test_open_slots_requires_advisor_profile() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;
    let teacher = create_teacher(&ctx.pool).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-05", "09:00", "10:00", false),
        &teacher.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "NO_ADVISOR_PROFILE");
}

#[tokio::test]
async fn test_open_slots_rejects_inverted_window() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-05", "11:00", "10:00", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "VALIDATION");
}

#[tokio::test]
async fn test_open_slots_without_token_is_unauthorized() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };

    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/v1/slots")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(json!({}).to_string()))
        .unwrap();
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_edit_reactivate_and_delete_slot() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-08", "09:00", "09:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    let body = parse_response_body(response).await;
    let slot_id = uuid_field(&body["slots"][0], "id");

    // Moving the start recomputes the end from the service duration.
    let request = json_request_with_auth(
        Method::PATCH,
        &format!("/api/v1/slots/{}", slot_id),
        json!({ "startTime": "11:00" }),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["start"], "2025-09-08T11:00:00-04:00");
    assert_eq!(body["end"], "2025-09-08T11:30:00-04:00");

    // Reactivating an OPEN slot is not a transition.
    let request = json_request_with_auth(
        Method::POST,
        &format!("/api/v1/slots/{}/reactivate", slot_id),
        json!({}),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "STATE_FORBIDDEN");

    // Another advisor cannot delete it.
    let other = Scenario::new(&ctx.pool, 30).await;
    let request = json_request_with_auth(
        Method::DELETE,
        &format!("/api/v1/slots/{}", slot_id),
        json!({}),
        &other.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_ne!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(slot_state(&ctx.pool, slot_id).await, "OPEN");

    let request = json_request_with_auth(
        Method::DELETE,
        &format!("/api/v1/slots/{}", slot_id),
        json!({}),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_check_conflicts_reports_busy_calendar_events() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;
    let remote = |id: &str, start_hour: u32, end_hour: u32| RemoteEvent {
        id: id.to_string(),
        status: Some("confirmed".into()),
        summary: Some("Consejo académico".into()),
        html_link: None,
        start: Some(Utc.with_ymd_and_hms(2025, 9, 9, start_hour, 30, 0).unwrap()),
        end: Some(Utc.with_ymd_and_hms(2025, 9, 9, end_hour, 30, 0).unwrap()),
        attendees: Vec::new(),
    };
    ctx.calendar.insert_event(remote("overlapping", 13, 14));
    ctx.calendar.insert_event(remote("afternoon", 18, 19));

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots/check-conflicts",
        json!({
            "timezone": TEST_TIMEZONE,
            "rules": [{ "date": "2025-09-09", "startTime": "09:00", "endTime": "10:00" }]
        }),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    let conflicts = body["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["eventId"], "overlapping");
    assert_eq!(conflicts[0]["start"], "2025-09-09T09:30:00-04:00");
}

// ============================================================================
// Advisor-scope conflicts
// ============================================================================

#[tokio::test]
async fn test_open_slots_in_another_room_clashes_with_advisor() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;
    let second_room = create_resource(&ctx.pool).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-10", "09:00", "10:00", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = parse_response_body(response).await;
    let busy_id = body["slots"][1]["id"].as_str().unwrap().to_string();

    // Free room, busy advisor: 09:30-10:00 collides, 10:00-10:30 does not.
    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        open_body_in(&scenario, second_room, "2025-09-10", "09:30", "10:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "ADVISOR_TIME_CLASH");
    let conflicts = body["extra"]["conflicts"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["slotId"], busy_id.as_str());

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM slots WHERE resource_id = $1")
        .bind(second_room)
        .fetch_one(&ctx.pool)
        .await
        .unwrap();
    assert_eq!(count, 0);

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        open_body_in(&scenario, second_room, "2025-09-10", "09:30", "10:30", true),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = parse_response_body(response).await;
    assert_eq!(body["createdSlots"], 1);
    assert_eq!(body["skipped"], 1);
    assert_eq!(body["slots"][0]["start"], "2025-09-10T10:00:00-04:00");
}

#[tokio::test]
async fn test_edit_slot_onto_own_busy_time_clashes() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;
    let second_room = create_resource(&ctx.pool).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-11", "09:00", "09:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        open_body_in(&scenario, second_room, "2025-09-11", "11:00", "11:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let moved = uuid_field(&parse_response_body(response).await["slots"][0], "id");

    let request = json_request_with_auth(
        Method::PATCH,
        &format!("/api/v1/slots/{}", moved),
        json!({ "startTime": "09:00" }),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "ADVISOR_TIME_CLASH");

    let start: chrono::DateTime<Utc> =
        sqlx::query_scalar("SELECT start_time FROM slots WHERE id = $1")
            .bind(moved)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(start, Utc.with_ymd_and_hms(2025, 9, 11, 15, 0, 0).unwrap());
}

#[tokio::test]
async fn test_store_rejects_advisor_overlap_across_rooms() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;
    let second_room = create_resource(&ctx.pool).await;

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        scenario.open_body("2025-09-12", "09:00", "09:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        open_body_in(&scenario, second_room, "2025-09-12", "11:00", "11:30", false),
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    let moved = uuid_field(&parse_response_body(response).await["slots"][0], "id");

    // Bypass the pre-check: the exclusion constraint still holds.
    let start = Utc.with_ymd_and_hms(2025, 9, 12, 13, 0, 0).unwrap();
    let mut conn = ctx.pool.acquire().await.unwrap();
    let err = SlotRepository::update_schedule(
        &mut *conn,
        moved,
        start,
        start + chrono::Duration::minutes(30),
        None,
    )
    .await
    .unwrap_err();
    assert_eq!(exclusion_conflict(err).kind(), ErrorKind::AdvisorTimeClash);
}

#[tokio::test]
async fn test_open_slots_for_unassigned_service_is_forbidden() {
    let Some(ctx) = TestContext::at(morning_of_first()).await else {
        return;
    };
    let scenario = Scenario::new(&ctx.pool, 30).await;
    let colleague = create_advisor(&ctx.pool).await;
    let foreign_service = create_service(&ctx.pool, &colleague, 30).await;

    let mut body = scenario.open_body("2025-09-15", "09:00", "10:00", false);
    body["serviceId"] = json!(foreign_service);
    let request = json_request_with_auth(
        Method::POST,
        "/api/v1/slots",
        body,
        &scenario.advisor.user.token,
    );
    let response = ctx.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "SERVICE_NOT_ASSIGNED");
}
