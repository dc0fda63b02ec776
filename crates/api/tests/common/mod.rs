//! Common test utilities for integration tests.
//!
//! Tests run against PostgreSQL when `TEST_DATABASE_URL` is set and return
//! early otherwise. Every test builds its own users, service and room, so
//! tests never share rows and no table is truncated.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use asesorias_api::app::{build_token_vault, create_app, AppState};
use asesorias_api::config::Config;
use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use chrono::{DateTime, Utc};
use domain::services::{CalendarGateway, MockCalendarGateway};
use fake::faker::name::en::Name;
use fake::Fake;
use jsonwebtoken::{encode, EncodingKey, Header};
use shared::time::FixedClock;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Shared secret of the HS256 tokens minted by [`token_for`].
pub const TEST_JWT_SECRET: &str = "test-jwt-secret";

/// Webhook secret from the embedded test configuration.
pub const TEST_WEBHOOK_SECRET: &str = "test-webhook-secret";

pub const TEST_TIMEZONE: &str = "America/La_Paz";

static MIGRATED: OnceCell<()> = OnceCell::const_new();

/// Database URL for integration tests, if configured.
pub fn test_database_url() -> Option<String> {
    std::env::var("TEST_DATABASE_URL")
        .ok()
        .filter(|url| !url.is_empty())
}

/// Connects and migrates, or returns `None` when no database is configured.
pub async fn create_test_pool() -> Option<PgPool> {
    let Some(url) = test_database_url() else {
        eprintln!("TEST_DATABASE_URL not set; skipping database test");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .expect("Failed to connect to test database");

    MIGRATED
        .get_or_init(|| async {
            persistence::db::run_migrations(&pool)
                .await
                .expect("Failed to run migrations");
        })
        .await;

    Some(pool)
}

/// Router plus handles on everything behind it.
pub struct TestContext {
    pub pool: PgPool,
    pub state: AppState,
    pub app: Router,
    pub calendar: Arc<MockCalendarGateway>,
}

impl TestContext {
    /// App with an in-memory calendar and a clock frozen at `now`.
    pub async fn at(now: DateTime<Utc>) -> Option<Self> {
        let pool = create_test_pool().await?;
        let url = test_database_url().unwrap_or_default();
        let config = Config::load_for_test(&[
            ("database.url", url.as_str()),
            ("scheduling.timezone", TEST_TIMEZONE),
        ])
        .expect("Failed to load test config");

        let calendar = Arc::new(MockCalendarGateway::new());
        let gateway: Arc<dyn CalendarGateway> = calendar.clone();
        let vault = Arc::new(build_token_vault(&config, &pool).expect("Failed to build vault"));
        let state = AppState::with_calendar(
            config,
            pool.clone(),
            vault,
            gateway,
            Arc::new(FixedClock(now)),
        )
        .expect("Failed to build app state");

        Some(Self {
            app: create_app(state.clone()),
            pool,
            state,
            calendar,
        })
    }
}

// =============================================================================
// Fixtures
// =============================================================================

#[derive(Debug, Clone)]
pub struct TestUser {
    pub user_id: Uuid,
    pub email: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct TestAdvisor {
    pub user: TestUser,
    pub advisor_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct TestTeacher {
    pub user: TestUser,
    pub teacher_id: Uuid,
}

pub fn unique_test_email() -> String {
    format!("test_{}@uni.example.test", Uuid::new_v4().simple())
}

/// HS256 bearer token for `user_id`, valid for one hour.
pub fn token_for(user_id: Uuid) -> String {
    let now = Utc::now().timestamp();
    encode(
        &Header::default(),
        &serde_json::json!({ "sub": user_id.to_string(), "iat": now, "exp": now + 3600 }),
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("Failed to sign test token")
}

pub async fn create_user(pool: &PgPool, is_admin: bool) -> TestUser {
    let email = unique_test_email();
    let display_name: String = Name().fake();
    let user_id: Uuid = sqlx::query_scalar(
        "INSERT INTO users (email, display_name, is_admin) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(&email)
    .bind(display_name)
    .bind(is_admin)
    .fetch_one(pool)
    .await
    .expect("Failed to create user");

    TestUser {
        user_id,
        token: token_for(user_id),
        email,
    }
}

pub async fn create_advisor(pool: &PgPool) -> TestAdvisor {
    let user = create_user(pool, false).await;
    let advisor_id: Uuid =
        sqlx::query_scalar("INSERT INTO advisor_profiles (user_id) VALUES ($1) RETURNING id")
            .bind(user.user_id)
            .fetch_one(pool)
            .await
            .expect("Failed to create advisor profile");
    TestAdvisor { user, advisor_id }
}

pub async fn create_teacher(pool: &PgPool) -> TestTeacher {
    let user = create_user(pool, false).await;
    let teacher_id: Uuid =
        sqlx::query_scalar("INSERT INTO teacher_profiles (user_id) VALUES ($1) RETURNING id")
            .bind(user.user_id)
            .fetch_one(pool)
            .await
            .expect("Failed to create teacher profile");
    TestTeacher { user, teacher_id }
}

/// Active service of `duration_minutes`, assigned to the advisor.
pub async fn create_service(pool: &PgPool, advisor: &TestAdvisor, duration_minutes: i32) -> Uuid {
    let service_id: Uuid = sqlx::query_scalar(
        "INSERT INTO services (name, duration_minutes) VALUES ($1, $2) RETURNING id",
    )
    .bind(format!("Tutoría {}", Uuid::new_v4().simple()))
    .bind(duration_minutes)
    .fetch_one(pool)
    .await
    .expect("Failed to create service");

    sqlx::query("INSERT INTO advisor_services (advisor_id, service_id) VALUES ($1, $2)")
        .bind(advisor.advisor_id)
        .bind(service_id)
        .execute(pool)
        .await
        .expect("Failed to assign service");

    service_id
}

/// Room in a fresh campus and building.
pub async fn create_resource(pool: &PgPool) -> Uuid {
    let campus_id: Uuid =
        sqlx::query_scalar("INSERT INTO campuses (name) VALUES ($1) RETURNING id")
            .bind("Campus Central")
            .fetch_one(pool)
            .await
            .expect("Failed to create campus");
    let building_id: Uuid = sqlx::query_scalar(
        "INSERT INTO buildings (campus_id, name) VALUES ($1, $2) RETURNING id",
    )
    .bind(campus_id)
    .bind("Edificio A")
    .fetch_one(pool)
    .await
    .expect("Failed to create building");

    sqlx::query_scalar("INSERT INTO resources (building_id, name) VALUES ($1, $2) RETURNING id")
        .bind(building_id)
        .bind(format!("Sala {}", Uuid::new_v4().simple()))
        .fetch_one(pool)
        .await
        .expect("Failed to create resource")
}

/// Stores a connected Google identity with a development plaintext token.
pub async fn connect_calendar(pool: &PgPool, user: &TestUser) {
    sqlx::query(
        r#"
        INSERT INTO oauth_identities (user_id, provider, provider_user_id, email, refresh_token)
        VALUES ($1, 'google', $2, $3, 'plain:test-refresh-token')
        "#,
    )
    .bind(user.user_id)
    .bind(format!("google-{}", user.user_id.simple()))
    .bind(&user.email)
    .execute(pool)
    .await
    .expect("Failed to connect calendar");
}

/// Everything needed to open and book slots for one advisor.
pub struct Scenario {
    pub advisor: TestAdvisor,
    pub teacher: TestTeacher,
    pub service_id: Uuid,
    pub resource_id: Uuid,
}

impl Scenario {
    pub async fn new(pool: &PgPool, duration_minutes: i32) -> Self {
        let advisor = create_advisor(pool).await;
        let teacher = create_teacher(pool).await;
        let service_id = create_service(pool, &advisor, duration_minutes).await;
        let resource_id = create_resource(pool).await;
        connect_calendar(pool, &advisor.user).await;
        Self {
            advisor,
            teacher,
            service_id,
            resource_id,
        }
    }

    /// Body for `POST /api/v1/slots` with a single dated rule.
    pub fn open_body(&self, date: &str, start: &str, end: &str, allow_conflicts: bool) -> serde_json::Value {
        serde_json::json!({
            "serviceId": self.service_id,
            "resourceId": self.resource_id,
            "timezone": TEST_TIMEZONE,
            "allowConflicts": allow_conflicts,
            "rules": [{ "date": date, "startTime": start, "endTime": end }]
        })
    }
}

pub async fn slot_state(pool: &PgPool, slot_id: Uuid) -> String {
    sqlx::query_scalar("SELECT state::text FROM slots WHERE id = $1")
        .bind(slot_id)
        .fetch_one(pool)
        .await
        .expect("Slot not found")
}

pub async fn appointment_state(pool: &PgPool, appointment_id: Uuid) -> String {
    sqlx::query_scalar("SELECT state::text FROM appointments WHERE id = $1")
        .bind(appointment_id)
        .fetch_one(pool)
        .await
        .expect("Appointment not found")
}

pub async fn linked_event_id(pool: &PgPool, appointment_id: Uuid) -> Option<String> {
    sqlx::query_scalar("SELECT provider_event_id FROM calendar_links WHERE appointment_id = $1")
        .bind(appointment_id)
        .fetch_optional(pool)
        .await
        .expect("Failed to read calendar link")
}

// =============================================================================
// Request helpers
// =============================================================================

pub fn json_request_with_auth(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn get_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub fn post_request_with_auth(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}

pub fn uuid_field(json: &serde_json::Value, field: &str) -> Uuid {
    json[field]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("Missing {} in {}", field, json))
}
