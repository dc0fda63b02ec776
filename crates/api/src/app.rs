use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use domain::services::CalendarGateway;
use domain::CalendarError;
use persistence::repositories::OAuthIdentityRepository;
use shared::crypto::{CryptoError, TokenCipher};
use shared::jwt::{JwtError, JwtVerifier};
use shared::time::{Clock, SystemClock};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, require_user_auth, trace_id};
use crate::routes::{admin, appointments, calendar, health, slots};
use crate::services::{
    AccessTokenSource, GoogleCalendarClient, OAuthClient, ReservationManager, SlotGenerator,
    StateSigner, TokenVault, WatchManager, WebhookReconciler,
};

/// Failures while wiring the application at start-up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("JWT verifier: {0}")]
    Jwt(#[from] JwtError),

    #[error("Token vault key: {0}")]
    Crypto(#[from] CryptoError),

    #[error("OAuth HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Calendar client: {0}")]
    Calendar(#[from] CalendarError),
}

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtVerifier>,
    pub slots: Arc<SlotGenerator>,
    pub reservations: Arc<ReservationManager>,
    pub reconciler: Arc<WebhookReconciler>,
    pub watches: Arc<WatchManager>,
    pub vault: Arc<TokenVault>,
}

impl AppState {
    /// Production wiring: Google Calendar backed by the token vault.
    pub fn build(config: Config, pool: PgPool) -> Result<Self, StartupError> {
        let vault = Arc::new(build_token_vault(&config, &pool)?);
        let tokens: Arc<dyn AccessTokenSource> = vault.clone();
        let calendar: Arc<dyn CalendarGateway> = Arc::new(GoogleCalendarClient::new(
            &config.calendar,
            config.timezone(),
            tokens,
        )?);
        Self::with_calendar(config, pool, vault, calendar, Arc::new(SystemClock))
    }

    /// Wiring with an explicit calendar gateway and clock.
    pub fn with_calendar(
        config: Config,
        pool: PgPool,
        vault: Arc<TokenVault>,
        calendar: Arc<dyn CalendarGateway>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StartupError> {
        let jwt = if config.auth.jwt_public_key.is_empty() {
            JwtVerifier::from_secret(&config.auth.jwt_secret, config.auth.leeway_secs)?
        } else {
            JwtVerifier::from_rsa_pem(&config.auth.jwt_public_key, config.auth.leeway_secs)?
        };
        let timezone = config.timezone();

        let slots = SlotGenerator::new(
            pool.clone(),
            calendar.clone(),
            clock.clone(),
            timezone,
            config.scheduling.find_slots_limit,
        );
        let reservations =
            ReservationManager::new(pool.clone(), calendar.clone(), clock.clone(), timezone);
        let reconciler = WebhookReconciler::new(
            pool.clone(),
            calendar.clone(),
            clock.clone(),
            config.calendar.webhook_secret.clone(),
        );
        let watches = WatchManager::new(pool.clone(), calendar, clock, &config.calendar);

        Ok(Self {
            pool,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            slots: Arc::new(slots),
            reservations: Arc::new(reservations),
            reconciler: Arc::new(reconciler),
            watches: Arc::new(watches),
            vault,
        })
    }
}

/// Token vault with its OAuth client and key material from configuration.
pub fn build_token_vault(config: &Config, pool: &PgPool) -> Result<TokenVault, StartupError> {
    let cipher = TokenCipher::from_settings(
        config.token_vault.encryption_key.as_deref(),
        config.token_vault.allow_plaintext,
    )?;
    Ok(TokenVault::new(
        OAuthIdentityRepository::new(pool.clone()),
        cipher,
        OAuthClient::new(config.calendar.clone())?,
        StateSigner::new(config.calendar.webhook_secret.clone()),
    ))
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    let cors = if config.security.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    // Bearer-authenticated routes; roles are resolved inside the services.
    let protected_routes = Router::new()
        .route(
            "/api/v1/slots",
            post(slots::open_slots).get(slots::find_slots),
        )
        .route("/api/v1/slots/check-conflicts", post(slots::check_conflicts))
        .route(
            "/api/v1/slots/:slot_id",
            patch(slots::edit_slot).delete(slots::delete_slot),
        )
        .route(
            "/api/v1/slots/:slot_id/reactivate",
            post(slots::reactivate_slot),
        )
        .route("/api/v1/appointments", post(appointments::reserve))
        .route(
            "/api/v1/appointments/pending/advisor",
            get(appointments::pending_for_advisor),
        )
        .route(
            "/api/v1/appointments/pending/teacher",
            get(appointments::pending_for_teacher),
        )
        .route(
            "/api/v1/appointments/:appointment_id/confirm",
            post(appointments::confirm),
        )
        .route(
            "/api/v1/appointments/:appointment_id/decline",
            post(appointments::decline),
        )
        .route(
            "/api/v1/appointments/:appointment_id/cancel",
            post(appointments::cancel),
        )
        .route("/api/v1/calendar/connect", get(calendar::connect))
        .route("/api/v1/calendar/watch", post(calendar::ensure_watch))
        .route("/api/v1/admin/sweep", post(admin::sweep))
        .route(
            "/api/v1/admin/calendar/watch-all",
            post(admin::watch_all),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    // Provider-facing routes authenticate through channel tokens or signed state.
    let provider_routes = Router::new()
        .route("/api/v1/calendar/webhook", post(calendar::webhook))
        .route(
            "/api/v1/calendar/oauth/callback",
            get(calendar::oauth_callback),
        );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(provider_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
