use chrono_tz::Tz;
use persistence::db::PoolSettings;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Bearer token verification
    pub auth: AuthConfig,
    pub scheduling: SchedulingConfig,
    /// Calendar provider and OAuth client settings
    pub calendar: CalendarConfig,
    pub token_vault: TokenVaultConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            url: self.url.clone(),
            max_connections: self.max_connections,
            min_connections: self.min_connections,
            connect_timeout_secs: self.connect_timeout_secs,
            idle_timeout_secs: self.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// RSA public key (PEM) of the login service, RS256
    #[serde(default)]
    pub jwt_public_key: String,

    /// Shared HS256 secret, development only
    #[serde(default)]
    pub jwt_secret: String,

    /// Leeway in seconds for clock skew tolerance
    #[serde(default = "default_jwt_leeway")]
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulingConfig {
    /// Civil timezone used when a request carries none
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_backfill_interval")]
    pub calendar_backfill_interval_secs: u64,

    #[serde(default = "default_backfill_batch_size")]
    pub calendar_backfill_batch_size: i64,

    /// Upper bound of rows returned by slot searches
    #[serde(default = "default_find_slots_limit")]
    pub find_slots_limit: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_calendar_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_oauth_auth_url")]
    pub oauth_auth_url: String,

    #[serde(default = "default_oauth_token_url")]
    pub oauth_token_url: String,

    #[serde(default = "default_oauth_userinfo_url")]
    pub oauth_userinfo_url: String,

    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub client_secret: String,

    /// Where the provider redirects after consent
    #[serde(default)]
    pub redirect_url: String,

    /// Public base URL the provider posts webhook notifications to
    #[serde(default)]
    pub public_base_url: String,

    /// Secret for channel tokens and OAuth state signatures
    #[serde(default)]
    pub webhook_secret: String,

    #[serde(default = "default_channel_ttl")]
    pub channel_ttl_secs: i64,

    #[serde(default = "default_renew_margin")]
    pub renew_margin_secs: i64,

    #[serde(default = "default_calendar_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_watch_renewal_interval")]
    pub watch_renewal_interval_secs: u64,
}

impl CalendarConfig {
    pub fn webhook_callback_url(&self) -> String {
        format!(
            "{}/api/v1/calendar/webhook",
            self.public_base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenVaultConfig {
    /// `production` enforces an encryption key
    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default)]
    pub encryption_key: Option<String>,

    #[serde(default)]
    pub allow_plaintext: bool,
}

impl TokenVaultConfig {
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_jwt_leeway() -> u64 {
    30
}
fn default_timezone() -> String {
    "America/Mexico_City".to_string()
}
fn default_sweep_interval() -> u64 {
    300
}
fn default_backfill_interval() -> u64 {
    600
}
fn default_backfill_batch_size() -> i64 {
    25
}
fn default_find_slots_limit() -> i64 {
    500
}
fn default_calendar_api_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}
fn default_oauth_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}
fn default_oauth_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_oauth_userinfo_url() -> String {
    "https://openidconnect.googleapis.com/v1/userinfo".to_string()
}
fn default_channel_ttl() -> i64 {
    604_800 // 7 days
}
fn default_renew_margin() -> i64 {
    3600
}
fn default_calendar_timeout() -> u64 {
    20
}
fn default_watch_renewal_interval() -> u64 {
    3600
}
fn default_environment() -> String {
    "development".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with ASESORIAS__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("ASESORIAS").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Defaults are embedded so tests do not depend on config files.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""
            max_connections = 20
            min_connections = 5
            connect_timeout_secs = 10
            idle_timeout_secs = 600

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []

            [auth]
            jwt_secret = "test-jwt-secret"
            leeway_secs = 30

            [scheduling]
            timezone = "America/Mexico_City"
            sweep_interval_secs = 300
            calendar_backfill_interval_secs = 600
            calendar_backfill_batch_size = 25
            find_slots_limit = 500

            [calendar]
            client_id = "test-client"
            client_secret = "test-client-secret"
            redirect_url = "http://localhost:8080/api/v1/calendar/oauth/callback"
            public_base_url = "https://asesorias.example.test"
            webhook_secret = "test-webhook-secret"
            channel_ttl_secs = 604800
            renew_margin_secs = 3600
            request_timeout_secs = 20
            watch_renewal_interval_secs = 3600

            [token_vault]
            environment = "test"
            allow_plaintext = true
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        // Validation is left to the caller so tests can build partial configs.
        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "ASESORIAS__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if shared::time::parse_timezone(&self.scheduling.timezone).is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "Unknown scheduling timezone: {}",
                self.scheduling.timezone
            )));
        }

        if self.auth.jwt_public_key.is_empty() && self.auth.jwt_secret.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "auth.jwt_public_key or auth.jwt_secret must be set".to_string(),
            ));
        }

        if self.token_vault.is_production() {
            let has_key = self
                .token_vault
                .encryption_key
                .as_deref()
                .is_some_and(|k| !k.is_empty());
            if !has_key {
                return Err(ConfigValidationError::MissingRequired(
                    "token_vault.encryption_key is required in production".to_string(),
                ));
            }
            if self.token_vault.allow_plaintext {
                return Err(ConfigValidationError::InvalidValue(
                    "token_vault.allow_plaintext cannot be enabled in production".to_string(),
                ));
            }
        }

        if self.calendar.channel_ttl_secs <= self.calendar.renew_margin_secs {
            return Err(ConfigValidationError::InvalidValue(
                "calendar.channel_ttl_secs must exceed calendar.renew_margin_secs".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured civil timezone.
    ///
    /// Falls back to UTC only for configs that skipped validation.
    pub fn timezone(&self) -> Tz {
        shared::time::parse_timezone(&self.scheduling.timezone).unwrap_or(Tz::UTC)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}
