//! Refresh-token vault and OAuth client.
//!
//! Refresh tokens are stored sealed (see [`TokenCipher`]) and opened only for
//! the duration of a single exchange. A provider `invalid_grant` clears the
//! stored credential and surfaces as [`CalendarError::OAuthRevoked`].

use std::time::Duration;

use domain::models::{OAuthIdentity, CALENDAR_PROVIDER_GOOGLE};
use domain::{CalendarError, SchedulingError};
use persistence::repositories::OAuthIdentityRepository;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use shared::crypto::{hmac_sha256_hex, verify_hmac_sha256_hex, TokenCipher};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::CalendarConfig;

/// Calendar scope requested at consent time.
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";

/// Source of short-lived access tokens for a user.
#[async_trait::async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self, user_id: Uuid) -> Result<String, CalendarError>;
}

/// Token endpoint reply.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Present on first consent and occasionally on rotation.
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
}

/// Userinfo endpoint reply.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// HTTP client for the provider's OAuth endpoints.
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    config: CalendarConfig,
}

impl OAuthClient {
    pub fn new(config: CalendarConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// Consent URL asking for offline calendar access.
    pub fn authorization_url(&self, state: &str) -> Result<Url, SchedulingError> {
        Url::parse_with_params(
            &self.config.oauth_auth_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", &format!("openid email {}", CALENDAR_SCOPE)),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("include_granted_scopes", "true"),
                ("state", state),
            ],
        )
        .map_err(|e| {
            SchedulingError::Configuration(format!("Invalid OAuth authorization URL: {}", e))
        })
    }

    /// Exchanges a refresh token for an access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, CalendarError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ])
        .await
    }

    /// Exchanges an authorization code from the consent redirect.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, CalendarError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.config.redirect_url),
            ("client_id", &self.config.client_id),
            ("client_secret", &self.config.client_secret),
        ])
        .await
    }

    pub async fn user_info(&self, access_token: &str) -> Result<UserInfo, CalendarError> {
        let response = self
            .http
            .get(&self.config.oauth_userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CalendarError::from_status(status.as_u16(), body));
        }
        response
            .json::<UserInfo>()
            .await
            .map_err(|e| CalendarError::Transient(format!("Malformed userinfo response: {}", e)))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, CalendarError> {
        let response = self
            .http
            .post(&self.config.oauth_token_url)
            .form(form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<TokenResponse>()
                .await
                .map_err(|e| CalendarError::Transient(format!("Malformed token response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        if is_invalid_grant(status, &body) {
            return Err(CalendarError::OAuthRevoked);
        }
        Err(CalendarError::from_status(status.as_u16(), body))
    }
}

fn is_invalid_grant(status: StatusCode, body: &str) -> bool {
    if status != StatusCode::BAD_REQUEST && status != StatusCode::UNAUTHORIZED {
        return false;
    }
    serde_json::from_str::<OAuthErrorBody>(body)
        .map(|b| b.error == "invalid_grant")
        .unwrap_or(false)
}

/// Maps a reqwest transport failure to a calendar error.
pub fn transport_error(err: reqwest::Error) -> CalendarError {
    if err.is_timeout() {
        CalendarError::Timeout
    } else {
        CalendarError::Transient(err.to_string())
    }
}

/// Signs OAuth `state` values as `<user_id>.<hex hmac>`.
#[derive(Clone)]
pub struct StateSigner {
    secret: String,
}

impl StateSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn sign(&self, user_id: Uuid) -> String {
        let user = user_id.to_string();
        format!("{}.{}", user, hmac_sha256_hex(&self.secret, &user))
    }

    pub fn verify(&self, state: &str) -> Result<Uuid, SchedulingError> {
        let (user, signature) = state
            .split_once('.')
            .ok_or_else(|| SchedulingError::validation("Malformed OAuth state"))?;
        if !verify_hmac_sha256_hex(&self.secret, user, signature) {
            return Err(SchedulingError::validation("OAuth state signature mismatch"));
        }
        Uuid::parse_str(user).map_err(|_| SchedulingError::validation("Malformed OAuth state"))
    }
}

/// Encrypted refresh-token storage with on-demand access-token exchange.
pub struct TokenVault {
    identities: OAuthIdentityRepository,
    cipher: TokenCipher,
    oauth: OAuthClient,
    state: StateSigner,
}

impl TokenVault {
    pub fn new(
        identities: OAuthIdentityRepository,
        cipher: TokenCipher,
        oauth: OAuthClient,
        state: StateSigner,
    ) -> Self {
        Self {
            identities,
            cipher,
            oauth,
            state,
        }
    }

    /// Google identity of a user, if one was ever connected.
    pub async fn identity(&self, user_id: Uuid) -> Result<Option<OAuthIdentity>, SchedulingError> {
        let entity = self
            .identities
            .find_by_user(user_id, CALENDAR_PROVIDER_GOOGLE)
            .await?;
        Ok(entity.map(Into::into))
    }

    /// Identity with usable credentials, or `NotConnected`.
    pub async fn connected_identity(&self, user_id: Uuid) -> Result<OAuthIdentity, CalendarError> {
        let identity = self
            .identities
            .find_by_user(user_id, CALENDAR_PROVIDER_GOOGLE)
            .await
            .map_err(|e| CalendarError::Storage(e.to_string()))?
            .map(OAuthIdentity::from);
        match identity {
            Some(identity) if identity.has_credentials() => Ok(identity),
            _ => Err(CalendarError::NotConnected(user_id)),
        }
    }

    /// Consent URL for a user.
    pub fn authorization_url(&self, user_id: Uuid) -> Result<String, SchedulingError> {
        let url = self.oauth.authorization_url(&self.state.sign(user_id))?;
        Ok(url.to_string())
    }

    /// Completes the consent flow and stores the sealed refresh token.
    pub async fn complete_connect(
        &self,
        code: &str,
        state: &str,
    ) -> Result<OAuthIdentity, SchedulingError> {
        let user_id = self.state.verify(state)?;
        let tokens = self.oauth.exchange_code(code).await?;
        let info = self.oauth.user_info(&tokens.access_token).await?;

        let sealed = tokens
            .refresh_token
            .as_deref()
            .map(|t| self.cipher.seal(t))
            .transpose()
            .map_err(|e| CalendarError::Storage(e.to_string()))?;

        let identity = self
            .identities
            .upsert(
                user_id,
                CALENDAR_PROVIDER_GOOGLE,
                &info.sub,
                info.email.as_deref(),
                sealed.as_deref(),
            )
            .await?;

        info!(
            user_id = %user_id,
            identity_id = %identity.id,
            new_refresh_token = sealed.is_some(),
            "Calendar connected"
        );
        Ok(identity.into())
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for TokenVault {
    async fn access_token(&self, user_id: Uuid) -> Result<String, CalendarError> {
        let identity = self.connected_identity(user_id).await?;
        let sealed = identity
            .refresh_token
            .as_deref()
            .ok_or(CalendarError::NotConnected(user_id))?;
        let refresh_token = self
            .cipher
            .open(sealed)
            .map_err(|e| CalendarError::Storage(e.to_string()))?;

        match self.oauth.refresh(&refresh_token).await {
            Ok(tokens) => {
                if let Some(rotated) = tokens.refresh_token.as_deref() {
                    if rotated != refresh_token {
                        let sealed = self
                            .cipher
                            .seal(rotated)
                            .map_err(|e| CalendarError::Storage(e.to_string()))?;
                        self.identities
                            .upsert(
                                user_id,
                                CALENDAR_PROVIDER_GOOGLE,
                                &identity.provider_user_id,
                                identity.email.as_deref(),
                                Some(&sealed),
                            )
                            .await
                            .map_err(|e| CalendarError::Storage(e.to_string()))?;
                    }
                }
                Ok(tokens.access_token)
            }
            Err(CalendarError::OAuthRevoked) => {
                warn!(user_id = %user_id, "Refresh token revoked; clearing credential");
                self.identities
                    .clear_token(identity.id)
                    .await
                    .map_err(|e| CalendarError::Storage(e.to_string()))?;
                metrics::counter!("calendar_credentials_revoked_total").increment(1);
                Err(CalendarError::OAuthRevoked)
            }
            Err(e) => Err(e),
        }
    }
}
