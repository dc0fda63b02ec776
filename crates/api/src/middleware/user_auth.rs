//! Bearer token authentication middleware.
//!
//! Tokens are issued by the university login service; this service only
//! verifies them and reads the user id from the subject claim.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shared::jwt::JwtVerifier;
use uuid::Uuid;

use crate::app::AppState;

/// Authenticated caller, stored in request extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAuth {
    pub user_id: Uuid,
}

impl UserAuth {
    /// Validates the bearer token found in `headers`.
    pub fn from_headers(verifier: &JwtVerifier, headers: &HeaderMap) -> Result<Self, String> {
        let token = bearer_token(headers).ok_or("Missing or invalid Authorization header")?;
        let user_id = verifier
            .verify_user_id(token)
            .map_err(|e| format!("Invalid token: {}", e))?;
        Ok(Self { user_id })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware that rejects requests without a valid bearer token.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match UserAuth::from_headers(&state.jwt, req.headers()) {
        Ok(auth) => {
            req.extensions_mut().insert(auth);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("Bearer authentication failed: {}", e);
            unauthorized_response("Invalid or expired token")
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "error": "UNAUTHORIZED",
            "message": message
        })),
    )
        .into_response()
}
