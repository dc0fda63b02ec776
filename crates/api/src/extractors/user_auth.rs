//! Authenticated user extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use domain::models::UserRef;
use persistence::repositories::CatalogRepository;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::UserAuth as UserAuthData;

/// The caller's user id, from middleware or straight from the bearer token.
#[derive(Debug, Clone, Copy)]
pub struct UserAuth {
    pub user_id: Uuid,
}

impl From<UserAuthData> for UserAuth {
    fn from(data: UserAuthData) -> Self {
        Self {
            user_id: data.user_id,
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for UserAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts.extensions.get::<UserAuthData>() {
            return Ok((*auth).into());
        }

        UserAuthData::from_headers(&state.jwt, &parts.headers)
            .map(Into::into)
            .map_err(|e| {
                tracing::debug!("Bearer authentication failed: {}", e);
                ApiError::Unauthorized("Invalid or expired token".to_string())
            })
    }
}

/// An authenticated caller flagged as administrator.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    pub user: UserRef,
}

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = UserAuth::from_request_parts(parts, state).await?;

        let user = CatalogRepository::new(state.pool.clone())
            .find_user(auth.user_id)
            .await?
            .map(UserRef::from)
            .filter(|u| u.is_admin)
            .ok_or_else(|| {
                ApiError::Scheduling(domain::SchedulingError::forbidden(
                    "Administrator role required",
                ))
            })?;

        Ok(AdminAuth { user })
    }
}
