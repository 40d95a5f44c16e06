use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use tracing::warn;

use super::{claims::Claims, jwt::TokenError};
use crate::{error::AppError, state::AppState};

/// Extracts and validates the bearer JWT, yielding its claims.
pub struct AuthUser(pub Claims);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or(AppError::Unauthorized("Missing Authorization header"))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or(AppError::Unauthorized("Invalid Authorization header"))?;

        let claims = state.auth.keys()?.validate(token).map_err(|e| {
            warn!(error = %e, "bearer token rejected");
            match e {
                TokenError::Expired => AppError::Unauthorized("Token expired"),
                TokenError::Invalid => AppError::Unauthorized("Invalid token"),
            }
        })?;

        Ok(AuthUser(claims))
    }
}
