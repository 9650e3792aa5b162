//! Authentication extractors for the two caller kinds: users presenting a
//! bearer token and devices presenting their API key.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::{
    db::models::{Device, User},
    state::AppState,
};

use super::errors::ApiError;

/// Header carrying the device API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// The authenticated user behind a valid, unexpired bearer token.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized("missing bearer token"))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("missing bearer token"))?;

        let user_id = state
            .tokens
            .verify(token)
            .map_err(|_| ApiError::Unauthorized("could not validate credentials"))?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?
            .ok_or(ApiError::Unauthorized("could not validate credentials"))?;
        if !user.is_active {
            return Err(ApiError::Unauthorized("inactive user"));
        }

        Ok(Self(user))
    }
}

/// The device behind a valid `X-Api-Key` header. Handlers addressing a
/// specific device must still call [`ensure_device_matches`] so a key cannot
/// act on another device's resources.
pub struct AuthedDevice(pub Device);

impl FromRequestParts<AppState> for AuthedDevice {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized("missing API key"))?;

        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE api_key = $1")
            .bind(key)
            .fetch_optional(&state.pool)
            .await?
            .ok_or(ApiError::Unauthorized("invalid API key"))?;

        Ok(Self(device))
    }
}

/// Reject a request whose API key belongs to a different device than the one
/// it addresses.
pub fn ensure_device_matches(device: &Device, external_id: &str) -> Result<(), ApiError> {
    if device.device_id != external_id {
        return Err(ApiError::Unauthorized("API key does not match device"));
    }
    Ok(())
}
