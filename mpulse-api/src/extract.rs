//! Caller identity extraction
//!
//! Authentication itself happens upstream (gateway / reverse proxy);
//! this service trusts the `X-Owner-Id` header it is handed and only
//! checks that it carries a well-formed UUID.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;

/// Header carrying the authenticated caller's user id
pub const OWNER_ID_HEADER: &str = "x-owner-id";

/// Authenticated owner identity for the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for OwnerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(OWNER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-Owner-Id header".to_string()))?;

        let owner_id = Uuid::parse_str(raw)
            .map_err(|_| ApiError::Unauthorized("X-Owner-Id must be a UUID".to_string()))?;

        Ok(OwnerId(owner_id))
    }
}
