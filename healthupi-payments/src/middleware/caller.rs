//! Caller identity for patient-facing endpoints.
//!
//! Authentication happens in the hosted auth provider; the gateway in
//! front of this service forwards the verified user id in `X-User-ID`.
//! Webhook routes do not use this extractor.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";

#[derive(Debug, Clone)]
pub struct CallerContext {
    pub user_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(anyhow::anyhow!(
                    "Missing X-User-ID header (required from gateway)"
                ))
            })?;

        tracing::Span::current().record("user_id", user_id);

        Ok(CallerContext {
            user_id: user_id.to_string(),
        })
    }
}
