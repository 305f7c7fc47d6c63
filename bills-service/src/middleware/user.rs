//! User context extraction.
//!
//! Every occurrence, override, and transaction row is scoped to a user,
//! and the API gateway forwards the authenticated user in the X-User-ID
//! header after validating the session. The service itself never sees
//! credentials; a request without the header is a routing mistake, not an
//! anonymous user.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use service_core::error::AppError;

/// Authenticated user a request acts on behalf of.
#[derive(Debug, Clone, Copy)]
pub struct UserContext {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!(
                    "Missing X-User-ID header (required from gateway)"
                ))
            })?;

        let user_id = Uuid::try_parse(raw)
            .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Invalid X-User-ID header")))?;

        let span = tracing::Span::current();
        span.record("user_id", raw);

        Ok(UserContext { user_id })
    }
}
