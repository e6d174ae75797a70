use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::model::UserId;

use super::error::ApiError;

/// The caller-supplied identity header. A numeric user id ≥ 1; the trust
/// boundary is the deployment network, so no verification happens here.
pub const USER_ID_HEADER: &str = "X-Sharer-User-Id";

/// Identity extractor for every endpoint that acts on behalf of a user.
#[derive(Debug, Clone, Copy)]
pub struct SharerId(pub UserId);

impl<S> FromRequestParts<S> for SharerId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::bad_request(format!("missing {USER_ID_HEADER} header")))?;
        let id: UserId = raw
            .to_str()
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .filter(|id| *id >= 1)
            .ok_or_else(|| {
                ApiError::bad_request(format!("{USER_ID_HEADER} must be a positive integer"))
            })?;
        Ok(SharerId(id))
    }
}
