pub mod bookings;
pub mod error;
pub mod extract;
pub mod items;
pub mod requests;
pub mod users;

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use chrono::{DateTime, NaiveDateTime};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::model::Ms;

use error::ApiError;

pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .merge(bookings::routes())
        .merge(items::routes())
        .merge(users::routes())
        .merge(requests::routes())
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn track_requests(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let op = format!("{} {route}", req.method());
    let start = Instant::now();

    let res = next.run(req).await;

    metrics::counter!(
        crate::observability::REQUESTS_TOTAL,
        "op" => op.clone(),
        "status" => res.status().as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!(crate::observability::REQUEST_DURATION_SECONDS, "op" => op)
        .record(start.elapsed().as_secs_f64());
    res
}

// ── Boundary time format ─────────────────────────────────

/// The wire format is ISO-8601 local date-time without timezone
/// (`2025-01-01T10:00:00`); the engine runs on unix milliseconds.
pub(crate) fn to_ms(dt: NaiveDateTime) -> Ms {
    dt.and_utc().timestamp_millis()
}

pub(crate) fn from_ms(ms: Ms) -> NaiveDateTime {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

// ── Boundary shape checks ────────────────────────────────

/// Length bound in characters, and non-blank. Violations are the boundary's
/// BadRequest class, not engine errors.
pub(crate) fn check_text(
    field: &'static str,
    value: &str,
    min: usize,
    max: usize,
) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} must not be blank")));
    }
    let len = value.chars().count();
    if len < min || len > max {
        return Err(ApiError::bad_request(format!(
            "{field} length must be within {min}..={max}, got {len}"
        )));
    }
    Ok(())
}

pub(crate) fn check_email(value: &str) -> Result<(), ApiError> {
    use crate::limits::EMAIL_MAX_LEN;
    if value.trim().is_empty() {
        return Err(ApiError::bad_request("email must not be blank"));
    }
    if value.chars().count() > EMAIL_MAX_LEN {
        return Err(ApiError::bad_request(format!(
            "email length must be at most {EMAIL_MAX_LEN}"
        )));
    }
    let valid = value
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
    if !valid {
        return Err(ApiError::bad_request("email must be a valid address"));
    }
    Ok(())
}
