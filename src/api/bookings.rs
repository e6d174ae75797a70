use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::engine::{Engine, EngineError};
use crate::model::{BookingId, BookingInfo, BookingStatus, ItemId};

use super::error::ApiError;
use super::extract::SharerId;
use super::users::UserResponse;
use super::{from_ms, to_ms};

pub fn routes() -> Router<Arc<Engine>> {
    Router::new()
        .route("/bookings", get(list_by_booker).post(create_booking))
        .route("/bookings/owner", get(list_by_owner))
        .route("/bookings/{booking_id}", get(get_booking).patch(decide_booking))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreateRequest {
    pub item_id: ItemId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
pub struct DecideParams {
    pub approved: bool,
}

#[derive(Debug, Deserialize)]
pub struct StateParams {
    #[serde(default = "default_state")]
    pub state: String,
}

fn default_state() -> String {
    "ALL".to_string()
}

#[derive(Debug, Serialize)]
pub struct ItemBriefResponse {
    pub id: ItemId,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub id: BookingId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub item: ItemBriefResponse,
    pub booker: UserResponse,
    pub status: BookingStatus,
}

/// Resolve the item and booker references a booking carries. Ids are
/// resolved through the stores at access time, never embedded.
fn booking_response(engine: &Engine, info: BookingInfo) -> Result<BookingResponse, ApiError> {
    let item = engine
        .get_item(info.item_id)
        .ok_or(EngineError::NotFound { entity: "item", id: info.item_id })?;
    let booker = engine
        .get_user(info.booker_id)
        .ok_or(EngineError::NotFound { entity: "user", id: info.booker_id })?;
    Ok(BookingResponse {
        id: info.id,
        start: from_ms(info.start),
        end: from_ms(info.end),
        item: ItemBriefResponse { id: item.id, name: item.name },
        booker: booker.into(),
        status: info.status,
    })
}

async fn create_booking(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Json(req): Json<BookingCreateRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    let info = engine
        .create_booking(user_id, req.item_id, to_ms(req.start), to_ms(req.end))
        .await?;
    Ok((StatusCode::CREATED, Json(booking_response(&engine, info)?)))
}

async fn decide_booking(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Path(booking_id): Path<BookingId>,
    Query(params): Query<DecideParams>,
) -> Result<Json<BookingResponse>, ApiError> {
    let info = engine
        .decide_booking(user_id, booking_id, params.approved)
        .await?;
    Ok(Json(booking_response(&engine, info)?))
}

async fn get_booking(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Path(booking_id): Path<BookingId>,
) -> Result<Json<BookingResponse>, ApiError> {
    let info = engine.booking_by_id(user_id, booking_id).await?;
    Ok(Json(booking_response(&engine, info)?))
}

async fn list_by_booker(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Query(params): Query<StateParams>,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let infos = engine.bookings_by_booker(user_id, &params.state).await?;
    infos
        .into_iter()
        .map(|info| booking_response(&engine, info))
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}

async fn list_by_owner(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Query(params): Query<StateParams>,
) -> Result<Json<Vec<BookingResponse>>, ApiError> {
    let infos = engine.bookings_by_owner(user_id, &params.state).await?;
    infos
        .into_iter()
        .map(|info| booking_response(&engine, info))
        .collect::<Result<Vec<_>, _>>()
        .map(Json)
}
