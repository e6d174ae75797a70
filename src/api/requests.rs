use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::limits::*;
use crate::model::{ItemBrief, ItemId, RequestId, RequestView, UserId};

use super::error::ApiError;
use super::extract::SharerId;
use super::{check_text, from_ms};

pub fn routes() -> Router<Arc<Engine>> {
    Router::new()
        .route("/requests", get(list_own_requests).post(create_request))
        .route("/requests/all", get(list_other_requests))
        .route("/requests/{request_id}", get(get_request))
}

#[derive(Debug, Deserialize)]
pub struct RequestCreateRequest {
    pub description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestItemResponse {
    pub id: ItemId,
    pub name: String,
    pub owner_id: UserId,
}

impl From<ItemBrief> for RequestItemResponse {
    fn from(value: ItemBrief) -> Self {
        Self {
            id: value.id,
            name: value.name,
            owner_id: value.owner_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub id: RequestId,
    pub description: String,
    pub created: NaiveDateTime,
    pub items: Vec<RequestItemResponse>,
}

impl From<RequestView> for RequestResponse {
    fn from(value: RequestView) -> Self {
        let RequestView { request, items } = value;
        Self {
            id: request.id,
            description: request.description,
            created: from_ms(request.created_at),
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

async fn create_request(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Json(req): Json<RequestCreateRequest>,
) -> Result<Json<RequestResponse>, ApiError> {
    check_text(
        "description",
        &req.description,
        REQUEST_DESCRIPTION_MIN_LEN,
        REQUEST_DESCRIPTION_MAX_LEN,
    )?;
    let request = engine.create_request(user_id, req.description).await?;
    let view = engine.request_by_id(user_id, request.id)?;
    Ok(Json(view.into()))
}

async fn list_own_requests(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    let views = engine.requests_by_user(user_id)?;
    Ok(Json(views.into_iter().map(Into::into).collect()))
}

async fn list_other_requests(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
) -> Result<Json<Vec<RequestResponse>>, ApiError> {
    let views = engine.requests_of_others(user_id)?;
    Ok(Json(views.into_iter().map(Into::into).collect()))
}

async fn get_request(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Path(request_id): Path<RequestId>,
) -> Result<Json<RequestResponse>, ApiError> {
    Ok(Json(engine.request_by_id(user_id, request_id)?.into()))
}
