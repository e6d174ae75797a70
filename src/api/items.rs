use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::limits::*;
use crate::model::{BookingBrief, BookingId, CommentId, CommentView, ItemId, ItemView, RequestId};

use super::error::ApiError;
use super::extract::SharerId;
use super::{check_text, from_ms};

pub fn routes() -> Router<Arc<Engine>> {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/search", get(search_items))
        .route(
            "/items/{item_id}",
            get(get_item).patch(update_item).delete(delete_item),
        )
        .route("/items/{item_id}/comment", post(create_comment))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCreateRequest {
    pub name: String,
    pub description: String,
    pub available: bool,
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub available: Option<bool>,
    pub request_id: Option<RequestId>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentCreateRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingBriefResponse {
    pub id: BookingId,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl From<BookingBrief> for BookingBriefResponse {
    fn from(value: BookingBrief) -> Self {
        Self {
            id: value.id,
            start: from_ms(value.start),
            end: from_ms(value.end),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: CommentId,
    pub text: String,
    pub author_name: String,
    pub created: NaiveDateTime,
}

impl From<CommentView> for CommentResponse {
    fn from(value: CommentView) -> Self {
        Self {
            id: value.id,
            text: value.text,
            author_name: value.author_name,
            created: from_ms(value.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_booking: Option<BookingBriefResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_booking: Option<BookingBriefResponse>,
    pub comments: Vec<CommentResponse>,
}

impl From<ItemView> for ItemResponse {
    fn from(value: ItemView) -> Self {
        let ItemView { item, last_booking, next_booking, comments } = value;
        Self {
            id: item.id,
            name: item.name,
            description: item.description,
            available: item.available,
            request_id: item.request_id,
            last_booking: last_booking.map(Into::into),
            next_booking: next_booking.map(Into::into),
            comments: comments.into_iter().map(Into::into).collect(),
        }
    }
}

async fn list_items(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
) -> Result<Json<Vec<ItemResponse>>, ApiError> {
    let views = engine.items_by_owner(user_id).await?;
    Ok(Json(views.into_iter().map(Into::into).collect()))
}

async fn search_items(
    SharerId(_user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Query(params): Query<SearchParams>,
) -> Json<Vec<ItemResponse>> {
    let views = engine.search_items(&params.text).await;
    Json(views.into_iter().map(Into::into).collect())
}

async fn get_item(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Path(item_id): Path<ItemId>,
) -> Result<Json<ItemResponse>, ApiError> {
    Ok(Json(engine.item_by_id(user_id, item_id).await?.into()))
}

async fn create_item(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ItemCreateRequest>,
) -> Result<Json<ItemResponse>, ApiError> {
    check_text("name", &req.name, ITEM_NAME_MIN_LEN, ITEM_NAME_MAX_LEN)?;
    check_text(
        "description",
        &req.description,
        ITEM_DESCRIPTION_MIN_LEN,
        ITEM_DESCRIPTION_MAX_LEN,
    )?;
    let item = engine
        .create_item(user_id, req.name, req.description, req.available, req.request_id)
        .await?;
    let view = engine.item_by_id(user_id, item.id).await?;
    Ok(Json(view.into()))
}

async fn update_item(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Path(item_id): Path<ItemId>,
    Json(req): Json<ItemUpdateRequest>,
) -> Result<Json<ItemResponse>, ApiError> {
    if let Some(ref name) = req.name {
        check_text("name", name, ITEM_NAME_MIN_LEN, ITEM_NAME_MAX_LEN)?;
    }
    if let Some(ref description) = req.description {
        check_text(
            "description",
            description,
            ITEM_DESCRIPTION_MIN_LEN,
            ITEM_DESCRIPTION_MAX_LEN,
        )?;
    }
    let item = engine
        .update_item(user_id, item_id, req.name, req.description, req.available, req.request_id)
        .await?;
    let view = engine.item_by_id(user_id, item.id).await?;
    Ok(Json(view.into()))
}

async fn delete_item(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Path(item_id): Path<ItemId>,
) -> Result<(), ApiError> {
    engine.delete_item(user_id, item_id).await?;
    Ok(())
}

async fn create_comment(
    SharerId(user_id): SharerId,
    State(engine): State<Arc<Engine>>,
    Path(item_id): Path<ItemId>,
    Json(req): Json<CommentCreateRequest>,
) -> Result<(StatusCode, Json<CommentResponse>), ApiError> {
    check_text("text", &req.text, COMMENT_TEXT_MIN_LEN, COMMENT_TEXT_MAX_LEN)?;
    let comment = engine.create_comment(user_id, item_id, req.text).await?;
    Ok((StatusCode::CREATED, Json(comment.into())))
}
