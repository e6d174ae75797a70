use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::limits::*;
use crate::model::{User, UserId};

use super::error::ApiError;
use super::{check_email, check_text};

pub fn routes() -> Router<Arc<Engine>> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{user_id}",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

#[derive(Debug, Deserialize)]
pub struct UserCreateRequest {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct UserUpdateRequest {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

impl From<User> for UserResponse {
    fn from(value: User) -> Self {
        let User { id, name, email } = value;
        Self { id, name, email }
    }
}

async fn list_users(State(engine): State<Arc<Engine>>) -> Json<Vec<UserResponse>> {
    Json(engine.list_users().into_iter().map(Into::into).collect())
}

async fn get_user(
    State(engine): State<Arc<Engine>>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserResponse>, ApiError> {
    Ok(Json(engine.user_by_id(user_id)?.into()))
}

async fn create_user(
    State(engine): State<Arc<Engine>>,
    Json(req): Json<UserCreateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    check_text("name", &req.name, USER_NAME_MIN_LEN, USER_NAME_MAX_LEN)?;
    check_email(&req.email)?;
    let user = engine.create_user(req.name, req.email).await?;
    Ok(Json(user.into()))
}

async fn update_user(
    State(engine): State<Arc<Engine>>,
    Path(user_id): Path<UserId>,
    Json(req): Json<UserUpdateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    if let Some(ref name) = req.name {
        check_text("name", name, USER_NAME_MIN_LEN, USER_NAME_MAX_LEN)?;
    }
    if let Some(ref email) = req.email {
        check_email(email)?;
    }
    let user = engine.update_user(user_id, req.name, req.email).await?;
    Ok(Json(user.into()))
}

async fn delete_user(
    State(engine): State<Arc<Engine>>,
    Path(user_id): Path<UserId>,
) -> Result<(), ApiError> {
    engine.delete_user(user_id).await?;
    Ok(())
}
