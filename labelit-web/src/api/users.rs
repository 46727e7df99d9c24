//! User registration and login handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiResult;
use crate::AppState;
use labelit_common::db::models::UserPublic;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub preferred_language: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// POST /api/users/register
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    let guid = state
        .backend
        .register_user(
            &request.username,
            &request.password,
            &request.preferred_language,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "guid": guid,
            "username": request.username.trim(),
            "preferred_language": request.preferred_language,
        })),
    ))
}

/// POST /api/users/login
///
/// Returns the sanitized user record; password material never appears in
/// a response.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<UserPublic>> {
    let user = state
        .backend
        .authenticate(&request.username, &request.password)
        .await?;
    Ok(Json(UserPublic::from(user)))
}
