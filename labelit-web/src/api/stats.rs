//! Statistics handlers
//!
//! Aggregate endpoints serve from the TTL cache inside the backend;
//! responses may be up to one TTL window stale.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TimelineQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    30
}

/// GET /api/stats
pub async fn stats_summary(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.backend.statistics().await?))
}

/// GET /api/stats/categories
pub async fn stats_categories(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.backend.category_statistics().await?))
}

/// GET /api/stats/languages
pub async fn stats_languages(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(state.backend.language_statistics().await?))
}

/// GET /api/stats/timeline?days=
pub async fn stats_timeline(
    State(state): State<AppState>,
    Query(query): Query<TimelineQuery>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.backend.activity_timeline(query.days).await?))
}

/// GET /api/stats/users/:username
pub async fn stats_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<Value>> {
    Ok(Json(state.backend.user_statistics(&username).await?))
}
