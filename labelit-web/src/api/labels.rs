//! Label handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::backend::LabelRequest;
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use labelit_common::db::models::Label;

#[derive(Debug, Deserialize)]
pub struct CreateLabelRequest {
    pub user_id: String,
    pub text: String,
    pub language: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// POST /api/images/:id/labels
pub async fn create_label(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    Json(request): Json<CreateLabelRequest>,
) -> ApiResult<(StatusCode, Json<Label>)> {
    let coordinates = match (request.latitude, request.longitude) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "latitude and longitude must be provided together".to_string(),
            ));
        }
    };

    let label = state
        .backend
        .create_label(LabelRequest {
            image_id,
            user_id: request.user_id,
            text: request.text,
            language: request.language,
            coordinates,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(label)))
}

/// GET /api/images/:id/labels
pub async fn list_labels(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> ApiResult<Json<Vec<Label>>> {
    Ok(Json(state.backend.image_labels(&image_id).await?))
}
