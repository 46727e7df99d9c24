//! Image upload, feed, and file serving handlers

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use crate::backend::{ImageFilters, UploadRequest};
use crate::error::{ApiError, ApiResult};
use crate::AppState;
use labelit_common::db::models::Image;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub language: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
}

/// POST /api/images
///
/// Multipart form: `file` plus `title`, `category`, `user_id`, optional
/// `description`, `latitude`, `longitude`.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<Image>)> {
    let mut bytes: Option<Vec<u8>> = None;
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut category: Option<String> = None;
    let mut user_id: Option<String> = None;
    let mut latitude: Option<f64> = None;
    let mut longitude: Option<f64> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("could not read file part: {}", e)))?;
                bytes = Some(data.to_vec());
            }
            "title" => title = Some(text_field(field, "title").await?),
            "description" => description = Some(text_field(field, "description").await?),
            "category" => category = Some(text_field(field, "category").await?),
            "user_id" => user_id = Some(text_field(field, "user_id").await?),
            "latitude" => latitude = Some(float_field(field, "latitude").await?),
            "longitude" => longitude = Some(float_field(field, "longitude").await?),
            other => {
                return Err(ApiError::BadRequest(format!(
                    "unexpected form field: {}",
                    other
                )));
            }
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::BadRequest("missing file part".to_string()))?;
    let title = title.ok_or_else(|| ApiError::BadRequest("missing title field".to_string()))?;
    let category =
        category.ok_or_else(|| ApiError::BadRequest("missing category field".to_string()))?;
    let user_id =
        user_id.ok_or_else(|| ApiError::BadRequest("missing user_id field".to_string()))?;

    let coordinates = match (latitude, longitude) {
        (Some(lat), Some(lon)) => Some((lat, lon)),
        (None, None) => None,
        _ => {
            return Err(ApiError::BadRequest(
                "latitude and longitude must be provided together".to_string(),
            ));
        }
    };

    let image = state
        .backend
        .upload_image(UploadRequest {
            bytes,
            title,
            description,
            category,
            uploader_id: user_id,
            coordinates,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(image)))
}

/// GET /api/images
pub async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Image>>> {
    let filters = ImageFilters {
        category: query.category.filter(|s| !s.is_empty()),
        language: query.language.filter(|s| !s.is_empty()),
        search: query.search.filter(|s| !s.is_empty()),
        limit: query.limit,
    };
    Ok(Json(state.backend.list_images(&filters).await?))
}

/// GET /api/images/:id
pub async fn get_image(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> ApiResult<Json<Image>> {
    Ok(Json(state.backend.image(&image_id).await?))
}

/// GET /api/images/:id/file
///
/// Serves the stored (compressed) JPEG bytes.
pub async fn get_image_file(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let bytes = state.backend.image_file(&image_id).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}

async fn text_field(field: axum::extract::multipart::Field<'_>, name: &str) -> ApiResult<String> {
    field
        .text()
        .await
        .map_err(|e| ApiError::BadRequest(format!("could not read {} field: {}", name, e)))
}

async fn float_field(field: axum::extract::multipart::Field<'_>, name: &str) -> ApiResult<f64> {
    let text = text_field(field, name).await?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| ApiError::BadRequest(format!("{} must be a number, got '{}'", name, text)))
}
