//! Export download handlers

use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use chrono::Utc;

use crate::error::ApiResult;
use crate::AppState;

/// GET /api/export/spreadsheet
pub async fn export_spreadsheet(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let bytes = state.backend.export_spreadsheet().await?;
    Ok(zip_response(
        format!("labelit-data-{}.zip", Utc::now().format("%Y%m%d")),
        bytes,
    ))
}

/// GET /api/export/archive
pub async fn export_archive(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let bytes = state.backend.export_archive().await?;
    Ok(zip_response(
        format!("labelit-images-{}.zip", Utc::now().format("%Y%m%d")),
        bytes,
    ))
}

fn zip_response(filename: String, bytes: Vec<u8>) -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    )
}
