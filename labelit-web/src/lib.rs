//! labelit-web library - HTTP service for the image labeling platform

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use serde_json::Value;
use sqlx::SqlitePool;

use labelit_common::{Config, Result, TtlCache};

pub mod api;
pub mod backend;
pub mod error;
pub mod export;
pub mod geolocation;
pub mod imaging;
pub mod store;

use backend::Backend;
use geolocation::GeoResolver;
use imaging::ImageProcessor;
use store::ImageStore;

/// Slack for multipart boundaries and text fields on top of the image itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<Backend>,
    pub max_upload_bytes: usize,
}

/// Assemble the backend service from a connected pool and configuration
pub fn build_state(config: &Config, pool: SqlitePool) -> Result<AppState> {
    let store = ImageStore::open(&config.images_dir())?;
    let processor = ImageProcessor::new(config);
    let geo = GeoResolver::new(config);
    let cache: TtlCache<String, Value> =
        TtlCache::new(std::time::Duration::from_secs(config.cache_ttl_secs));

    Ok(AppState {
        backend: Arc::new(Backend::new(pool, store, processor, geo, cache)),
        max_upload_bytes: config.max_upload_bytes as usize,
    })
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let body_limit = DefaultBodyLimit::max(state.max_upload_bytes + MULTIPART_OVERHEAD);

    Router::new()
        .route("/api/users/register", post(api::register))
        .route("/api/users/login", post(api::login))
        .route("/api/images", post(api::upload_image).get(api::list_images))
        .route("/api/images/:id", get(api::get_image))
        .route("/api/images/:id/file", get(api::get_image_file))
        .route(
            "/api/images/:id/labels",
            post(api::create_label).get(api::list_labels),
        )
        .route("/api/stats", get(api::stats_summary))
        .route("/api/stats/categories", get(api::stats_categories))
        .route("/api/stats/languages", get(api::stats_languages))
        .route("/api/stats/timeline", get(api::stats_timeline))
        .route("/api/stats/users/:username", get(api::stats_user))
        .route("/api/export/spreadsheet", get(api::export_spreadsheet))
        .route("/api/export/archive", get(api::export_archive))
        .merge(api::health_routes())
        .layer(body_limit)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
