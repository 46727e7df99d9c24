//! HTTP API handlers for labelit-web

pub mod export;
pub mod health;
pub mod images;
pub mod labels;
pub mod stats;
pub mod users;

pub use export::{export_archive, export_spreadsheet};
pub use health::health_routes;
pub use images::{get_image, get_image_file, list_images, upload_image};
pub use labels::{create_label, list_labels};
pub use stats::{stats_categories, stats_languages, stats_summary, stats_timeline, stats_user};
pub use users::{login, register};
