//! Database models

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A registered user
///
/// `password_hash`/`password_salt` stay out of API responses; handlers
/// convert to [`UserPublic`] before serializing.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub guid: String,
    pub username: String,
    pub password_hash: String,
    pub password_salt: String,
    pub preferred_language: String,
    pub created_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
    pub is_active: bool,
}

/// User record with credentials stripped, safe to serialize outward
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserPublic {
    pub guid: String,
    pub username: String,
    pub preferred_language: String,
    pub created_at: NaiveDateTime,
    pub last_login: Option<NaiveDateTime>,
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            guid: user.guid,
            username: user.username,
            preferred_language: user.preferred_language,
            created_at: user.created_at,
            last_login: user.last_login,
        }
    }
}

/// An uploaded image
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Image {
    pub guid: String,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    /// File name inside the image store (UUID-derived, not a full path)
    pub file_path: String,
    pub uploaded_by: String,
    pub uploaded_at: NaiveDateTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub location_method: Option<String>,
    pub file_size: Option<i64>,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub label_count: i64,
}

/// A label attached to an image
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Label {
    pub id: i64,
    pub image_id: String,
    pub user_id: String,
    pub text: String,
    pub language: String,
    pub added_at: NaiveDateTime,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub country: Option<String>,
}

/// A row in the derived analytics event log
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalyticsEvent {
    pub id: i64,
    pub event_type: String,
    pub user_id: Option<String>,
    pub image_id: Option<String>,
    pub label_id: Option<i64>,
    pub metadata: Option<String>,
    pub created_at: NaiveDateTime,
}
