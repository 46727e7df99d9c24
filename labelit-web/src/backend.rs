//! Backend service: sole gateway to persistent state
//!
//! Every durable read and write goes through [`Backend`]; the HTTP layer
//! never touches the pool or the image store directly. Each write is one
//! transaction, committed before the call returns. Nothing here retries:
//! transient failures surface to the caller.

use crate::geolocation::{GeoResolver, ResolvedLocation};
use crate::imaging::ImageProcessor;
use crate::store::ImageStore;
use labelit_common::db::models::{AnalyticsEvent, Image, Label, User};
use labelit_common::{lang, Error, Result, TtlCache};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

/// Upload request assembled by the HTTP layer
#[derive(Debug)]
pub struct UploadRequest {
    pub bytes: Vec<u8>,
    pub title: String,
    pub description: Option<String>,
    pub category: String,
    pub uploader_id: String,
    /// Manual coordinates from the client, if provided
    pub coordinates: Option<(f64, f64)>,
}

/// Label creation request
#[derive(Debug)]
pub struct LabelRequest {
    pub image_id: String,
    pub user_id: String,
    pub text: String,
    pub language: String,
    pub coordinates: Option<(f64, f64)>,
}

/// Image feed filters
#[derive(Debug, Default)]
pub struct ImageFilters {
    pub category: Option<String>,
    /// Only images carrying at least one label in this language
    pub language: Option<String>,
    /// Substring match over title, description, and label text
    pub search: Option<String>,
    pub limit: Option<i64>,
}

/// Aggregate platform statistics
#[derive(Debug, Serialize)]
struct StatsSummary {
    total_images: i64,
    total_labels: i64,
    total_users: i64,
    languages_used: i64,
    avg_labels_per_image: f64,
    recent_images: i64,
    recent_labels: i64,
}

const DEFAULT_FEED_LIMIT: i64 = 50;
const MAX_FEED_LIMIT: i64 = 500;
const MAX_TIMELINE_DAYS: i64 = 365;

pub struct Backend {
    db: SqlitePool,
    store: ImageStore,
    processor: ImageProcessor,
    geo: GeoResolver,
    /// Bounded-staleness cache for aggregate statistics
    stats_cache: TtlCache<String, Value>,
}

impl Backend {
    pub fn new(
        db: SqlitePool,
        store: ImageStore,
        processor: ImageProcessor,
        geo: GeoResolver,
        stats_cache: TtlCache<String, Value>,
    ) -> Self {
        Self {
            db,
            store,
            processor,
            geo,
            stats_cache,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    // ========================================
    // Users
    // ========================================

    /// Register a new user; returns the new user's guid
    pub async fn register_user(
        &self,
        username: &str,
        password: &str,
        preferred_language: &str,
    ) -> Result<String> {
        let username = username.trim();
        let password = password.trim();

        validate_username(username)?;
        if password.len() < 3 {
            return Err(Error::InvalidInput(
                "password must be at least 3 characters".to_string(),
            ));
        }
        if !lang::is_supported(preferred_language) {
            return Err(Error::InvalidInput(format!(
                "unsupported language code: {}",
                preferred_language
            )));
        }

        let guid = Uuid::new_v4().to_string();
        let salt = generate_salt();
        let hash = hash_password(password, &salt);

        let result = sqlx::query(
            r#"
            INSERT INTO users (guid, username, password_hash, password_salt, preferred_language)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&guid)
        .bind(username)
        .bind(&hash)
        .bind(&salt)
        .bind(preferred_language)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::DuplicateUser(username.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        info!("Registered user '{}'", username);
        self.log_event(
            "user_registered",
            Some(&guid),
            None,
            None,
            Some(json!({ "language": preferred_language })),
        )
        .await;

        Ok(guid)
    }

    /// Verify credentials; updates `last_login` on success
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let user: Option<User> =
            sqlx::query_as("SELECT * FROM users WHERE username = ? AND is_active = 1")
                .bind(username.trim())
                .fetch_optional(&self.db)
                .await?;

        let user = user.ok_or(Error::AuthenticationFailed)?;
        if hash_password(password.trim(), &user.password_salt) != user.password_hash {
            return Err(Error::AuthenticationFailed);
        }

        sqlx::query("UPDATE users SET last_login = CURRENT_TIMESTAMP WHERE guid = ?")
            .bind(&user.guid)
            .execute(&self.db)
            .await?;

        self.log_event("user_login", Some(&user.guid), None, None, None)
            .await;

        Ok(user)
    }

    // ========================================
    // Images
    // ========================================

    /// Validate, compress, store, and record an uploaded image
    ///
    /// The file is written before the row insert; a failed insert removes
    /// the file again so a failed upload leaves nothing behind.
    pub async fn upload_image(&self, request: UploadRequest) -> Result<Image> {
        let title = validate_text(&request.title, 100, "title")?;
        let category = validate_text(&request.category, 50, "category")?;
        let description = match &request.description {
            Some(d) if !d.trim().is_empty() => Some(validate_text(d, 500, "description")?),
            _ => None,
        };
        if let Some((latitude, longitude)) = request.coordinates {
            validate_coordinates(latitude, longitude)?;
        }

        if !self.user_exists(&request.uploader_id).await? {
            return Err(Error::NotFound(format!("user {}", request.uploader_id)));
        }

        // All validation and compression happens before any file write, so
        // a rejected upload cannot orphan a file
        let processed = self.processor.process(&request.bytes)?;

        let location = self.geo.resolve(request.coordinates).await;

        let guid = Uuid::new_v4().to_string();
        let file_name = self.store.generate_name();
        self.store.write(&file_name, &processed.bytes)?;

        let insert = sqlx::query(
            r#"
            INSERT INTO images (
                guid, title, description, category, file_path, uploaded_by,
                latitude, longitude, city, country, location_method,
                file_size, width, height
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&guid)
        .bind(&title)
        .bind(&description)
        .bind(&category)
        .bind(&file_name)
        .bind(&request.uploader_id)
        .bind(location.as_ref().map(|l| l.latitude))
        .bind(location.as_ref().map(|l| l.longitude))
        .bind(location.as_ref().and_then(|l| l.city.clone()))
        .bind(location.as_ref().and_then(|l| l.country.clone()))
        .bind(location.as_ref().map(|l| l.method.clone()))
        .bind(processed.bytes.len() as i64)
        .bind(processed.width as i64)
        .bind(processed.height as i64)
        .execute(&self.db)
        .await;

        if let Err(e) = insert {
            // Undo the file write so the store matches the database
            if let Err(remove_err) = self.store.remove(&file_name) {
                warn!("Could not remove orphaned file {}: {}", file_name, remove_err);
            }
            return Err(e.into());
        }

        info!(
            "Stored image {} ({} bytes, {}x{})",
            guid,
            processed.bytes.len(),
            processed.width,
            processed.height
        );
        self.log_event(
            "image_uploaded",
            Some(&request.uploader_id),
            Some(&guid),
            None,
            Some(json!({
                "category": category,
                "file_size": processed.bytes.len(),
                "has_location": location.is_some(),
            })),
        )
        .await;

        self.image(&guid).await
    }

    /// Fetch one image record
    pub async fn image(&self, image_id: &str) -> Result<Image> {
        sqlx::query_as("SELECT * FROM images WHERE guid = ?")
            .bind(image_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::NotFound(format!("image {}", image_id)))
    }

    /// Read the stored file bytes for an image
    pub async fn image_file(&self, image_id: &str) -> Result<Vec<u8>> {
        let image = self.image(image_id).await?;
        self.store.read(&image.file_path)
    }

    /// List images with optional filters, newest first
    pub async fn list_images(&self, filters: &ImageFilters) -> Result<Vec<Image>> {
        let mut sql = String::from(
            "SELECT DISTINCT i.* FROM images i \
             LEFT JOIN labels l ON l.image_id = i.guid WHERE 1=1",
        );
        if filters.category.is_some() {
            sql.push_str(" AND i.category = ?");
        }
        if filters.language.is_some() {
            sql.push_str(" AND l.language = ?");
        }
        if filters.search.is_some() {
            sql.push_str(" AND (i.title LIKE ? OR i.description LIKE ? OR l.text LIKE ?)");
        }
        sql.push_str(" ORDER BY i.uploaded_at DESC, i.guid LIMIT ?");

        let limit = filters
            .limit
            .unwrap_or(DEFAULT_FEED_LIMIT)
            .clamp(1, MAX_FEED_LIMIT);

        let mut query = sqlx::query_as::<_, Image>(&sql);
        if let Some(category) = &filters.category {
            query = query.bind(category.clone());
        }
        if let Some(language) = &filters.language {
            query = query.bind(language.clone());
        }
        if let Some(search) = &filters.search {
            let pattern = format!("%{}%", search);
            query = query.bind(pattern.clone()).bind(pattern.clone()).bind(pattern);
        }
        Ok(query.bind(limit).fetch_all(&self.db).await?)
    }

    // ========================================
    // Labels
    // ========================================

    /// Attach a label to an image
    ///
    /// Labels are append-only; re-posting an identical (image, text,
    /// language) triple is rejected. Geolocation failure never fails the
    /// labeling action.
    pub async fn create_label(&self, request: LabelRequest) -> Result<Label> {
        let text = validate_text(&request.text, 100, "label text")?;
        if !lang::is_supported(&request.language) {
            return Err(Error::InvalidInput(format!(
                "unsupported language code: {}",
                request.language
            )));
        }
        if let Some((latitude, longitude)) = request.coordinates {
            validate_coordinates(latitude, longitude)?;
        }

        if !self.image_exists(&request.image_id).await? {
            return Err(Error::NotFound(format!("image {}", request.image_id)));
        }
        if !self.user_exists(&request.user_id).await? {
            return Err(Error::NotFound(format!("user {}", request.user_id)));
        }

        let location: Option<ResolvedLocation> = self.geo.resolve(request.coordinates).await;

        // Label insert and counter maintenance commit together
        let mut tx = self.db.begin().await?;

        let insert = sqlx::query(
            r#"
            INSERT INTO labels (image_id, user_id, text, language, latitude, longitude, city, country)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.image_id)
        .bind(&request.user_id)
        .bind(&text)
        .bind(&request.language)
        .bind(location.as_ref().map(|l| l.latitude))
        .bind(location.as_ref().map(|l| l.longitude))
        .bind(location.as_ref().and_then(|l| l.city.clone()))
        .bind(location.as_ref().and_then(|l| l.country.clone()))
        .execute(&mut *tx)
        .await;

        let label_id = match insert {
            Ok(result) => result.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::InvalidInput(format!(
                    "label '{}' ({}) already exists on this image",
                    text, request.language
                )));
            }
            Err(e) => return Err(e.into()),
        };

        sqlx::query(
            "UPDATE images SET label_count = (SELECT COUNT(*) FROM labels WHERE image_id = ?) \
             WHERE guid = ?",
        )
        .bind(&request.image_id)
        .bind(&request.image_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.log_event(
            "label_added",
            Some(&request.user_id),
            Some(&request.image_id),
            Some(label_id),
            Some(json!({
                "language": request.language,
                "text_length": text.chars().count(),
            })),
        )
        .await;

        sqlx::query_as("SELECT * FROM labels WHERE id = ?")
            .bind(label_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| Error::Internal(format!("label {} vanished after insert", label_id)))
    }

    /// All labels on an image, newest first
    pub async fn image_labels(&self, image_id: &str) -> Result<Vec<Label>> {
        if !self.image_exists(image_id).await? {
            return Err(Error::NotFound(format!("image {}", image_id)));
        }
        Ok(
            sqlx::query_as("SELECT * FROM labels WHERE image_id = ? ORDER BY added_at DESC, id DESC")
                .bind(image_id)
                .fetch_all(&self.db)
                .await?,
        )
    }

    // ========================================
    // Statistics (TTL-cached aggregations)
    // ========================================

    /// Platform-wide summary statistics
    pub async fn statistics(&self) -> Result<Value> {
        let key = "summary".to_string();
        if let Some(cached) = self.stats_cache.get(&key) {
            return Ok(cached);
        }

        let total_images: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.db)
            .await?;
        let total_labels: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM labels")
            .fetch_one(&self.db)
            .await?;
        let total_users: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE is_active = 1")
                .fetch_one(&self.db)
                .await?;
        let languages_used: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT language) FROM labels")
                .fetch_one(&self.db)
                .await?;
        let avg: Option<f64> = sqlx::query_scalar(
            "SELECT AVG(label_count) FROM images WHERE label_count > 0",
        )
        .fetch_one(&self.db)
        .await?;
        let recent_images: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM images WHERE uploaded_at > datetime('now', '-7 days')",
        )
        .fetch_one(&self.db)
        .await?;
        let recent_labels: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM labels WHERE added_at > datetime('now', '-7 days')",
        )
        .fetch_one(&self.db)
        .await?;

        let summary = StatsSummary {
            total_images,
            total_labels,
            total_users,
            languages_used,
            avg_labels_per_image: (avg.unwrap_or(0.0) * 100.0).round() / 100.0,
            recent_images,
            recent_labels,
        };
        let value = serde_json::to_value(summary)
            .map_err(|e| Error::Internal(format!("stats serialization: {}", e)))?;
        self.stats_cache.insert(key, value.clone());
        Ok(value)
    }

    /// Image counts per category, descending
    pub async fn category_statistics(&self) -> Result<Value> {
        self.counted_statistic(
            "categories",
            "SELECT category AS key, COUNT(*) AS count FROM images \
             GROUP BY category ORDER BY count DESC, key",
        )
        .await
    }

    /// Label counts per language, descending, with display names
    pub async fn language_statistics(&self) -> Result<Value> {
        let key = "languages".to_string();
        if let Some(cached) = self.stats_cache.get(&key) {
            return Ok(cached);
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT language AS key, COUNT(*) AS count FROM labels \
             GROUP BY language ORDER BY count DESC, key",
        )
        .fetch_all(&self.db)
        .await?;

        let value = Value::Array(
            rows.into_iter()
                .map(|(code, count)| {
                    json!({
                        "key": code,
                        "name": lang::display_name(&code),
                        "count": count,
                    })
                })
                .collect(),
        );
        self.stats_cache.insert(key, value.clone());
        Ok(value)
    }

    /// Upload counts per day over the trailing window
    pub async fn activity_timeline(&self, days: i64) -> Result<Value> {
        let days = days.clamp(1, MAX_TIMELINE_DAYS);
        let key = format!("timeline:{}", days);
        if let Some(cached) = self.stats_cache.get(&key) {
            return Ok(cached);
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT DATE(uploaded_at) AS date, COUNT(*) AS uploads FROM images \
             WHERE uploaded_at > datetime('now', '-' || ? || ' days') \
             GROUP BY DATE(uploaded_at) ORDER BY date",
        )
        .bind(days)
        .fetch_all(&self.db)
        .await?;

        let value = Value::Array(
            rows.into_iter()
                .map(|(date, uploads)| json!({ "date": date, "uploads": uploads }))
                .collect(),
        );
        self.stats_cache.insert(key, value.clone());
        Ok(value)
    }

    /// Per-user contribution statistics (uncached; always fresh)
    pub async fn user_statistics(&self, username: &str) -> Result<Value> {
        let guid: Option<String> = sqlx::query_scalar("SELECT guid FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        let guid = guid.ok_or_else(|| Error::NotFound(format!("user {}", username)))?;

        let images_uploaded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE uploaded_by = ?")
                .bind(&guid)
                .fetch_one(&self.db)
                .await?;
        let labels_added: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM labels WHERE user_id = ?")
                .bind(&guid)
                .fetch_one(&self.db)
                .await?;
        let languages_contributed: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT language) FROM labels WHERE user_id = ?")
                .bind(&guid)
                .fetch_one(&self.db)
                .await?;
        let categories_contributed: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT category) FROM images WHERE uploaded_by = ?")
                .bind(&guid)
                .fetch_one(&self.db)
                .await?;

        Ok(json!({
            "username": username,
            "images_uploaded": images_uploaded,
            "labels_added": labels_added,
            "languages_contributed": languages_contributed,
            "categories_contributed": categories_contributed,
        }))
    }

    async fn counted_statistic(&self, key: &str, sql: &str) -> Result<Value> {
        let key = key.to_string();
        if let Some(cached) = self.stats_cache.get(&key) {
            return Ok(cached);
        }

        let rows: Vec<(String, i64)> = sqlx::query_as(sql).fetch_all(&self.db).await?;
        let value = Value::Array(
            rows.into_iter()
                .map(|(k, count)| json!({ "key": k, "count": count }))
                .collect(),
        );
        self.stats_cache.insert(key, value.clone());
        Ok(value)
    }

    // ========================================
    // Export
    // ========================================

    /// Zip bundle of one CSV per table plus a statistics sheet
    pub async fn export_spreadsheet(&self) -> Result<Vec<u8>> {
        let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at")
            .fetch_all(&self.db)
            .await?;
        let images: Vec<Image> = sqlx::query_as("SELECT * FROM images ORDER BY uploaded_at")
            .fetch_all(&self.db)
            .await?;
        let labels: Vec<Label> = sqlx::query_as("SELECT * FROM labels ORDER BY added_at")
            .fetch_all(&self.db)
            .await?;
        let statistics = self.statistics().await?;

        crate::export::spreadsheet_bundle(&users, &images, &labels, &statistics)
    }

    /// Zip archive of image files organized by category/uploader plus manifest
    pub async fn export_archive(&self) -> Result<Vec<u8>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT i.guid, i.title, i.category, i.file_path, u.username \
             FROM images i JOIN users u ON u.guid = i.uploaded_by \
             ORDER BY i.category, u.username, i.uploaded_at",
        )
        .fetch_all(&self.db)
        .await?;

        crate::export::image_archive(&self.store, &rows)
    }

    // ========================================
    // Analytics
    // ========================================

    /// Best-effort analytics event insert
    ///
    /// The analytics table is derived data; a failed insert is logged and
    /// swallowed so it can never fail the triggering operation.
    pub async fn log_event(
        &self,
        event_type: &str,
        user_id: Option<&str>,
        image_id: Option<&str>,
        label_id: Option<i64>,
        metadata: Option<Value>,
    ) {
        let result = sqlx::query(
            "INSERT INTO analytics (event_type, user_id, image_id, label_id, metadata) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event_type)
        .bind(user_id)
        .bind(image_id)
        .bind(label_id)
        .bind(metadata.map(|m| m.to_string()))
        .execute(&self.db)
        .await;

        if let Err(e) = result {
            warn!("Could not record '{}' analytics event: {}", event_type, e);
        }
    }

    /// Most recent analytics events, newest first
    pub async fn recent_events(&self, limit: i64) -> Result<Vec<AnalyticsEvent>> {
        Ok(
            sqlx::query_as("SELECT * FROM analytics ORDER BY id DESC LIMIT ?")
                .bind(limit.clamp(1, MAX_FEED_LIMIT))
                .fetch_all(&self.db)
                .await?,
        )
    }

    // ========================================
    // Helpers
    // ========================================

    async fn user_exists(&self, guid: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE guid = ? AND is_active = 1)")
                .bind(guid)
                .fetch_one(&self.db)
                .await?;
        Ok(exists)
    }

    async fn image_exists(&self, guid: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM images WHERE guid = ?)")
            .bind(guid)
            .fetch_one(&self.db)
            .await?;
        Ok(exists)
    }
}

/// Trim and bound a free-text field
fn validate_text(text: &str, max_chars: usize, field: &str) -> Result<String> {
    let text = text.trim();
    if text.is_empty() {
        return Err(Error::InvalidInput(format!("{} cannot be empty", field)));
    }
    if text.chars().count() > max_chars {
        return Err(Error::InvalidInput(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(text.to_string())
}

fn validate_username(username: &str) -> Result<()> {
    if username.len() < 3 {
        return Err(Error::InvalidInput(
            "username must be at least 3 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(
            "username may only contain letters, digits, underscore, and hyphen".to_string(),
        ));
    }
    Ok(())
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::InvalidInput(format!(
            "latitude must be between -90 and 90, got {}",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::InvalidInput(format!(
            "longitude must be between -180 and 180, got {}",
            longitude
        )));
    }
    Ok(())
}

fn generate_salt() -> String {
    use rand::Rng;
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex_encode(&bytes)
}

/// Salted SHA-256, hex-encoded
fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
