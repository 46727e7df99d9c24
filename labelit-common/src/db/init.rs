//! Database initialization
//!
//! Creates the database file and its four tables on first run; opening an
//! existing database is a no-op thanks to `CREATE TABLE IF NOT EXISTS`.

use crate::lang;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // Enforce referential integrity between labels, images, and users
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;

    // WAL allows concurrent readers alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;

    // WAL makes NORMAL durability safe enough for this workload
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;

    // Writers block briefly on contention instead of erroring
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    // Idempotent schema creation
    create_users_table(&pool).await?;
    create_images_table(&pool).await?;
    create_labels_table(&pool).await?;
    create_analytics_table(&pool).await?;

    Ok(pool)
}

/// Create the users table
///
/// Users are soft-lifecycle only: `is_active` is cleared instead of
/// deleting rows.
async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            guid TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            preferred_language TEXT NOT NULL DEFAULT 'en',
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            last_login TIMESTAMP,
            is_active INTEGER NOT NULL DEFAULT 1,
            CHECK (preferred_language IN ({codes}))
        )
        "#,
        codes = language_code_list()
    ))
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_username ON users(username)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_active ON users(is_active)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the images table
///
/// `file_path` is the UUID-derived name inside the image store. Rows are
/// immutable after insert apart from `label_count` maintenance.
async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            guid TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            category TEXT NOT NULL,
            file_path TEXT NOT NULL,
            uploaded_by TEXT NOT NULL REFERENCES users(guid),
            uploaded_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            latitude REAL,
            longitude REAL,
            city TEXT,
            country TEXT,
            location_method TEXT,
            file_size INTEGER,
            width INTEGER,
            height INTEGER,
            label_count INTEGER NOT NULL DEFAULT 0,
            CHECK (latitude IS NULL OR (latitude >= -90.0 AND latitude <= 90.0)),
            CHECK (longitude IS NULL OR (longitude >= -180.0 AND longitude <= 180.0)),
            CHECK (file_size IS NULL OR file_size >= 0),
            CHECK (label_count >= 0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_category ON images(category)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_uploaded_by ON images(uploaded_by)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_uploaded_at ON images(uploaded_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the labels table
///
/// Append-only: the UNIQUE constraint rejects a duplicate of an existing
/// (image, text, language) triple and there is no update path.
async fn create_labels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS labels (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            image_id TEXT NOT NULL REFERENCES images(guid) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(guid),
            text TEXT NOT NULL,
            language TEXT NOT NULL,
            added_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            latitude REAL,
            longitude REAL,
            city TEXT,
            country TEXT,
            UNIQUE (image_id, text, language),
            CHECK (language IN ({codes})),
            CHECK (latitude IS NULL OR (latitude >= -90.0 AND latitude <= 90.0)),
            CHECK (longitude IS NULL OR (longitude >= -180.0 AND longitude <= 180.0))
        )
        "#,
        codes = language_code_list()
    ))
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_labels_image_id ON labels(image_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_labels_language ON labels(language)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_labels_user_id ON labels(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the analytics table
///
/// Derived event log; not authoritative, rebuildable from the other tables.
/// No foreign keys: an analytics row must never block or outlive-constrain
/// the rows it refers to.
async fn create_analytics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analytics (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_type TEXT NOT NULL,
            user_id TEXT,
            image_id TEXT,
            label_id INTEGER,
            metadata TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analytics_event ON analytics(event_type)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_analytics_created_at ON analytics(created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// SQL literal list of the supported language codes, for CHECK constraints
fn language_code_list() -> String {
    lang::codes()
        .map(|c| format!("'{}'", c))
        .collect::<Vec<_>>()
        .join(", ")
}
