//! Integration tests for the backend service
//!
//! Each test runs against a fresh database and image store in a temp
//! directory with geolocation disabled, so nothing touches the network.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, RgbImage};
use tempfile::TempDir;

use labelit_common::db::init_database;
use labelit_common::{Config, Error, TtlCache};
use labelit_web::backend::{Backend, ImageFilters, LabelRequest, UploadRequest};
use labelit_web::geolocation::GeoResolver;
use labelit_web::imaging::ImageProcessor;
use labelit_web::store::ImageStore;

async fn setup(cache_ttl_secs: u64) -> (Backend, TempDir) {
    let dir = tempfile::tempdir().expect("Should create temp dir");

    let mut config = Config::default();
    config.data_dir = dir.path().to_path_buf();
    config.geolocation_enabled = false;
    config.cache_ttl_secs = cache_ttl_secs;
    config.image_max_dimension = 64;

    let pool = init_database(&config.database_path())
        .await
        .expect("Should initialize database");
    let store = ImageStore::open(&config.images_dir()).expect("Should open image store");
    let processor = ImageProcessor::new(&config);
    let geo = GeoResolver::new(&config);
    let cache = TtlCache::new(std::time::Duration::from_secs(config.cache_ttl_secs));

    (Backend::new(pool, store, processor, geo, cache), dir)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 64])
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

async fn register(backend: &Backend, username: &str) -> String {
    backend
        .register_user(username, "password", "en")
        .await
        .expect("Should register user")
}

fn upload_request(user_id: &str, title: &str, category: &str) -> UploadRequest {
    UploadRequest {
        bytes: png_bytes(32, 24),
        title: title.to_string(),
        description: None,
        category: category.to_string(),
        uploader_id: user_id.to_string(),
        coordinates: None,
    }
}

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_register_and_authenticate() {
    let (backend, _dir) = setup(0).await;

    let guid = register(&backend, "asha").await;
    let user = backend
        .authenticate("asha", "password")
        .await
        .expect("Should authenticate");
    assert_eq!(user.guid, guid);
    assert_eq!(user.preferred_language, "en");
    assert!(user.is_active);
}

#[tokio::test]
async fn test_authenticate_wrong_password() {
    let (backend, _dir) = setup(0).await;
    register(&backend, "asha").await;

    let result = backend.authenticate("asha", "wrong").await;
    assert!(matches!(result, Err(Error::AuthenticationFailed)));

    let result = backend.authenticate("nobody", "password").await;
    assert!(matches!(result, Err(Error::AuthenticationFailed)));
}

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let (backend, _dir) = setup(0).await;
    register(&backend, "asha").await;

    let result = backend.register_user("asha", "other", "hi").await;
    assert!(matches!(result, Err(Error::DuplicateUser(_))));
}

#[tokio::test]
async fn test_register_input_validation() {
    let (backend, _dir) = setup(0).await;

    assert!(matches!(
        backend.register_user("ab", "password", "en").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        backend.register_user("asha k", "password", "en").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        backend.register_user("asha", "pw", "en").await,
        Err(Error::InvalidInput(_))
    ));
    assert!(matches!(
        backend.register_user("asha", "password", "fr").await,
        Err(Error::InvalidInput(_))
    ));
}

// =============================================================================
// Images
// =============================================================================

#[tokio::test]
async fn test_upload_stores_file_and_row() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;

    let image = backend
        .upload_image(upload_request(&user_id, "Street sign", "signage"))
        .await
        .expect("Should upload image");

    assert_eq!(image.title, "Street sign");
    assert_eq!(image.category, "signage");
    assert_eq!(image.uploaded_by, user_id);
    assert_eq!(image.label_count, 0);
    assert!(image.latitude.is_none());
    assert!(backend.store().exists(&image.file_path));

    // Stored bytes are re-encoded JPEG
    let bytes = backend.image_file(&image.guid).await.unwrap();
    let decoded = image::load_from_memory(&bytes).expect("Stored file should decode");
    assert_eq!(decoded.width(), 32);
    assert_eq!(decoded.height(), 24);
    assert_eq!(image.file_size, Some(bytes.len() as i64));
}

#[tokio::test]
async fn test_corrupt_upload_leaves_nothing_behind() {
    let (backend, dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;

    let result = backend
        .upload_image(UploadRequest {
            bytes: b"not an image".to_vec(),
            title: "Bad".to_string(),
            description: None,
            category: "other".to_string(),
            uploader_id: user_id,
            coordinates: None,
        })
        .await;
    assert!(matches!(result, Err(Error::InvalidImage(_))));

    // No row, no orphaned file
    let images = backend.list_images(&ImageFilters::default()).await.unwrap();
    assert!(images.is_empty());
    let files: Vec<_> = std::fs::read_dir(dir.path().join("images"))
        .unwrap()
        .collect();
    assert!(files.is_empty());
}

#[tokio::test]
async fn test_upload_unknown_uploader() {
    let (backend, _dir) = setup(0).await;
    let result = backend
        .upload_image(upload_request("no-such-user", "Title", "other"))
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_upload_validates_coordinates() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;

    let mut request = upload_request(&user_id, "Title", "other");
    request.coordinates = Some((91.0, 0.0));
    assert!(matches!(
        backend.upload_image(request).await,
        Err(Error::InvalidInput(_))
    ));
}

#[tokio::test]
async fn test_list_images_filters() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;

    let signage = backend
        .upload_image(upload_request(&user_id, "Market sign", "signage"))
        .await
        .unwrap();
    backend
        .upload_image(upload_request(&user_id, "Fruit stall", "food"))
        .await
        .unwrap();

    let all = backend.list_images(&ImageFilters::default()).await.unwrap();
    assert_eq!(all.len(), 2);

    let by_category = backend
        .list_images(&ImageFilters {
            category: Some("signage".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_category.len(), 1);
    assert_eq!(by_category[0].guid, signage.guid);

    let by_search = backend
        .list_images(&ImageFilters {
            search: Some("fruit".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_search.len(), 1);
    assert_eq!(by_search[0].title, "Fruit stall");

    let by_limit = backend
        .list_images(&ImageFilters {
            limit: Some(1),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_limit.len(), 1);
}

#[tokio::test]
async fn test_list_images_by_label_language() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;

    let labeled = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();
    backend
        .upload_image(upload_request(&user_id, "Dog", "animals"))
        .await
        .unwrap();

    backend
        .create_label(LabelRequest {
            image_id: labeled.guid.clone(),
            user_id: user_id.clone(),
            text: "बिल्ली".to_string(),
            language: "hi".to_string(),
            coordinates: None,
        })
        .await
        .unwrap();

    let hindi = backend
        .list_images(&ImageFilters {
            language: Some("hi".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hindi.len(), 1);
    assert_eq!(hindi[0].guid, labeled.guid);
}

// =============================================================================
// Labels
// =============================================================================

#[tokio::test]
async fn test_create_label_updates_count() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    let image = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();

    let label = backend
        .create_label(LabelRequest {
            image_id: image.guid.clone(),
            user_id: user_id.clone(),
            text: "  बिल्ली  ".to_string(),
            language: "hi".to_string(),
            coordinates: None,
        })
        .await
        .expect("Should create label");

    assert_eq!(label.text, "बिल्ली");
    assert_eq!(label.language, "hi");

    let refreshed = backend.image(&image.guid).await.unwrap();
    assert_eq!(refreshed.label_count, 1);

    let labels = backend.image_labels(&image.guid).await.unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].id, label.id);
}

#[tokio::test]
async fn test_duplicate_label_rejected() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    let other_id = register(&backend, "bilal").await;
    let image = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();

    let request = |user: &str| LabelRequest {
        image_id: image.guid.clone(),
        user_id: user.to_string(),
        text: "cat".to_string(),
        language: "en".to_string(),
        coordinates: None,
    };
    backend.create_label(request(&user_id)).await.unwrap();

    // Same (image, text, language) triple, even from another user
    let result = backend.create_label(request(&other_id)).await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let refreshed = backend.image(&image.guid).await.unwrap();
    assert_eq!(refreshed.label_count, 1);
}

#[tokio::test]
async fn test_label_validation_precedes_writes() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    let image = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();

    let result = backend
        .create_label(LabelRequest {
            image_id: image.guid.clone(),
            user_id: user_id.clone(),
            text: "chat".to_string(),
            language: "fr".to_string(),
            coordinates: None,
        })
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let result = backend
        .create_label(LabelRequest {
            image_id: image.guid.clone(),
            user_id: user_id.clone(),
            text: "   ".to_string(),
            language: "en".to_string(),
            coordinates: None,
        })
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    assert!(backend.image_labels(&image.guid).await.unwrap().is_empty());
    assert_eq!(backend.image(&image.guid).await.unwrap().label_count, 0);
}

#[tokio::test]
async fn test_label_missing_image_or_user() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    let image = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();

    let result = backend
        .create_label(LabelRequest {
            image_id: "no-such-image".to_string(),
            user_id: user_id.clone(),
            text: "cat".to_string(),
            language: "en".to_string(),
            coordinates: None,
        })
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));

    let result = backend
        .create_label(LabelRequest {
            image_id: image.guid.clone(),
            user_id: "no-such-user".to_string(),
            text: "cat".to_string(),
            language: "en".to_string(),
            coordinates: None,
        })
        .await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

// =============================================================================
// Analytics
// =============================================================================

#[tokio::test]
async fn test_operations_leave_event_trail() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    let image = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();
    backend
        .create_label(LabelRequest {
            image_id: image.guid.clone(),
            user_id: user_id.clone(),
            text: "cat".to_string(),
            language: "en".to_string(),
            coordinates: None,
        })
        .await
        .unwrap();

    let events = backend.recent_events(10).await.unwrap();
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, vec!["label_added", "image_uploaded", "user_registered"]);
    assert_eq!(events[0].image_id.as_deref(), Some(image.guid.as_str()));
    assert_eq!(events[1].user_id.as_deref(), Some(user_id.as_str()));
    assert!(events[0].metadata.as_deref().unwrap_or("").contains("\"language\":\"en\""));
}

// =============================================================================
// Statistics
// =============================================================================

#[tokio::test]
async fn test_statistics_counts() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    let image = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();
    backend
        .create_label(LabelRequest {
            image_id: image.guid.clone(),
            user_id: user_id.clone(),
            text: "cat".to_string(),
            language: "en".to_string(),
            coordinates: None,
        })
        .await
        .unwrap();

    let stats = backend.statistics().await.unwrap();
    assert_eq!(stats["total_images"], 1);
    assert_eq!(stats["total_labels"], 1);
    assert_eq!(stats["total_users"], 1);
    assert_eq!(stats["languages_used"], 1);
    assert_eq!(stats["avg_labels_per_image"], 1.0);
    assert_eq!(stats["recent_images"], 1);
}

#[tokio::test]
async fn test_statistics_cached_within_ttl() {
    // Long TTL: the second read must serve the cached value
    let (backend, _dir) = setup(600).await;
    let user_id = register(&backend, "asha").await;

    let before = backend.statistics().await.unwrap();
    assert_eq!(before["total_images"], 0);

    backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();

    let after = backend.statistics().await.unwrap();
    assert_eq!(after["total_images"], 0, "cached value should be served");
}

#[tokio::test]
async fn test_statistics_fresh_with_zero_ttl() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;

    assert_eq!(backend.statistics().await.unwrap()["total_images"], 0);
    backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();
    assert_eq!(backend.statistics().await.unwrap()["total_images"], 1);
}

#[tokio::test]
async fn test_category_and_language_statistics() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();
    backend
        .upload_image(upload_request(&user_id, "Dog", "animals"))
        .await
        .unwrap();
    backend
        .upload_image(upload_request(&user_id, "Sign", "signage"))
        .await
        .unwrap();

    let categories = backend.category_statistics().await.unwrap();
    let rows = categories.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["key"], "animals");
    assert_eq!(rows[0]["count"], 2);

    let languages = backend.language_statistics().await.unwrap();
    assert!(languages.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_activity_timeline() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();

    let timeline = backend.activity_timeline(30).await.unwrap();
    let rows = timeline.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["uploads"], 1);
}

#[tokio::test]
async fn test_user_statistics() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    let image = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();
    backend
        .create_label(LabelRequest {
            image_id: image.guid,
            user_id: user_id.clone(),
            text: "बिल्ली".to_string(),
            language: "hi".to_string(),
            coordinates: None,
        })
        .await
        .unwrap();

    let stats = backend.user_statistics("asha").await.unwrap();
    assert_eq!(stats["images_uploaded"], 1);
    assert_eq!(stats["labels_added"], 1);
    assert_eq!(stats["languages_contributed"], 1);
    assert_eq!(stats["categories_contributed"], 1);

    let result = backend.user_statistics("nobody").await;
    assert!(matches!(result, Err(Error::NotFound(_))));
}

// =============================================================================
// Exports
// =============================================================================

#[tokio::test]
async fn test_export_spreadsheet_contents() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();

    let bytes = backend.export_spreadsheet().await.unwrap();
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<String> = archive.file_names().map(String::from).collect();
    for expected in ["users.csv", "images.csv", "labels.csv", "statistics.csv"] {
        assert!(names.contains(&expected.to_string()), "missing {}", expected);
    }

    // No password material in the users sheet
    let mut users_csv = String::new();
    std::io::Read::read_to_string(&mut archive.by_name("users.csv").unwrap(), &mut users_csv)
        .unwrap();
    assert!(users_csv.contains("asha"));
    assert!(!users_csv.contains("password_hash"));
}

#[tokio::test]
async fn test_export_archive_layout() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();

    let bytes = backend.export_archive().await.unwrap();
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"animals/asha/Cat.jpg"));
    assert!(names.contains(&"manifest.csv"));
}

#[tokio::test]
async fn test_export_archive_skips_missing_files() {
    let (backend, _dir) = setup(0).await;
    let user_id = register(&backend, "asha").await;
    let image = backend
        .upload_image(upload_request(&user_id, "Cat", "animals"))
        .await
        .unwrap();
    backend
        .upload_image(upload_request(&user_id, "Dog", "animals"))
        .await
        .unwrap();

    backend.store().remove(&image.file_path).unwrap();

    let bytes = backend.export_archive().await.unwrap();
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let names: Vec<&str> = archive.file_names().collect();
    assert!(names.contains(&"animals/asha/Dog.jpg"));
    assert!(!names.contains(&"animals/asha/Cat.jpg"));
}
