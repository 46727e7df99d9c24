//! Data export bundles
//!
//! Both exports build their zip archives fully in memory; the datasets a
//! single deployment accumulates stay small enough that streaming is not
//! worth the complexity.

use crate::store::ImageStore;
use labelit_common::db::models::{Image, Label, User};
use labelit_common::{Error, Result};
use serde_json::Value;
use std::io::Write;
use tracing::warn;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Zip of one CSV per table plus a statistics sheet
///
/// Password material never leaves the database: the users sheet carries
/// only public columns.
pub fn spreadsheet_bundle(
    users: &[User],
    images: &[Image],
    labels: &[Label],
    statistics: &Value,
) -> Result<Vec<u8>> {
    let mut archive = Vec::new();
    {
        let mut zip = ZipWriter::new(std::io::Cursor::new(&mut archive));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        write_sheet(&mut zip, "users.csv", users_csv(users)?, options)?;
        write_sheet(&mut zip, "images.csv", images_csv(images)?, options)?;
        write_sheet(&mut zip, "labels.csv", labels_csv(labels)?, options)?;
        write_sheet(
            &mut zip,
            "statistics.csv",
            statistics_csv(statistics)?,
            options,
        )?;

        zip.finish()
            .map_err(|e| Error::Export(format!("could not finalize spreadsheet zip: {}", e)))?;
    }
    Ok(archive)
}

/// Zip of stored image files laid out `category/username/title.jpg`, plus
/// a manifest sheet. Records whose file is missing on disk are skipped
/// with a warning rather than failing the whole export.
///
/// `rows` holds (guid, title, category, file_path, username) per image.
pub fn image_archive(
    store: &ImageStore,
    rows: &[(String, String, String, String, String)],
) -> Result<Vec<u8>> {
    let mut archive = Vec::new();
    {
        let mut zip = ZipWriter::new(std::io::Cursor::new(&mut archive));
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        let mut manifest = csv::Writer::from_writer(Vec::new());
        manifest
            .write_record(["guid", "title", "category", "username", "archive_path"])
            .map_err(|e| Error::Export(format!("manifest: {}", e)))?;

        let mut used_paths = std::collections::HashSet::new();
        for (guid, title, category, file_path, username) in rows {
            let bytes = match store.read(file_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping image {} in archive export: {}", guid, e);
                    continue;
                }
            };

            let mut entry_path = format!(
                "{}/{}/{}.jpg",
                sanitize_component(category),
                sanitize_component(username),
                sanitize_component(title)
            );
            // Duplicate titles within a folder get the guid as a suffix
            if !used_paths.insert(entry_path.clone()) {
                entry_path = format!(
                    "{}/{}/{}-{}.jpg",
                    sanitize_component(category),
                    sanitize_component(username),
                    sanitize_component(title),
                    guid
                );
                used_paths.insert(entry_path.clone());
            }

            zip.start_file(&entry_path, options)
                .map_err(|e| Error::Export(format!("zip entry {}: {}", entry_path, e)))?;
            zip.write_all(&bytes)
                .map_err(|e| Error::Export(format!("zip entry {}: {}", entry_path, e)))?;

            manifest
                .write_record([guid, title, category, username, &entry_path])
                .map_err(|e| Error::Export(format!("manifest: {}", e)))?;
        }

        let manifest_bytes = manifest
            .into_inner()
            .map_err(|e| Error::Export(format!("manifest: {}", e)))?;
        write_sheet(&mut zip, "manifest.csv", manifest_bytes, options)?;

        zip.finish()
            .map_err(|e| Error::Export(format!("could not finalize archive zip: {}", e)))?;
    }
    Ok(archive)
}

fn write_sheet(
    zip: &mut ZipWriter<std::io::Cursor<&mut Vec<u8>>>,
    name: &str,
    bytes: Vec<u8>,
    options: SimpleFileOptions,
) -> Result<()> {
    zip.start_file(name, options)
        .map_err(|e| Error::Export(format!("zip entry {}: {}", name, e)))?;
    zip.write_all(&bytes)
        .map_err(|e| Error::Export(format!("zip entry {}: {}", name, e)))?;
    Ok(())
}

fn users_csv(users: &[User]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "guid",
            "username",
            "preferred_language",
            "created_at",
            "last_login",
            "is_active",
        ])
        .map_err(csv_err)?;
    for user in users {
        writer
            .write_record([
                user.guid.as_str(),
                user.username.as_str(),
                user.preferred_language.as_str(),
                &user.created_at.to_string(),
                &user
                    .last_login
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
                if user.is_active { "1" } else { "0" },
            ])
            .map_err(csv_err)?;
    }
    writer.into_inner().map_err(|e| Error::Export(e.to_string()))
}

fn images_csv(images: &[Image]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "guid",
            "title",
            "description",
            "category",
            "uploaded_by",
            "uploaded_at",
            "latitude",
            "longitude",
            "city",
            "country",
            "location_method",
            "file_size",
            "width",
            "height",
            "label_count",
        ])
        .map_err(csv_err)?;
    for image in images {
        writer
            .write_record([
                image.guid.as_str(),
                image.title.as_str(),
                image.description.as_deref().unwrap_or(""),
                image.category.as_str(),
                image.uploaded_by.as_str(),
                &image.uploaded_at.to_string(),
                &opt_num(image.latitude),
                &opt_num(image.longitude),
                image.city.as_deref().unwrap_or(""),
                image.country.as_deref().unwrap_or(""),
                image.location_method.as_deref().unwrap_or(""),
                &opt_int(image.file_size),
                &opt_int(image.width),
                &opt_int(image.height),
                &image.label_count.to_string(),
            ])
            .map_err(csv_err)?;
    }
    writer.into_inner().map_err(|e| Error::Export(e.to_string()))
}

fn labels_csv(labels: &[Label]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record([
            "id",
            "image_id",
            "user_id",
            "text",
            "language",
            "added_at",
            "latitude",
            "longitude",
            "city",
            "country",
        ])
        .map_err(csv_err)?;
    for label in labels {
        writer
            .write_record([
                &label.id.to_string(),
                label.image_id.as_str(),
                label.user_id.as_str(),
                label.text.as_str(),
                label.language.as_str(),
                &label.added_at.to_string(),
                &opt_num(label.latitude),
                &opt_num(label.longitude),
                label.city.as_deref().unwrap_or(""),
                label.country.as_deref().unwrap_or(""),
            ])
            .map_err(csv_err)?;
    }
    writer.into_inner().map_err(|e| Error::Export(e.to_string()))
}

/// Flatten the summary object into metric,value rows
fn statistics_csv(statistics: &Value) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["metric", "value"]).map_err(csv_err)?;
    if let Value::Object(map) = statistics {
        for (metric, value) in map {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            writer.write_record([metric.as_str(), &rendered]).map_err(csv_err)?;
        }
    }
    writer.into_inner().map_err(|e| Error::Export(e.to_string()))
}

fn opt_num(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_int(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_err(e: csv::Error) -> Error {
    Error::Export(e.to_string())
}

/// Make a metadata string safe as a single zip path component
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ' ' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(['.', ' ']).to_string();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}
