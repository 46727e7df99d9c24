//! # LabelIt Common Library
//!
//! Shared code for the LabelIt image-labeling service including:
//! - Database schema, initialization, and row models
//! - Error types
//! - Configuration loading and validation
//! - The supported-language table
//! - TTL cache for expensive read operations

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod lang;

pub use cache::TtlCache;
pub use config::Config;
pub use error::{Error, Result};
