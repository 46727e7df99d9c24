//! Configuration loading and data directory resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::lang;

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "LABELIT_DATA_DIR";

/// Environment variable overriding the HTTP listen port
pub const PORT_ENV: &str = "LABELIT_PORT";

/// Complete service configuration
///
/// Every recognized option with a fixed type, validated at startup.
/// The supported-language set is a compiled table ([`crate::lang`]),
/// deliberately not configurable.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP bind host
    pub host: String,
    /// HTTP bind port
    pub port: u16,
    /// Root data directory (database file + image store live under it)
    pub data_dir: PathBuf,
    /// JPEG re-encode quality (1..=100)
    pub image_quality: u8,
    /// Maximum width/height after compression; larger uploads are resized
    pub image_max_dimension: u32,
    /// Statistics cache time-to-live in seconds
    pub cache_ttl_secs: u64,
    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: u64,
    /// Whether geolocation enrichment is attempted at all
    pub geolocation_enabled: bool,
    /// Per-request timeout for geolocation providers
    pub geolocation_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8701,
            data_dir: default_data_dir(),
            image_quality: 85,
            image_max_dimension: 1200,
            cache_ttl_secs: 300,
            max_upload_bytes: 10 * 1024 * 1024,
            geolocation_enabled: true,
            geolocation_timeout_secs: 5,
        }
    }
}

/// Optional-field mirror of [`Config`] as read from a TOML file
#[derive(Debug, Default, Deserialize)]
pub struct TomlConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub data_dir: Option<PathBuf>,
    pub image_quality: Option<u8>,
    pub image_max_dimension: Option<u32>,
    pub cache_ttl_secs: Option<u64>,
    pub max_upload_bytes: Option<u64>,
    pub geolocation_enabled: Option<bool>,
    pub geolocation_timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration with priority resolution:
    /// 1. Command-line arguments (highest priority)
    /// 2. Environment variables (`LABELIT_DATA_DIR`, `LABELIT_PORT`)
    /// 3. TOML config file
    /// 4. Compiled defaults (fallback)
    pub fn load(
        cli_data_dir: Option<&str>,
        cli_port: Option<u16>,
        cli_config_file: Option<&Path>,
    ) -> Result<Self> {
        let mut config = Self::default();

        let toml_path = match cli_config_file {
            Some(path) => Some(path.to_path_buf()),
            None => find_config_file(),
        };
        if let Some(path) = toml_path {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
            })?;
            let toml_config: TomlConfig = toml::from_str(&contents).map_err(|e| {
                Error::Config(format!("Cannot parse config file {}: {}", path.display(), e))
            })?;
            config.apply(toml_config);
        }

        // Environment variables override the TOML values
        if let Ok(path) = std::env::var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var(PORT_ENV) {
            config.port = port.parse().map_err(|_| {
                Error::Config(format!("{} must be a port number, got '{}'", PORT_ENV, port))
            })?;
        }

        // CLI arguments override everything
        if let Some(path) = cli_data_dir {
            config.data_dir = PathBuf::from(path);
        }
        if let Some(port) = cli_port {
            config.port = port;
        }

        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, toml_config: TomlConfig) {
        if let Some(host) = toml_config.host {
            self.host = host;
        }
        if let Some(port) = toml_config.port {
            self.port = port;
        }
        if let Some(data_dir) = toml_config.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(quality) = toml_config.image_quality {
            self.image_quality = quality;
        }
        if let Some(dim) = toml_config.image_max_dimension {
            self.image_max_dimension = dim;
        }
        if let Some(ttl) = toml_config.cache_ttl_secs {
            self.cache_ttl_secs = ttl;
        }
        if let Some(max) = toml_config.max_upload_bytes {
            self.max_upload_bytes = max;
        }
        if let Some(enabled) = toml_config.geolocation_enabled {
            self.geolocation_enabled = enabled;
        }
        if let Some(timeout) = toml_config.geolocation_timeout_secs {
            self.geolocation_timeout_secs = timeout;
        }
    }

    /// Validate option ranges; called by [`Config::load`] before anything
    /// touches the filesystem or binds a socket.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.image_quality == 0 || self.image_quality > 100 {
            return Err(Error::Config(format!(
                "image_quality must be 1..=100, got {}",
                self.image_quality
            )));
        }
        if self.image_max_dimension < 16 {
            return Err(Error::Config(format!(
                "image_max_dimension must be at least 16, got {}",
                self.image_max_dimension
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be non-zero".to_string()));
        }
        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::Config("data_dir must not be empty".to_string()));
        }
        // Sanity check that the compiled language table is intact
        if !lang::is_supported("en") {
            return Err(Error::Config("language table missing 'en'".to_string()));
        }
        Ok(())
    }

    /// Path of the SQLite database file
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("labelit.db")
    }

    /// Directory holding compressed image files
    pub fn images_dir(&self) -> PathBuf {
        self.data_dir.join("images")
    }

    /// Create the data directory tree if missing
    pub fn ensure_data_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.images_dir())?;
        Ok(())
    }
}

/// Locate a config file in the conventional places
///
/// Checks `~/.config/labelit/config.toml` then `/etc/labelit/config.toml`
/// on Linux; the platform config dir elsewhere.
fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("labelit").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/labelit/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }
    None
}

/// OS-dependent default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("labelit"))
        .unwrap_or_else(|| PathBuf::from("./labelit_data"))
}
