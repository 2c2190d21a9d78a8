//! Configuration management for the sheet store
//!
//! Settings come from an optional TOML file, then environment variables, then
//! command line flags (applied by the binary). Durations are written as strings
//! such as `"30s"` or `"500ms"`.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default config file looked up by [`Config::load`]
pub const DEFAULT_CONFIG_FILE: &str = "sheet-store.toml";

/// Default Google Sheets REST endpoint
pub const DEFAULT_SHEETS_API: &str = "https://sheets.googleapis.com/v4";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,

    /// Document store and transport configuration
    pub store: StoreConfig,

    /// Metrics and monitoring
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP server bind address
    pub http_addr: SocketAddr,

    /// Request timeout
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,
}

/// Which transport backs the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// In-process grid, lost on exit
    Memory,
    /// Google Sheets v4 REST API
    Sheets,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Transport backend
    pub backend: BackendType,

    /// Spreadsheet holding one sheet per collection
    pub spreadsheet_id: Option<String>,

    /// Fixed OAuth bearer token for the Sheets API
    pub access_token: Option<String>,

    /// Service-account JSON key; tokens are minted and refreshed from it.
    /// Takes precedence over `access_token`.
    pub credentials_file: Option<PathBuf>,

    /// Sheets API base URL
    pub api_base_url: String,

    /// Timeout applied to every transport call
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    /// Serialize mutating operations per collection
    pub serialize_writes: bool,

    /// Reject inserts whose `_id` already exists
    pub unique_ids: bool,

    /// Collections created by `setup` and served over HTTP
    pub collections: Vec<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose Prometheus metrics at `/metrics`
    pub enable_prometheus: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (compact, full)
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Memory,
            spreadsheet_id: None,
            access_token: None,
            credentials_file: None,
            api_base_url: DEFAULT_SHEETS_API.to_string(),
            request_timeout: Duration::from_secs(15),
            serialize_writes: true,
            unique_ids: true,
            collections: crate::storage::CollectionName::ALL
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable_prometheus: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default file (if present) and environment variables
    pub fn load() -> Result<Self> {
        let config = if std::path::Path::new(DEFAULT_CONFIG_FILE).exists() {
            Self::from_file(DEFAULT_CONFIG_FILE)?
        } else {
            Config::default()
        };
        config.finish()
    }

    /// Load configuration from a TOML file, then apply environment variables
    pub fn load_from(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::from_file(path)?.finish()
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides()?;
        self.validate()?;
        Ok(self)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&contents)
            .map_err(|e| Error::config(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(addr) = var("SHEET_STORE_HTTP_ADDR") {
            self.server.http_addr = addr
                .parse()
                .map_err(|e| Error::config(format!("Invalid HTTP address: {}", e)))?;
        } else if let Some(port) = var("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|e| Error::config(format!("Invalid port: {}", e)))?;
            self.server.http_addr.set_port(port);
        }

        if let Some(backend) = var("SHEET_STORE_BACKEND") {
            self.store.backend = parse_backend(&backend)?;
        }

        if let Some(id) = var("GOOGLE_SHEET_ID") {
            self.store.spreadsheet_id = Some(id);
        }

        if let Some(token) = var("GOOGLE_SHEETS_TOKEN") {
            self.store.access_token = Some(token);
        }

        if let Some(path) = var("GOOGLE_APPLICATION_CREDENTIALS") {
            self.store.credentials_file = Some(PathBuf::from(path));
        }

        if let Some(url) = var("SHEET_STORE_SHEETS_API") {
            self.store.api_base_url = url;
        }

        if let Some(flag) = var("SHEET_STORE_SERIALIZE_WRITES") {
            self.store.serialize_writes = flag
                .parse()
                .map_err(|e| Error::config(format!("Invalid SHEET_STORE_SERIALIZE_WRITES: {}", e)))?;
        }

        if let Some(level) = var("SHEET_STORE_LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Some(format) = var("SHEET_STORE_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => return Err(Error::config("Invalid log level")),
        }

        match self.logging.format.as_str() {
            "compact" | "full" => {}
            _ => return Err(Error::config("Invalid log format (compact, full)")),
        }

        if self.store.backend == BackendType::Sheets {
            if self.store.spreadsheet_id.as_deref().map_or(true, str::is_empty) {
                return Err(Error::config("Sheets backend requires a spreadsheet id (GOOGLE_SHEET_ID)"));
            }
            let has_token = self.store.access_token.as_deref().map_or(false, |t| !t.is_empty());
            if !has_token && self.store.credentials_file.is_none() {
                return Err(Error::config(
                    "Sheets backend requires GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_SHEETS_TOKEN",
                ));
            }
        }

        if self.store.collections.iter().any(|c| c.trim().is_empty()) {
            return Err(Error::config("Collection names must not be empty"));
        }

        Ok(())
    }
}

/// Parse a backend name as accepted on the command line and in env vars
pub fn parse_backend(name: &str) -> Result<BackendType> {
    match name {
        "memory" => Ok(BackendType::Memory),
        "sheets" => Ok(BackendType::Sheets),
        other => Err(Error::config(format!(
            "Invalid backend: {}. Valid options: memory, sheets",
            other
        ))),
    }
}

/// Serde adapter for durations written as `"30s"`, `"500ms"`, `"5m"`, `"1h"`
mod duration_str {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{}ms", value.as_millis()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration string like '30s' or '5m'")
            }

            fn visit_str<E>(self, value: &str) -> Result<Duration, E>
            where
                E: de::Error,
            {
                super::parse_duration(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(DurationVisitor)
    }
}

// Simple duration parser for common formats
fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|_| "Invalid milliseconds")?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().map_err(|_| "Invalid seconds")?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().map_err(|_| "Invalid minutes")?;
        Ok(Duration::from_secs(mins * 60))
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours: u64 = hours.parse().map_err(|_| "Invalid hours")?;
        Ok(Duration::from_secs(hours * 3600))
    } else {
        let secs: u64 = s.parse().map_err(|_| "Invalid duration format")?;
        Ok(Duration::from_secs(secs))
    }
}
