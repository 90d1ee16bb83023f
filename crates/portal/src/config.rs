//! Portal configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Store
//! - `PORTAL_STORE` - `postgres` (default) or `memory`
//! - `PORTAL_DATABASE_URL` - `PostgreSQL` connection string (falls back to
//!   `DATABASE_URL`; required when the store is `postgres`)
//!
//! ## Optional
//! - `PORTAL_HOST` - Bind address (default: 127.0.0.1)
//! - `PORTAL_PORT` - Listen port (default: 3000)
//! - `PORTAL_BASE_URL` - Public URL (default: <http://localhost:3000>);
//!   an `https` URL turns on secure cookies
//! - `PORTAL_UTC_OFFSET_HOURS` - Offset of the portal's local time (default: -3)
//! - `PORTAL_HOURS_OPEN` / `PORTAL_HOURS_CLOSE` - Ordering window (default: 8 / 14)
//! - `PORTAL_CART_REMINDER_MS` - Delay before an uncommitted quantity reminder
//!   (default: 2000)
//! - `PORTAL_VEHICLE_TAGS` - Comma-separated fleet tags (default: the fleet
//!   listed in [`DEFAULT_VEHICLE_TAGS`])
//! - `PORTAL_LOG_JSON` - Emit JSON logs when set to `1`/`true`
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`,
//!   `SENTRY_TRACES_SAMPLE_RATE` - Error tracking
//!
//! ## Optional (TLS)
//! - `PORTAL_TLS_CERT` - PEM-encoded certificate chain
//! - `PORTAL_TLS_KEY` - PEM-encoded private key

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use secrecy::SecretString;
use supply_desk_core::VehicleTag;
use thiserror::Error;

/// Fleet tags offered when `PORTAL_VEHICLE_TAGS` is not set.
pub const DEFAULT_VEHICLE_TAGS: &[&str] = &[
    "JX", "JY", "JZ", "KT", "KW", "KY", "LH", "LS", "MA", "ME", "MU", "VP", "VQ", "VT", "VU",
    "VV", "VW", "VX", "VY", "XA", "XS", "XT", "XU", "XV", "XX", "YA", "YC", "YF", "YG", "YJ",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Which document store backs the portal.
#[derive(Clone)]
pub enum StoreBackend {
    /// `PostgreSQL` through sqlx.
    Postgres { database_url: SecretString },
    /// Process-local store; everything is lost on exit.
    Memory,
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("database_url", &"[REDACTED]")
                .finish(),
            Self::Memory => f.write_str("Memory"),
        }
    }
}

/// Ordering window, reminders and fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingConfig {
    /// Offset of the portal's local time from UTC, in hours.
    pub utc_offset_hours: i32,
    /// First hour (inclusive) orders are accepted, local time.
    pub open_hour: u32,
    /// Hour (exclusive) orders stop being accepted, local time.
    pub close_hour: u32,
    /// Delay before reminding a user about a staged, uncommitted quantity.
    pub cart_reminder: Duration,
    /// Vehicles a technician can order for, sorted.
    pub vehicles: Vec<VehicleTag>,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: -3,
            open_hour: 8,
            close_hour: 14,
            cart_reminder: Duration::from_secs(2),
            vehicles: DEFAULT_VEHICLE_TAGS
                .iter()
                .filter_map(|tag| VehicleTag::parse(tag).ok())
                .collect(),
        }
    }
}

/// TLS configuration for HTTPS.
#[derive(Clone)]
pub struct TlsConfig {
    /// PEM-encoded certificate chain
    pub cert_pem: String,
    /// PEM-encoded private key
    pub key_pem: SecretString,
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("cert_pem", &"[CERTIFICATE]")
            .field("key_pem", &"[REDACTED]")
            .finish()
    }
}

impl TlsConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let cert_pem = get_optional_env("PORTAL_TLS_CERT");
        let key_pem = get_optional_env("PORTAL_TLS_KEY");

        match (cert_pem, key_pem) {
            (Some(cert), Some(key)) => Ok(Some(Self {
                cert_pem: cert,
                key_pem: SecretString::from(key),
            })),
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "PORTAL_TLS_*".to_string(),
                "Both PORTAL_TLS_CERT and PORTAL_TLS_KEY must be set together".to_string(),
            )),
        }
    }
}

/// Portal application configuration.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Document store backend
    pub store: StoreBackend,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL
    pub base_url: String,
    /// Business hours, reminders and fleet
    pub ordering: OrderingConfig,
    /// JSON log output instead of text
    pub log_json: bool,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// TLS configuration for HTTPS (optional)
    pub tls: Option<TlsConfig>,
}

impl PortalConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let store = match get_env_or_default("PORTAL_STORE", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres {
                database_url: get_database_url("PORTAL_DATABASE_URL")?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "PORTAL_STORE".to_string(),
                    format!("expected `postgres` or `memory`, got `{other}`"),
                ));
            }
        };
        let host = parse_env("PORTAL_HOST", "127.0.0.1")?;
        let port = parse_env("PORTAL_PORT", "3000")?;
        let base_url = get_env_or_default("PORTAL_BASE_URL", "http://localhost:3000");
        url::Url::parse(&base_url)
            .map_err(|e| ConfigError::InvalidEnvVar("PORTAL_BASE_URL".to_string(), e.to_string()))?;

        let ordering = OrderingConfig::from_env()?;
        let log_json = get_optional_env("PORTAL_LOG_JSON")
            .is_some_and(|v| matches!(v.as_str(), "1" | "true" | "yes"));

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);
        let tls = TlsConfig::from_env()?;

        Ok(Self {
            store,
            host,
            port,
            base_url,
            ordering,
            log_json,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            tls,
        })
    }

    /// Local configuration over the in-memory store, without TLS or Sentry.
    #[must_use]
    pub fn memory(ordering: OrderingConfig) -> Self {
        Self {
            store: StoreBackend::Memory,
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            ordering,
            log_json: false,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
            tls: None,
        }
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether session cookies must carry the `Secure` flag.
    #[must_use]
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl OrderingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let utc_offset_hours: i32 = parse_env("PORTAL_UTC_OFFSET_HOURS", "-3")?;
        if !(-23..=23).contains(&utc_offset_hours) {
            return Err(ConfigError::InvalidEnvVar(
                "PORTAL_UTC_OFFSET_HOURS".to_string(),
                "must be between -23 and 23".to_string(),
            ));
        }
        let open_hour: u32 = parse_env("PORTAL_HOURS_OPEN", "8")?;
        let close_hour: u32 = parse_env("PORTAL_HOURS_CLOSE", "14")?;
        if open_hour >= close_hour || close_hour > 24 {
            return Err(ConfigError::InvalidEnvVar(
                "PORTAL_HOURS_*".to_string(),
                format!("open hour {open_hour} must be before close hour {close_hour} (max 24)"),
            ));
        }
        let reminder_ms: u64 = parse_env("PORTAL_CART_REMINDER_MS", "2000")?;
        let vehicles = match get_optional_env("PORTAL_VEHICLE_TAGS") {
            Some(raw) => parse_vehicle_tags(&raw)?,
            None => defaults.vehicles,
        };

        Ok(Self {
            utc_offset_hours,
            open_hour,
            close_hour,
            cart_reminder: Duration::from_millis(reminder_ms),
            vehicles,
        })
    }
}

/// Parse a comma-separated tag list into a sorted, deduplicated fleet.
fn parse_vehicle_tags(raw: &str) -> Result<Vec<VehicleTag>, ConfigError> {
    let mut tags = raw
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(VehicleTag::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::InvalidEnvVar("PORTAL_VEHICLE_TAGS".to_string(), e.to_string()))?;
    tags.sort();
    tags.dedup();
    if tags.is_empty() {
        return Err(ConfigError::InvalidEnvVar(
            "PORTAL_VEHICLE_TAGS".to_string(),
            "at least one vehicle tag is required".to_string(),
        ));
    }
    Ok(tags)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fleet_is_sorted_and_complete() {
        let ordering = OrderingConfig::default();
        assert_eq!(ordering.vehicles.len(), DEFAULT_VEHICLE_TAGS.len());
        let mut sorted = ordering.vehicles.clone();
        sorted.sort();
        assert_eq!(sorted, ordering.vehicles);
    }

    #[test]
    fn test_parse_vehicle_tags_sorts_and_dedups() {
        let tags = parse_vehicle_tags("xt, vp,,VP").unwrap();
        let names: Vec<&str> = tags.iter().map(VehicleTag::as_str).collect();
        assert_eq!(names, vec!["VP", "XT"]);
    }

    #[test]
    fn test_parse_vehicle_tags_rejects_bad_input() {
        assert!(parse_vehicle_tags(" , ").is_err());
        assert!(parse_vehicle_tags("VP,X-T").is_err());
    }

    #[test]
    fn test_socket_addr_and_cookies() {
        let config = PortalConfig {
            store: StoreBackend::Memory,
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "https://portal.example.com".to_string(),
            ordering: OrderingConfig::default(),
            log_json: false,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 0.1,
            tls: None,
        };
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
        assert!(config.secure_cookies());
    }

    #[test]
    fn test_store_debug_redacts_url() {
        let store = StoreBackend::Postgres {
            database_url: SecretString::from("postgres://user:hunter2@db/portal"),
        };
        let debug = format!("{store:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }
}
