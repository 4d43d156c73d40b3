use std::{env, fmt, net::SocketAddr, path::PathBuf, time::Duration};

use chrono_tz::Tz;
use url::Url;

use super::server_bind_address;

pub const DEFAULT_STORE_DIR: &str = "available_hns";
pub const DEFAULT_STATIC_DIR: &str = "static";
pub const DEFAULT_LOOKUP_URL: &str = "https://shakestation.io/api";
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_CHECK_INTERVAL_MS: u64 = 500;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Where discovered domains are persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// One JSON file per partition inside the directory.
    Directory(PathBuf),
    /// SQLite connection string, e.g. `sqlite://scout.db?mode=rwc`.
    Sqlite(String),
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub store: StoreLocation,
    pub static_dir: PathBuf,
    pub lookup_url: Url,
    pub lookup_timeout: Duration,
    /// Minimum spacing between outbound lookups within one stream. Zero disables pacing.
    pub check_interval: Duration,
    /// Zone used to derive partition dates. `None` means the server's local zone.
    pub partition_tz: Option<Tz>,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;

        let store = match non_empty_var("APP_STORE_URL") {
            Some(url) if url.starts_with("sqlite:") => StoreLocation::Sqlite(url),
            Some(other) => return Err(ConfigError::UnsupportedStoreUrl(other)),
            None => StoreLocation::Directory(PathBuf::from(
                non_empty_var("APP_STORE_DIR").unwrap_or_else(|| DEFAULT_STORE_DIR.to_string()),
            )),
        };

        let static_dir = PathBuf::from(
            non_empty_var("APP_STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
        );

        let lookup_raw =
            non_empty_var("APP_LOOKUP_URL").unwrap_or_else(|| DEFAULT_LOOKUP_URL.to_string());
        let lookup_url = Url::parse(&lookup_raw).map_err(ConfigError::LookupUrl)?;

        let lookup_timeout = millis_var("APP_LOOKUP_TIMEOUT_MS", DEFAULT_LOOKUP_TIMEOUT_MS)?;
        let check_interval = millis_var("APP_CHECK_INTERVAL_MS", DEFAULT_CHECK_INTERVAL_MS)?;

        let partition_tz = match non_empty_var("APP_PARTITION_TZ") {
            Some(name) => Some(
                name.parse::<Tz>()
                    .map_err(|_| ConfigError::InvalidTimezone(name))?,
            ),
            None => None,
        };

        Ok(Self {
            bind_addr,
            environment,
            store,
            static_dir,
            lookup_url,
            lookup_timeout,
            check_interval,
            partition_tz,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn millis_var(name: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::InvalidMillis { name, value: raw }),
        None => Ok(Duration::from_millis(default)),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    UnsupportedStoreUrl(String),
    LookupUrl(url::ParseError),
    InvalidMillis { name: &'static str, value: String },
    InvalidTimezone(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::UnsupportedStoreUrl(value) => {
                write!(f, "APP_STORE_URL must be a sqlite: url (got {value})")
            }
            Self::LookupUrl(err) => write!(f, "invalid APP_LOOKUP_URL value: {err}"),
            Self::InvalidMillis { name, value } => {
                write!(f, "{name} must be a whole number of milliseconds (got {value})")
            }
            Self::InvalidTimezone(value) => {
                write!(f, "APP_PARTITION_TZ is not a known IANA zone (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
