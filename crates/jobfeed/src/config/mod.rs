use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use chrono::NaiveDateTime;

use crate::ingest::parser::ParseOptions;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub ingest: IngestConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "8000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            ingest: IngestConfig::load()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Tunables for the ingestion pipeline, loaded from the environment.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Abort a file at the first bad row instead of collecting every error.
    pub stop_on_first_error: bool,
    /// Override the token set recognized as boolean `true` in CSV cells.
    pub truthy_tokens: Option<Vec<String>>,
    /// Override the token set recognized as boolean `false` in CSV cells.
    pub falsy_tokens: Option<Vec<String>>,
    /// Reject vacancies whose publish date is ahead of the ingestion clock.
    pub reject_future_publish_dates: bool,
    /// Wall-clock budget for one batch in seconds; `0` disables the deadline.
    pub timeout_secs: u64,
    /// Upper bound on the multipart request body.
    pub max_upload_bytes: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            stop_on_first_error: false,
            truthy_tokens: None,
            falsy_tokens: None,
            reject_future_publish_dates: true,
            timeout_secs: 30,
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl IngestConfig {
    fn load() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            stop_on_first_error: env_flag(
                "INGEST_STOP_ON_FIRST_ERROR",
                defaults.stop_on_first_error,
            )?,
            truthy_tokens: env_tokens("INGEST_TRUTHY_TOKENS"),
            falsy_tokens: env_tokens("INGEST_FALSY_TOKENS"),
            reject_future_publish_dates: env_flag(
                "INGEST_REJECT_FUTURE_PUBLISH",
                defaults.reject_future_publish_dates,
            )?,
            timeout_secs: env_number("INGEST_TIMEOUT_SECS", defaults.timeout_secs)?,
            max_upload_bytes: env_number("INGEST_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        })
    }

    /// Cell-coercion options for one batch, anchored to the ingestion clock.
    pub fn parse_options(&self, now: NaiveDateTime) -> ParseOptions {
        let mut options = ParseOptions::new(now);
        options.stop_on_first_error = self.stop_on_first_error;
        if let Some(tokens) = &self.truthy_tokens {
            options.truthy_tokens = tokens.clone();
        }
        if let Some(tokens) = &self.falsy_tokens {
            options.falsy_tokens = tokens.clone();
        }
        options
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn env_flag(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidFlag { var }),
        },
        Err(_) => Ok(default),
    }
}

fn env_tokens(var: &'static str) -> Option<Vec<String>> {
    let raw = env::var(var).ok()?;
    let tokens: Vec<String> = raw
        .split(',')
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    (!tokens.is_empty()).then_some(tokens)
}

fn env_number<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(var) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidFlag { var: &'static str },
    InvalidNumber { var: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidFlag { var } => {
                write!(f, "{} must be a boolean flag (true/false, 1/0, yes/no)", var)
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{} must be a non-negative integer", var)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
