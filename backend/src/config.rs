//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum number of pooled database connections
    pub database_max_connections: u32,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,

    /// OTLP collector endpoint (optional)
    pub otel_endpoint: Option<String>,

    /// HMAC secret for signing bearer tokens
    pub jwt_secret: String,

    /// JWT access token expiry in minutes
    pub jwt_access_token_expiry_minutes: i64,

    /// Base path of the versioned API, e.g. `/api/v1`
    pub api_base_path: String,

    /// Slug of the role that can never be deleted
    pub admin_role_slug: String,

    /// Lifetime of a cached effective permission set
    pub permission_cache_ttl: Duration,

    /// How long a temporary block lasts
    pub temp_block_duration: Duration,

    /// Interval between block-expiry sweeps; always shorter than the block duration
    pub block_sweep_interval: Duration,

    /// Failed sign-ins tolerated inside the failure window
    pub signin_max_failed_attempts: u32,

    /// Window in which failed sign-ins are counted
    pub signin_failure_window: Duration,

    /// Reject non-public requests that carry no `X-Device-Id`
    pub require_device_id: bool,
}

redacted_debug!(Config {
    redact database_url,
    show database_max_connections,
    show bind_address,
    show log_level,
    show otel_endpoint,
    redact jwt_secret,
    show jwt_access_token_expiry_minutes,
    show api_base_path,
    show admin_role_slug,
    show permission_cache_ttl,
    show temp_block_duration,
    show block_sweep_interval,
    show signin_max_failed_attempts,
    show signin_failure_window,
    show require_device_id,
});

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let temp_block_minutes: u64 = parse_var("TEMP_BLOCK_DURATION_MINUTES", 15)?;
        let temp_block_duration = Duration::from_secs(temp_block_minutes * 60);
        let block_sweep_interval = match env::var("BLOCK_SWEEP_INTERVAL_SECS") {
            Ok(raw) => Duration::from_secs(parse_value("BLOCK_SWEEP_INTERVAL_SECS", &raw)?),
            Err(_) => temp_block_duration / 4,
        };

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 20)?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            otel_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| AppError::Config("JWT_SECRET not set".into()))?,
            jwt_access_token_expiry_minutes: parse_var("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", 30)?,
            api_base_path: env::var("API_BASE_PATH").unwrap_or_else(|_| "/api/v1".into()),
            admin_role_slug: env::var("ADMIN_ROLE_SLUG").unwrap_or_else(|_| "admin".into()),
            permission_cache_ttl: Duration::from_secs(parse_var("PERMISSION_CACHE_TTL_SECS", 60)?),
            temp_block_duration,
            block_sweep_interval,
            signin_max_failed_attempts: parse_var("SIGNIN_MAX_FAILED_ATTEMPTS", 5)?,
            signin_failure_window: Duration::from_secs(parse_var(
                "SIGNIN_FAILURE_WINDOW_SECS",
                900,
            )?),
            require_device_id: parse_var("REQUIRE_DEVICE_ID", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < 16 {
            return Err(AppError::Config(
                "JWT_SECRET must be at least 16 bytes".into(),
            ));
        }
        if !self.api_base_path.starts_with('/') || self.api_base_path.len() < 2 {
            return Err(AppError::Config(
                "API_BASE_PATH must start with '/' and not be the root".into(),
            ));
        }
        if self.temp_block_duration.is_zero() {
            return Err(AppError::Config(
                "TEMP_BLOCK_DURATION_MINUTES must be positive".into(),
            ));
        }
        if chrono::Duration::from_std(self.temp_block_duration).is_err() {
            return Err(AppError::Config(
                "TEMP_BLOCK_DURATION_MINUTES is out of range".into(),
            ));
        }
        if self.block_sweep_interval.is_zero()
            || self.block_sweep_interval >= self.temp_block_duration
        {
            return Err(AppError::Config(
                "BLOCK_SWEEP_INTERVAL_SECS must be positive and shorter than the block duration"
                    .into(),
            ));
        }
        if self.permission_cache_ttl.is_zero() {
            return Err(AppError::Config(
                "PERMISSION_CACHE_TTL_SECS must be positive".into(),
            ));
        }
        if self.signin_max_failed_attempts == 0 {
            return Err(AppError::Config(
                "SIGNIN_MAX_FAILED_ATTEMPTS must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Configuration suitable for tests and local experiments.
    pub fn for_testing() -> Self {
        Self {
            database_url: "postgres://localhost/realty_test".into(),
            database_max_connections: 5,
            bind_address: "127.0.0.1:0".into(),
            log_level: "debug".into(),
            otel_endpoint: None,
            jwt_secret: "test-secret-please-change-me".into(),
            jwt_access_token_expiry_minutes: 30,
            api_base_path: "/api/v1".into(),
            admin_role_slug: "admin".into(),
            permission_cache_ttl: Duration::from_secs(60),
            temp_block_duration: Duration::from_secs(15 * 60),
            block_sweep_interval: Duration::from_secs(15 * 60 / 4),
            signin_max_failed_attempts: 5,
            signin_failure_window: Duration::from_secs(900),
            require_device_id: false,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => parse_value(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Config(format!("{} has an invalid value: {:?}", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testing_config_is_valid() {
        Config::for_testing().validate().unwrap();
    }

    #[test]
    fn test_sweep_interval_must_be_shorter_than_block() {
        let mut config = Config::for_testing();
        config.block_sweep_interval = config.temp_block_duration;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_block_duration_must_fit_timestamps() {
        let mut config = Config::for_testing();
        config.temp_block_duration = Duration::MAX;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_base_path_must_be_absolute() {
        let mut config = Config::for_testing();
        config.api_base_path = "api/v1".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_value_rejects_garbage() {
        let parsed: Result<u64> = parse_value("PERMISSION_CACHE_TTL_SECS", "sixty");
        assert!(parsed.is_err());
        let parsed: u64 = parse_value("PERMISSION_CACHE_TTL_SECS", " 90 ").unwrap();
        assert_eq!(parsed, 90);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", Config::for_testing());
        assert!(!rendered.contains("test-secret-please-change-me"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
