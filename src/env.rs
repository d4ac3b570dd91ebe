use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// One year.
pub const MAX_SESSION_HOURS: i64 = 24 * 366;
/// One day.
pub const MAX_RESET_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: String,
    pub session_hours: i64,
    pub password_reset_minutes: i64,
    pub otlp_endpoint: Option<String>,
    pub otlp_api_key: Option<String>,
    pub deployment_environment: String,
}

impl Config {
    /// Reads the process environment. Call `load_environment` first so the
    /// layered env files are in place.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = dotenvy::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        Ok(Self {
            database_url,
            session_hours: positive_int("SESSION_HOURS", 12, MAX_SESSION_HOURS)?,
            password_reset_minutes: positive_int("PASSWORD_RESET_MINUTES", 30, MAX_RESET_MINUTES)?,
            otlp_endpoint: non_empty("OTEL_EXPORTER_OTLP_ENDPOINT"),
            otlp_api_key: non_empty("OTEL_API_KEY"),
            deployment_environment: dotenvy::var("DEPLOYMENT_ENVIRONMENT")
                .unwrap_or_else(|_| "develop".to_string()),
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    dotenvy::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn positive_int(key: &str, default: i64, max: i64) -> Result<i64, ConfigError> {
    let Ok(raw) = dotenvy::var(key) else {
        return Ok(default);
    };

    match raw.trim().parse::<i64>() {
        Ok(n) if n > 0 && n <= max => Ok(n),
        Ok(n) if n > max => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("{} is above the limit of {}", n, max),
        )),
        _ => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a positive integer", raw),
        )),
    }
}

pub fn load_environment() -> Result<(), dotenvy::Error> {
    let is_production =
        dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production";

    let env_files = if is_production {
        ["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        ["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), dotenvy::Error> {
    if !Path::new(path).exists() {
        warn!("Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}
