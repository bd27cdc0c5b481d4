use std::{str::FromStr, time::Duration};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mongodb_uri: String,
    pub database_name: String,
    pub host: String,
    pub port: u16,
    pub server_base_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub backend_timeout: Duration,
    pub import: ImportConfig,
    pub calendar_source_limit: i64,
    pub cors_origins: Vec<String>,
}

/// Limits applied to bulk asset imports.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub max_rows: usize,
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            max_rows: 100,
            batch_size: 10,
            batch_delay: Duration::from_millis(500),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |name: &'static str, default: &str| -> String {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|value| !value.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let import = ImportConfig {
            max_rows: parse(&lookup, "IMPORT_MAX_ROWS", 100)?,
            batch_size: parse::<usize, _>(&lookup, "IMPORT_BATCH_SIZE", 10)?.max(1),
            batch_delay: Duration::from_millis(parse(&lookup, "IMPORT_BATCH_DELAY_MS", 500)?),
        };

        Ok(Self {
            mongodb_uri: text("MONGODB_URI", "mongodb://localhost:27017"),
            database_name: text("DATABASE_NAME", "cmms"),
            host: text("HOST", "127.0.0.1"),
            port: parse(&lookup, "PORT", 8000)?,
            server_base_url: text("SERVER_BASE_URL", "http://localhost:5000")
                .trim_end_matches('/')
                .to_string(),
            jwt_secret,
            jwt_expiry_hours: parse(&lookup, "JWT_EXPIRY_HOURS", 24)?,
            backend_timeout: Duration::from_secs(parse(&lookup, "BACKEND_TIMEOUT_SECS", 30)?),
            import,
            calendar_source_limit: parse(&lookup, "CALENDAR_SOURCE_LIMIT", 500)?,
            cors_origins: text("CORS_ORIGINS", "*")
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|_| ConfigError::Invalid { name, value })
        }
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_secret_is_set() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.database_name, "cmms");
        assert_eq!(config.port, 8000);
        assert_eq!(config.import.max_rows, 100);
        assert_eq!(config.import.batch_size, 10);
        assert_eq!(config.calendar_source_limit, 500);
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let error = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(error, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn invalid_number_is_reported_with_its_name() {
        let error = Config::from_lookup(lookup(&[("JWT_SECRET", "x"), ("PORT", "eighty")]))
            .unwrap_err();
        assert_eq!(
            error,
            ConfigError::Invalid {
                name: "PORT",
                value: "eighty".to_string()
            }
        );
    }

    #[test]
    fn base_url_loses_trailing_slash() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "x"),
            ("SERVER_BASE_URL", "http://backend:5000/"),
            ("CORS_ORIGINS", "http://a.test, http://b.test"),
        ]))
        .unwrap();
        assert_eq!(config.server_base_url, "http://backend:5000");
        assert_eq!(config.cors_origins.len(), 2);
    }
}
