//! Configuration loaded from environment variables at startup.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::retry::RetryPolicy;
use crate::transfer_engine::TransferEngineConfig;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set when USE_PERSISTENT_STORES=true")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    pub jwt_secret: String,
    /// `Some` when the Postgres store should be used.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub transfer: TransferEngineConfig,
    pub lock_timeout: Duration,
    pub read_cache_ttl: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            warn!("JWT_SECRET not set; using insecure dev default");
            DEV_JWT_SECRET.to_string()
        });

        let use_persistent = lookup("USE_PERSISTENT_STORES")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        let database_url = if use_persistent {
            Some(lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?)
        } else {
            None
        };

        let max_attempts: u32 = parse(&lookup, "TRANSFER_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: "TRANSFER_MAX_ATTEMPTS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            jwt_secret,
            database_url,
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            transfer: TransferEngineConfig {
                retry: RetryPolicy {
                    max_attempts,
                    initial_backoff: Duration::from_millis(parse(
                        &lookup,
                        "TRANSFER_RETRY_BACKOFF_MS",
                        50,
                    )?),
                },
                deadline: Duration::from_millis(parse(&lookup, "TRANSFER_DEADLINE_MS", 5000)?),
            },
            lock_timeout: Duration::from_millis(parse(&lookup, "LOCK_TIMEOUT_MS", 2000)?),
            read_cache_ttl: Duration::from_secs(parse(&lookup, "READ_CACHE_TTL_SECS", 300)?),
        })
    }
}

fn parse<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.bind_addr, "0.0.0.0:8080");
        assert_eq!(s.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(s.database_url, None);
        assert_eq!(s.transfer.retry.max_attempts, 3);
        assert_eq!(s.transfer.retry.initial_backoff, Duration::from_millis(50));
        assert_eq!(s.transfer.deadline, Duration::from_secs(5));
        assert_eq!(s.lock_timeout, Duration::from_secs(2));
        assert_eq!(s.read_cache_ttl, Duration::from_secs(300));
    }

    #[test]
    fn persistent_stores_require_database_url() {
        assert_eq!(
            settings(&[("USE_PERSISTENT_STORES", "true")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
        let s = settings(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/stock"),
        ])
        .unwrap();
        assert_eq!(s.database_url.as_deref(), Some("postgres://localhost/stock"));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = settings(&[("LOCK_TIMEOUT_MS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "LOCK_TIMEOUT_MS", .. }));
        assert!(settings(&[("TRANSFER_MAX_ATTEMPTS", "0")]).is_err());
    }
}
