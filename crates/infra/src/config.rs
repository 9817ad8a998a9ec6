//! Service configuration sourced from environment variables.
//!
//! The resulting [`AppConfig`] is built once at startup and handed to the
//! codec, the store and the router; nothing downstream reads the environment.

use std::net::SocketAddr;

use thiserror::Error;

const DEV_JWT_SECRET: &str = "looma-insecure-dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl core::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // urls may embed credentials
        f.debug_struct("DatabaseConfig")
            .field("max_connections", &self.max_connections)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub id_secret: String,
    pub id_codec_version: u32,
    pub database: Option<DatabaseConfig>,
    /// Set when `LOOMA_DEV` allowed the built-in JWT secret.
    pub insecure_dev_secret: bool,
}

impl core::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("id_codec_version", &self.id_codec_version)
            .field("database", &self.database)
            .field("insecure_dev_secret", &self.insecure_dev_secret)
            .finish_non_exhaustive()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = get("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                key: "BIND_ADDR",
                reason: e.to_string(),
            })?;

        let dev = get("LOOMA_DEV").is_some_and(|v| parse_bool(&v));
        let (jwt_secret, insecure_dev_secret) = match get("JWT_SECRET") {
            Some(secret) => (secret, false),
            None if dev => (DEV_JWT_SECRET.to_string(), true),
            None => return Err(ConfigError::Missing("JWT_SECRET")),
        };
        let id_secret = get("ID_SECRET_KEY").unwrap_or_else(|| jwt_secret.clone());

        let id_codec_version = match get("ID_CODEC_VERSION") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key: "ID_CODEC_VERSION",
                reason: format!("expected an unsigned integer, got '{raw}'"),
            })?,
            None => 1,
        };

        let database = match get("DATABASE_URL") {
            Some(url) => {
                let max_connections = match get("DATABASE_MAX_CONNECTIONS") {
                    Some(raw) => raw
                        .parse()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| ConfigError::Invalid {
                            key: "DATABASE_MAX_CONNECTIONS",
                            reason: format!("expected a positive integer, got '{raw}'"),
                        })?,
                    None => 10,
                };
                Some(DatabaseConfig {
                    url: normalize_database_url(&url),
                    max_connections,
                })
            }
            None => None,
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            id_secret,
            id_codec_version,
            database,
            insecure_dev_secret,
        })
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Rewrites the legacy `postgres://` scheme to `postgresql://`.
pub fn normalize_database_url(url: &str) -> String {
    match url.strip_prefix("postgres://") {
        Some(rest) => format!("postgresql://{rest}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = load(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(cfg.id_secret, "s3cret");
        assert_eq!(cfg.id_codec_version, 1);
        assert!(cfg.database.is_none());
        assert!(!cfg.insecure_dev_secret);
    }

    #[test]
    fn jwt_secret_required_outside_dev() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing("JWT_SECRET"));

        let cfg = load(&[("LOOMA_DEV", "true")]).unwrap();
        assert!(cfg.insecure_dev_secret);
        assert_eq!(cfg.jwt_secret, DEV_JWT_SECRET);
    }

    #[test]
    fn id_secret_overrides_fallback() {
        let cfg = load(&[("JWT_SECRET", "a"), ("ID_SECRET_KEY", "b"), ("ID_CODEC_VERSION", "3")]).unwrap();
        assert_eq!(cfg.id_secret, "b");
        assert_eq!(cfg.id_codec_version, 3);
    }

    #[test]
    fn database_url_is_normalized() {
        let cfg = load(&[
            ("JWT_SECRET", "a"),
            ("DATABASE_URL", "postgres://u:p@db/looma"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
        ])
        .unwrap();
        let db = cfg.database.unwrap();
        assert_eq!(db.url, "postgresql://u:p@db/looma");
        assert_eq!(db.max_connections, 4);
        assert!(!format!("{db:?}").contains("u:p"));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        assert!(matches!(
            load(&[("JWT_SECRET", "a"), ("ID_CODEC_VERSION", "x")]),
            Err(ConfigError::Invalid { key: "ID_CODEC_VERSION", .. })
        ));
        assert!(matches!(
            load(&[("JWT_SECRET", "a"), ("DATABASE_URL", "postgresql://x"), ("DATABASE_MAX_CONNECTIONS", "0")]),
            Err(ConfigError::Invalid { key: "DATABASE_MAX_CONNECTIONS", .. })
        ));
        assert!(load(&[("JWT_SECRET", "a"), ("BIND_ADDR", "nope")]).is_err());
    }
}
