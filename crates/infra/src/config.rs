//! Configuration loading and representation.
//!
//! Every setting comes from an environment variable with a logged default:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `LARDER_DAMAGE_POLICY` | `clamp` | `clamp` or `reject` for invalid damage lines |
//! | `DATABASE_URL` | unset | Postgres URL; required only by [`StockConfig::connect`] |
//! | `LARDER_DB_MAX_CONNECTIONS` | `5` | pool size |

use std::env;
use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;
use tracing::{info, warn};

use larder_stock::DamagePolicy;

pub const DAMAGE_POLICY_VAR: &str = "LARDER_DAMAGE_POLICY";
pub const DATABASE_URL_VAR: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_VAR: &str = "LARDER_DB_MAX_CONNECTIONS";

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("failed to connect to database: {0}")]
    Connect(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockConfig {
    pub damage_policy: DamagePolicy,
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            damage_policy: DamagePolicy::default(),
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl StockConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, file, test map).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let damage_policy = parse_or_default(&lookup, DAMAGE_POLICY_VAR, DamagePolicy::default())?;
        let max_connections =
            parse_or_default(&lookup, MAX_CONNECTIONS_VAR, DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: MAX_CONNECTIONS_VAR,
                message: "must be at least 1".to_string(),
            });
        }

        let database_url = lookup(DATABASE_URL_VAR)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if database_url.is_none() {
            warn!("{DATABASE_URL_VAR} not set; only in-memory stores are available");
        }

        Ok(Self {
            damage_policy,
            database_url,
            max_connections,
        })
    }

    pub fn with_damage_policy(mut self, policy: DamagePolicy) -> Self {
        self.damage_policy = policy;
        self
    }

    /// Open a connection pool. Closing it is the host's responsibility.
    pub async fn connect(&self) -> Result<PgPool, ConfigError> {
        let url = self
            .database_url
            .as_deref()
            .ok_or(ConfigError::Missing(DATABASE_URL_VAR))?;

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(url)
            .await?;
        Ok(pool)
    }
}

fn parse_or_default<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + core::fmt::Display,
    T::Err: core::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                message: e.to_string(),
            })
        }
        _ => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = StockConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, StockConfig::default());
        assert_eq!(cfg.damage_policy, DamagePolicy::Clamp);
    }

    #[test]
    fn reads_policy_url_and_pool_size() {
        let cfg = StockConfig::from_lookup(lookup(&[
            (DAMAGE_POLICY_VAR, "REJECT"),
            (DATABASE_URL_VAR, " postgres://localhost/larder "),
            (MAX_CONNECTIONS_VAR, "12"),
        ]))
        .unwrap();
        assert_eq!(cfg.damage_policy, DamagePolicy::Reject);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/larder"));
        assert_eq!(cfg.max_connections, 12);
    }

    #[test]
    fn invalid_values_name_their_key() {
        let err = StockConfig::from_lookup(lookup(&[(DAMAGE_POLICY_VAR, "lenient")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: DAMAGE_POLICY_VAR, .. }));

        let err = StockConfig::from_lookup(lookup(&[(MAX_CONNECTIONS_VAR, "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: MAX_CONNECTIONS_VAR, .. }));
    }

    #[tokio::test]
    async fn connect_without_url_is_missing() {
        let err = StockConfig::default().connect().await.unwrap_err();
        assert!(matches!(err, ConfigError::Missing(DATABASE_URL_VAR)));
    }
}
