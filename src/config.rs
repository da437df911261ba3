//! Environment-driven configuration
//!
//! Values come from the process environment, optionally seeded from a `.env`
//! file by the server binary.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::ai::{AiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};

pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost:5432/thoughtmap";
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

/// Database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_POOL_SIZE,
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)), // 10 minutes
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
        }
    }
}

impl DatabaseConfig {
    /// `DATABASE_URL` and `DATABASE_POOL_SIZE` over the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();
        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: parse_or(
                get("DATABASE_POOL_SIZE"),
                "DATABASE_POOL_SIZE",
                defaults.max_connections,
            )?,
            connection_timeout: defaults.connection_timeout,
            idle_timeout: defaults.idle_timeout,
            max_lifetime: defaults.max_lifetime,
        })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// URL safe to write to logs
    pub fn masked_url(&self) -> String {
        mask_database_url(&self.database_url)
    }
}

/// Bearer token verification settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// HMAC secret shared with the identity provider
    pub jwt_secret: String,
}

/// Everything the server needs to start
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub ai: AiConfig,
    pub auth: AuthConfig,
    /// Standard Webhooks signing secret; the webhook route is disabled without it
    pub webhook_secret: Option<String>,
    pub bind_addr: SocketAddr,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database = DatabaseConfig::from_lookup(&lookup)?;

        let ai = AiConfig {
            api_key: get("GROQ_API_KEY").ok_or(ConfigError::Missing("GROQ_API_KEY"))?,
            base_url: get("AI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: get("AI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature: Some(parse_or(get("AI_TEMPERATURE"), "AI_TEMPERATURE", 0.7)?),
            max_tokens: None,
            timeout_seconds: parse_or(get("AI_TIMEOUT_SECS"), "AI_TIMEOUT_SECS", 60)?,
        };

        let auth = AuthConfig {
            jwt_secret: get("AUTH_JWT_SECRET").ok_or(ConfigError::Missing("AUTH_JWT_SECRET"))?,
        };

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_raw.clone(),
        })?;

        Ok(Self {
            database,
            ai,
            auth,
            webhook_secret: get("WEBHOOK_SECRET"),
            bind_addr,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    raw: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Mask sensitive information in database URL for logging
pub fn mask_database_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut masked = parsed.clone();
        if parsed.password().is_some() {
            let _ = masked.set_password(Some("***"));
        }
        masked.to_string()
    } else if url.chars().count() > 20 {
        let head: String = url.chars().take(10).collect();
        let tail: Vec<char> = url.chars().rev().take(10).collect();
        let tail: String = tail.into_iter().rev().collect();
        format!("{}***{}", head, tail)
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![("GROQ_API_KEY", "gsk_test"), ("AUTH_JWT_SECRET", "secret")]
    }

    #[test]
    fn test_defaults_applied() {
        let env = vars(&required());
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.database.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.ai.model, DEFAULT_MODEL);
        assert_eq!(config.ai.timeout_seconds, 60);
        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.webhook_secret.is_none());
    }

    #[test]
    fn test_overrides() {
        let mut pairs = required();
        pairs.extend([
            ("AI_MODEL", "llama-3.1-8b-instant"),
            ("AI_TIMEOUT_SECS", "5"),
            ("DATABASE_POOL_SIZE", "2"),
            ("WEBHOOK_SECRET", "whsec_abc"),
            ("BIND_ADDR", "127.0.0.1:8080"),
        ]);
        let env = vars(&pairs);
        let config = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.ai.model, "llama-3.1-8b-instant");
        assert_eq!(config.ai.timeout_seconds, 5);
        assert_eq!(config.database.max_connections, 2);
        assert_eq!(config.webhook_secret.as_deref(), Some("whsec_abc"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
    }

    #[test]
    fn test_missing_api_key() {
        let env = vars(&[("AUTH_JWT_SECRET", "secret")]);
        let err = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("GROQ_API_KEY"));
    }

    #[test]
    fn test_blank_secret_counts_as_missing() {
        let env = vars(&[("GROQ_API_KEY", "k"), ("AUTH_JWT_SECRET", "  ")]);
        let err = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert_eq!(err, ConfigError::Missing("AUTH_JWT_SECRET"));
    }

    #[test]
    fn test_invalid_number() {
        let mut pairs = required();
        pairs.push(("AI_TIMEOUT_SECS", "soon"));
        let env = vars(&pairs);
        let err = AppConfig::from_lookup(|k| env.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "AI_TIMEOUT_SECS", .. }));
    }

    #[test]
    fn test_database_config_from_lookup() {
        let env = vars(&[("DATABASE_URL", "postgresql://db/maps"), ("DATABASE_POOL_SIZE", "4")]);
        let config = DatabaseConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.database_url, "postgresql://db/maps");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.connection_timeout, DatabaseConfig::default().connection_timeout);

        let env = vars(&[]);
        let config = DatabaseConfig::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config, DatabaseConfig::default());
    }

    #[test]
    fn test_mask_unparseable_url_with_multibyte_chars() {
        let masked = mask_database_url("não é uma url válida: ção@db/ção");
        assert!(masked.contains("***"));
        assert!(masked.starts_with("não é uma "));
        assert!(masked.ends_with("ção@db/ção"));
    }

    #[test]
    fn test_mask_database_url() {
        let masked = mask_database_url("postgresql://app:hunter2@db:5432/thoughtmap");
        assert!(!masked.contains("hunter2"));
        assert!(masked.contains("***"));
    }
}
