//! Service configuration, read from the environment (`.env` is loaded by `main`).

use thiserror::Error;

const DEFAULT_PORT: u16 = 8083;
const DEFAULT_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_STORE_NAME: &str = "Our Store";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} is not a valid {expected}: {value:?}")]
    Invalid { name: &'static str, expected: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// PostgreSQL URL. Without it the service runs on the in-memory store.
    pub database_url: Option<String>,
    pub port: u16,
    pub max_connections: u32,
    /// Without an SMTP host, notifications are only logged.
    pub smtp: Option<SmtpConfig>,
    /// Shop name used in customer emails.
    pub store_name: String,
    pub nats_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(get("SMTP_PORT"), "SMTP_PORT", "port", DEFAULT_SMTP_PORT)?,
                user: get("SMTP_USER"),
                pass: get("SMTP_PASS"),
                from: get("SMTP_FROM").unwrap_or_else(|| "noreply@localhost".to_string()),
            }),
            None => None,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            port: parse_or(get("PORT"), "PORT", "port", DEFAULT_PORT)?,
            max_connections: parse_or(
                get("DB_MAX_CONNECTIONS"),
                "DB_MAX_CONNECTIONS",
                "number",
                DEFAULT_MAX_CONNECTIONS,
            )?,
            smtp,
            store_name: get("STORE_NAME").unwrap_or_else(|| DEFAULT_STORE_NAME.to_string()),
            nats_url: get("NATS_URL"),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { name, expected, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.max_connections, 10);
        assert!(config.database_url.is_none());
        assert!(config.smtp.is_none());
    }

    #[test]
    fn test_smtp_section() {
        let config = Config::from_lookup(lookup(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "bot"),
            ("SMTP_PASS", "pw"),
            ("SMTP_FROM", "shop@example.com"),
        ]))
        .unwrap();
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.user.as_deref(), Some("bot"));
        assert_eq!(smtp.from, "shop@example.com");
    }

    #[test]
    fn test_invalid_port() {
        let err = Config::from_lookup(lookup(&[("PORT", "eighty")])).unwrap_err();
        let expected =
            ConfigError::Invalid { name: "PORT", expected: "port", value: "eighty".into() };
        assert_eq!(err, expected);
    }
}
