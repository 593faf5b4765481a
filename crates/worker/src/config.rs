//! Worker configuration loaded from environment variables.

use messaging::BrokerConfig;

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` (default: `"0.0.0.0"`)
/// - `PORT` (default: `3000`)
/// - `RUST_LOG` (default: `"info"`)
/// - `DATABASE_URL` (unset: in-memory store)
/// - `DATABASE_MAX_CONNECTIONS` (default: `5`)
/// - everything [`BrokerConfig`] reads
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub broker: BrokerConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.database_max_connections),
            broker: BrokerConfig::from_lookup(&lookup),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 5,
            broker: BrokerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.addr(), "0.0.0.0:3000");
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_overrides_reach_broker_config() {
        let config = Config::from_lookup(|key| match key {
            "PORT" => Some("8080".to_string()),
            "DATABASE_URL" => Some("postgres://localhost/logistics".to_string()),
            "DATABASE_MAX_CONNECTIONS" => Some("12".to_string()),
            "RABBITMQ_HOST" => Some("rabbit".to_string()),
            _ => None,
        });
        assert_eq!(config.port, 8080);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/logistics")
        );
        assert_eq!(config.database_max_connections, 12);
        assert_eq!(config.broker.host, "rabbit");
    }

    #[test]
    fn test_blank_database_url_means_in_memory() {
        let config = Config::from_lookup(|key| (key == "DATABASE_URL").then(|| " ".to_string()));
        assert!(config.database_url.is_none());
    }
}
