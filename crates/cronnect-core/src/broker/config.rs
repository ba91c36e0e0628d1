//! Broker connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis broker connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker address as host:port
    #[serde(default = "default_addr")]
    pub addr: String,

    /// Authentication password
    #[serde(default)]
    pub password: Option<String>,

    /// Database number (0-15)
    #[serde(default)]
    pub database: u8,

    /// Connection timeout
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            password: None,
            database: 0,
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl BrokerConfig {
    /// Build configuration from `REDIS_ADDR` / `REDIS_PASSWORD` / `REDIS_DB`
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("REDIS_ADDR") {
            if !addr.is_empty() {
                config.addr = addr;
            }
        }

        if let Ok(password) = std::env::var("REDIS_PASSWORD") {
            if !password.is_empty() {
                config.password = Some(password);
            }
        }

        if let Ok(db) = std::env::var("REDIS_DB") {
            if let Ok(db) = db.parse() {
                config.database = db;
            }
        }

        config
    }

    /// Build the redis:// connection URL
    pub fn connection_url(&self) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{}/{}", password, self.addr, self.database),
            None => format!("redis://{}/{}", self.addr, self.database),
        }
    }

    /// Get connect timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_addr() -> String {
    "127.0.0.1:6379".to_string()
}

fn default_connect_timeout() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrokerConfig::default();
        assert_eq!(config.addr, "127.0.0.1:6379");
        assert_eq!(config.database, 0);
        assert_eq!(config.connect_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_connection_url_without_password() {
        let config = BrokerConfig::default();
        assert_eq!(config.connection_url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn test_connection_url_with_password_and_db() {
        let config = BrokerConfig {
            addr: "redis.internal:6380".to_string(),
            password: Some("hunter2".to_string()),
            database: 3,
            ..Default::default()
        };
        assert_eq!(config.connection_url(), "redis://:hunter2@redis.internal:6380/3");
    }
}
