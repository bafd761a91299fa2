use std::env;

/// Configuration for the LifeFlow client, loaded from environment
/// variables once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the hosted data service.
    pub service_url: String,
    /// Public (anon) API key sent with every request.
    pub service_key: String,
    /// Application display name. Optional; a missing value is logged as a
    /// warning, not fatal.
    pub app_name: String,
    /// Default snapshot page size.
    pub snapshot_limit: usize,
    /// Change-feed channel capacity for in-process buses.
    pub feed_capacity: usize,
    /// Log level used when `RUST_LOG` is unset (e.g. "info", "debug").
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

impl ClientConfig {
    /// Load configuration from the environment with sensible defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (dev convenience)
        let _ = dotenvy::dotenv();

        let service_url =
            env::var("LIFEFLOW_URL").map_err(|_| ConfigError::Missing("LIFEFLOW_URL"))?;
        let service_key =
            env::var("LIFEFLOW_KEY").map_err(|_| ConfigError::Missing("LIFEFLOW_KEY"))?;
        let app_name = match env::var("LIFEFLOW_APP_NAME") {
            Ok(name) if !name.is_empty() => name,
            _ => {
                tracing::warn!("LIFEFLOW_APP_NAME is not set, defaulting to \"LifeFlow\"");
                "LifeFlow".to_string()
            }
        };

        Ok(Self {
            service_url,
            service_key,
            app_name,
            snapshot_limit: parse_var("LIFEFLOW_SNAPSHOT_LIMIT", 100)?,
            feed_capacity: parse_var("LIFEFLOW_FEED_CAPACITY", 1024)?,
            log_level: env::var("LIFEFLOW_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn parse_var(key: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var tests mutate process state; keep them in one test so they
    // cannot race each other.
    #[test]
    fn from_env_defaults_and_errors() {
        env::remove_var("LIFEFLOW_URL");
        env::remove_var("LIFEFLOW_KEY");
        assert!(matches!(
            ClientConfig::from_env(),
            Err(ConfigError::Missing("LIFEFLOW_URL"))
        ));

        env::set_var("LIFEFLOW_URL", "https://api.lifeflow.test");
        env::set_var("LIFEFLOW_KEY", "anon-key");
        env::remove_var("LIFEFLOW_APP_NAME");
        env::remove_var("LIFEFLOW_SNAPSHOT_LIMIT");

        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.app_name, "LifeFlow");
        assert_eq!(config.snapshot_limit, 100);
        assert_eq!(config.feed_capacity, 1024);

        env::set_var("LIFEFLOW_SNAPSHOT_LIMIT", "not-a-number");
        assert!(matches!(
            ClientConfig::from_env(),
            Err(ConfigError::Invalid { key: "LIFEFLOW_SNAPSHOT_LIMIT", .. })
        ));
        env::remove_var("LIFEFLOW_SNAPSHOT_LIMIT");
    }
}
