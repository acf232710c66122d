use crate::{ConfigError, FromEnv};

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Redis connection settings for the queue broker.
///
/// Credentials, database index and transport (`redis://`, `rediss://`,
/// `redis+unix://`) all travel inside the URL.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl FromEnv for RedisConfig {
    /// Reads `REDIS_URL`, then the legacy `REDIS_HOST`, then the local default.
    fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("REDIS_URL")
            .or_else(|_| std::env::var("REDIS_HOST"))
            .unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());

        if !url.starts_with("redis://")
            && !url.starts_with("rediss://")
            && !url.starts_with("redis+unix://")
        {
            return Err(ConfigError::ParseError {
                key: "REDIS_URL".to_string(),
                details: format!("unsupported scheme in '{}'", url),
            });
        }

        Ok(Self { url })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_defaults_to_localhost() {
        temp_env::with_vars([("REDIS_URL", None::<&str>), ("REDIS_HOST", None)], || {
            let config = RedisConfig::from_env().unwrap();
            assert_eq!(config.url, DEFAULT_REDIS_URL);
        });
    }

    #[test]
    fn test_redis_config_prefers_redis_url() {
        temp_env::with_vars(
            [
                ("REDIS_URL", Some("redis://queue:6380/2")),
                ("REDIS_HOST", Some("redis://other:6379")),
            ],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.url, "redis://queue:6380/2");
            },
        );
    }

    #[test]
    fn test_redis_config_falls_back_to_redis_host() {
        temp_env::with_vars(
            [("REDIS_URL", None), ("REDIS_HOST", Some("rediss://secure:6379"))],
            || {
                let config = RedisConfig::from_env().unwrap();
                assert_eq!(config.url, "rediss://secure:6379");
            },
        );
    }

    #[test]
    fn test_redis_config_rejects_unknown_scheme() {
        temp_env::with_var("REDIS_URL", Some("http://localhost:6379"), || {
            let err = RedisConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("REDIS_URL"));
        });
    }
}
