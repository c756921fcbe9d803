//! Endpoint URLs: `redis://:password@host:port/db?maxActive=8&idleTimeout=60s`

use std::str::FromStr;

use kvstore_core::{KvError, KvResult};
use url::Url;

use crate::config::{KeyPrefix, RedisConfig, DEFAULT_PORT};
use crate::duration::parse_duration;

/// A [`RedisConfig`] described by a single URL.
///
/// The path selects the database (`/3`). Pool and timeout settings go in the
/// query string using the keys `connectTimeout`, `readTimeout`,
/// `writeTimeout`, `idleTimeout`, `maxActive`, `maxIdle`, `db` and `wait`.
/// Settings not given keep their [`RedisConfig::default`] value.
#[derive(Debug, Clone)]
pub struct RedisEndpoint {
    config: RedisConfig,
}

impl RedisEndpoint {
    pub fn parse(endpoint: &str) -> KvResult<Self> {
        let url = Url::parse(endpoint)
            .map_err(|e| KvError::Configuration(format!("invalid endpoint: {}", e)))?;

        match url.scheme() {
            "redis" | "tcp" => {}
            other => {
                return Err(KvError::Configuration(format!(
                    "unsupported endpoint scheme '{}'",
                    other
                )))
            }
        }

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| KvError::Configuration("endpoint has no host".to_string()))?;

        let mut config = RedisConfig::new(host, url.port().unwrap_or(DEFAULT_PORT));

        if let Some(password) = url.password() {
            let decoded = urlencoding::decode(password)
                .map_err(|e| KvError::Configuration(format!("invalid password encoding: {}", e)))?;
            config.password = Some(decoded.into_owned());
        }

        let path = url.path().trim_matches('/');
        if !path.is_empty() {
            config.db = parse_value("db", path)?;
        }

        for (name, value) in url.query_pairs() {
            apply_option(&mut config, &name, &value)?;
        }

        config.validate()?;
        Ok(Self { config })
    }

    pub fn with_prefix(mut self, prefix: KeyPrefix) -> Self {
        self.config.prefix = prefix;
        self
    }

    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    pub fn into_config(self) -> RedisConfig {
        self.config
    }
}

impl FromStr for RedisEndpoint {
    type Err = KvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn apply_option(config: &mut RedisConfig, name: &str, value: &str) -> KvResult<()> {
    match name {
        "connectTimeout" => config.connect_timeout = parse_timeout(name, value)?,
        "readTimeout" => config.read_timeout = parse_timeout(name, value)?,
        "writeTimeout" => config.write_timeout = parse_timeout(name, value)?,
        "idleTimeout" => config.idle_timeout = parse_timeout(name, value)?,
        "maxActive" => config.max_active = parse_value(name, value)?,
        "maxIdle" => config.max_idle = parse_value(name, value)?,
        "db" => config.db = parse_value(name, value)?,
        "wait" => config.wait = parse_value(name, value)?,
        other => {
            return Err(KvError::Configuration(format!(
                "unknown endpoint option '{}'",
                other
            )))
        }
    }
    Ok(())
}

fn parse_timeout(name: &str, value: &str) -> KvResult<std::time::Duration> {
    parse_duration(value).map_err(|e| KvError::Configuration(format!("{}: {}", name, e)))
}

fn parse_value<T: FromStr>(name: &str, value: &str) -> KvResult<T> {
    value
        .parse()
        .map_err(|_| KvError::Configuration(format!("{}: invalid value '{}'", name, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_minimal_endpoint_uses_defaults() {
        let endpoint = RedisEndpoint::parse("redis://cache.internal").unwrap();
        let config = endpoint.config();

        assert_eq!(config.host, "cache.internal");
        assert_eq!(config.port, 6379);
        assert_eq!(config.db, 10);
        assert!(config.password.is_none());
        assert_eq!(config.max_active, 5);
        assert_eq!(config.max_idle, 3);
        assert_eq!(config.idle_timeout, Duration::from_secs(240));
    }

    #[test]
    fn test_full_endpoint() {
        let config: RedisEndpoint =
            "redis://:p%40ss@10.0.0.5:6380/2?connectTimeout=1s&readTimeout=500ms&writeTimeout=2s&idleTimeout=1m&maxActive=8&maxIdle=4&wait=false"
                .parse()
                .unwrap();
        let config = config.into_config();

        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 6380);
        assert_eq!(config.password.as_deref(), Some("p@ss"));
        assert_eq!(config.db, 2);
        assert_eq!(config.connect_timeout, Duration::from_secs(1));
        assert_eq!(config.read_timeout, Duration::from_millis(500));
        assert_eq!(config.write_timeout, Duration::from_secs(2));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.max_active, 8);
        assert_eq!(config.max_idle, 4);
        assert!(!config.wait);
    }

    #[test]
    fn test_query_db_overrides_path() {
        let endpoint = RedisEndpoint::parse("redis://localhost/1?db=7").unwrap();
        assert_eq!(endpoint.config().db, 7);
    }

    #[test]
    fn test_with_prefix() {
        let endpoint = RedisEndpoint::parse("redis://localhost")
            .unwrap()
            .with_prefix(KeyPrefix::new("Dev", "Api"));
        assert_eq!(endpoint.config().prefix.apply("x"), "dev:api:x");
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        let cases = vec![
            "not a url",
            "http://localhost",
            "redis://localhost/abc",
            "redis://localhost?maxActive=0",
            "redis://localhost?maxActive=many",
            "redis://localhost?idleTimeout=soon",
            "redis://localhost?poolSize=3",
        ];

        for endpoint in cases {
            assert!(
                matches!(RedisEndpoint::parse(endpoint), Err(KvError::Configuration(_))),
                "Expected rejection for {}",
                endpoint
            );
        }
    }
}
