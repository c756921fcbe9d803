//! Redis-backed implementation of the storage capability

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kvstore_core::{KvError, KvResult, KvStorage, Scope};
use redis::Value;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{KeyPrefix, RedisConfig};
use crate::endpoint::RedisEndpoint;
use crate::executor::{Command, Executor};

/// Wire format of a stored value: `{"value": <payload>}`
#[derive(Serialize)]
struct EnvelopeRef<'a, T: ?Sized> {
    value: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    value: T,
}

/// Longest TTL sent with EXPIRE. Redis rejects expiry times whose millisecond
/// deadline would overflow an i64, so longer TTLs are capped here.
pub const MAX_EXPIRE_SECONDS: u64 = i64::MAX as u64 / 1000 / 2;

/// Whole seconds for EXPIRE. Partial seconds round up so that a short TTL
/// never turns into "no expiry" or "expire immediately".
pub fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = if ttl.subsec_nanos() > 0 {
        ttl.as_secs().saturating_add(1)
    } else {
        ttl.as_secs()
    };
    secs.min(MAX_EXPIRE_SECONDS)
}

/// Storage backed by a remote Redis server.
///
/// Keys are namespaced with a [`KeyPrefix`]; expiry is left to Redis' own
/// per-key TTL. Clones share one connection pool.
#[derive(Clone)]
pub struct RedisKvStorage {
    executor: Executor,
    prefix: Arc<KeyPrefix>,
    scope: Scope,
}

impl RedisKvStorage {
    pub fn new(executor: Executor, prefix: KeyPrefix) -> Self {
        Self {
            executor,
            prefix: Arc::new(prefix),
            scope: Scope::background(),
        }
    }

    /// Build the pool for `config`. Connections are opened on first use.
    pub fn connect(config: &RedisConfig) -> KvResult<Self> {
        Ok(Self::new(Executor::new(config)?, config.prefix.clone()))
    }

    /// [`RedisKvStorage::connect`] for an endpoint URL, see [`RedisEndpoint`]
    pub fn from_url(endpoint: &str, prefix: KeyPrefix) -> KvResult<Self> {
        let config = RedisEndpoint::parse(endpoint)?.with_prefix(prefix).into_config();
        Self::connect(&config)
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    /// PING through the pool; see [`Executor::liveness_check`]
    pub async fn liveness_check(&self) -> HashMap<String, String> {
        self.executor.liveness_check(&self.scope).await
    }

    fn encode<T: Serialize + ?Sized>(value: &T) -> KvResult<Vec<u8>> {
        serde_json::to_vec(&EnvelopeRef { value }).map_err(|e| KvError::Serialization(e.to_string()))
    }

    fn decode<T: DeserializeOwned>(key: &str, reply: &Value) -> KvResult<Option<T>> {
        let bytes: Option<Vec<u8>> = redis::from_redis_value(reply)
            .map_err(|e| KvError::Protocol(format!("unexpected reply to GET {}: {}", key, e)))?;

        match bytes {
            Some(bytes) => serde_json::from_slice::<Envelope<T>>(&bytes)
                .map(|envelope| Some(envelope.value))
                .map_err(|e| KvError::decode(key, e)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl KvStorage for RedisKvStorage {
    async fn store<T>(&self, key: &str, value: &T, ttl: Duration) -> KvResult<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        let payload = Self::encode(value)?;
        let key = self.prefix.apply(key);

        let set = Command::new("SET").arg(&key).arg(payload);
        if ttl.is_zero() {
            self.executor.exec(&self.scope, set).await?;
        } else {
            let expire = Command::new("EXPIRE").arg(&key).arg(ttl_seconds(ttl));
            self.executor
                .exec_atomic(&self.scope, vec![set, expire])
                .await?;
        }
        Ok(())
    }

    async fn fetch<T>(&self, key: &str) -> KvResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let reply = self
            .executor
            .exec(&self.scope, Command::new("GET").arg(self.prefix.apply(key)))
            .await?;
        Self::decode(key, &reply)
    }

    async fn fetch_and_del<T>(&self, key: &str) -> KvResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let wire_key = self.prefix.apply(key);
        let replies = self
            .executor
            .exec_atomic(
                &self.scope,
                vec![
                    Command::new("GET").arg(&wire_key),
                    Command::new("DEL").arg(&wire_key),
                ],
            )
            .await?;

        match replies.first() {
            Some(reply) => Self::decode(key, reply),
            None => Err(KvError::Protocol(format!(
                "empty transaction reply for {}",
                key
            ))),
        }
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        self.executor
            .exec(&self.scope, Command::new("DEL").arg(self.prefix.apply(key)))
            .await?;
        Ok(())
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn with_scope(&self, scope: Scope) -> Self {
        Self {
            executor: self.executor.clone(),
            prefix: Arc::clone(&self.prefix),
            scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_rounds_partial_seconds_up() {
        let cases = vec![
            (Duration::from_millis(1), 1),
            (Duration::from_millis(999), 1),
            (Duration::from_secs(1), 1),
            (Duration::from_millis(1500), 2),
            (Duration::from_secs(300), 300),
            (Duration::from_secs(MAX_EXPIRE_SECONDS), MAX_EXPIRE_SECONDS),
            (Duration::from_secs(u64::MAX), MAX_EXPIRE_SECONDS),
            (Duration::MAX, MAX_EXPIRE_SECONDS),
        ];

        for (ttl, expected) in cases {
            assert_eq!(ttl_seconds(ttl), expected, "Failed for {:?}", ttl);
        }
    }

    #[test]
    fn test_envelope_format() {
        let bytes = RedisKvStorage::encode("token-abc").unwrap();
        assert_eq!(bytes, br#"{"value":"token-abc"}"#);

        let bytes = RedisKvStorage::encode(&vec![1, 2, 3]).unwrap();
        assert_eq!(bytes, br#"{"value":[1,2,3]}"#);
    }

    #[test]
    fn test_decode_bulk_string() {
        let reply = Value::BulkString(br#"{"value":{"user_id":42}}"#.to_vec());
        let decoded: Option<HashMap<String, u64>> = RedisKvStorage::decode("k", &reply).unwrap();
        assert_eq!(decoded.unwrap()["user_id"], 42);
    }

    #[test]
    fn test_decode_nil_is_absent() {
        let decoded: Option<String> = RedisKvStorage::decode("k", &Value::Nil).unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn test_decode_incompatible_destination() {
        let reply = Value::BulkString(br#"{"value":"text"}"#.to_vec());
        let result: KvResult<Option<u64>> = RedisKvStorage::decode("k", &reply);
        assert!(matches!(result, Err(KvError::Decode { .. })));
    }

    #[test]
    fn test_decode_unexpected_reply() {
        let reply = Value::Int(5);
        let result: KvResult<Option<String>> = RedisKvStorage::decode("k", &reply);
        assert!(matches!(result, Err(KvError::Protocol(_))));
    }

    #[test]
    fn test_unserializable_value_is_rejected_before_io() {
        let mut bad: HashMap<(u8, u8), u8> = HashMap::new();
        bad.insert((1, 2), 3);
        assert!(matches!(
            RedisKvStorage::encode(&bad),
            Err(KvError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_with_scope_keeps_original_scope() {
        let storage = RedisKvStorage::connect(
            &RedisConfig::default().with_prefix(KeyPrefix::new("test", "kv")),
        )
        .unwrap();
        let scoped = storage.with_scope(Scope::background());
        scoped.scope().cancel();

        assert!(!storage.scope().is_canceled());
        assert_eq!(scoped.prefix().apply("k"), "test:kv:k");
        assert!(matches!(
            scoped.fetch::<String>("k").await,
            Err(KvError::Canceled)
        ));
    }
}
