//! Integration tests against a real Redis server.
//!
//! These start a Redis container and are ignored by default:
//! `cargo test -p kvstore-redis -- --ignored`

use std::time::Duration;

use kvstore_core::{KvStorage, Scope, NO_EXPIRY};
use kvstore_redis::{KeyPrefix, RedisConfig, RedisKvStorage};
use serde::{Deserialize, Serialize};
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Session {
    user_id: u64,
    token: String,
}

async fn start_redis() -> anyhow::Result<(ContainerAsync<GenericImage>, RedisConfig)> {
    let container = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379.tcp())
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
        .start()
        .await?;

    let port = container.get_host_port_ipv4(6379).await?;
    let config = RedisConfig::new("127.0.0.1", port).with_prefix(KeyPrefix::new("Test", "KvStore"));

    Ok((container, config))
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_store_load_round_trip() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let storage = RedisKvStorage::connect(&config).unwrap();

    let session = Session {
        user_id: 42,
        token: "token-abc".to_string(),
    };
    storage.store("session:42", &session, NO_EXPIRY).await.unwrap();

    let loaded: Option<Session> = storage.fetch("session:42").await.unwrap();
    assert_eq!(loaded, Some(session));

    let mut missing = "sentinel".to_string();
    storage.load("session:43", &mut missing).await.unwrap();
    assert_eq!(missing, "sentinel");
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_session_expires() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let storage = RedisKvStorage::connect(&config).unwrap();

    storage
        .store("session:42", "token-abc", Duration::from_secs(1))
        .await
        .unwrap();

    let mut v = String::new();
    storage.load("session:42", &mut v).await.unwrap();
    assert_eq!(v, "token-abc");

    tokio::time::sleep(Duration::from_secs(2)).await;

    let mut v = String::new();
    storage.load("session:42", &mut v).await.unwrap();
    assert!(v.is_empty());
    storage.load("session:42", &mut v).await.unwrap();
    assert!(v.is_empty());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_sub_second_ttl_is_not_dropped() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let storage = RedisKvStorage::connect(&config).unwrap();

    storage
        .store("otp", "918273", Duration::from_millis(300))
        .await
        .unwrap();

    let v: Option<String> = storage.fetch("otp").await.unwrap();
    assert_eq!(v.as_deref(), Some("918273"));

    tokio::time::sleep(Duration::from_millis(1500)).await;
    let v: Option<String> = storage.fetch("otp").await.unwrap();
    assert!(v.is_none());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_load_and_del_consumes_once() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let storage = RedisKvStorage::connect(&config).unwrap();

    storage.store("k", "v", NO_EXPIRY).await.unwrap();

    let mut d = String::new();
    storage.load_and_del("k", &mut d).await.unwrap();
    assert_eq!(d, "v");

    let mut d2 = String::new();
    storage.load("k", &mut d2).await.unwrap();
    assert!(d2.is_empty());

    // Deleting what is already gone is fine.
    storage.del("k").await.unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_concurrent_load_and_del_delivers_once() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let storage = RedisKvStorage::connect(&config).unwrap();

    storage.store("ticket", "only-once", NO_EXPIRY).await.unwrap();

    let tasks = (0..20).map(|_| {
        let storage = storage.clone();
        tokio::spawn(async move { storage.fetch_and_del::<String>("ticket").await })
    });

    let delivered = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .filter(Option::is_some)
        .count();
    assert_eq!(delivered, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_prefixes_do_not_collide() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");

    let staging =
        RedisKvStorage::connect(&config.clone().with_prefix(KeyPrefix::new("staging", "shop")))
            .unwrap();
    let production =
        RedisKvStorage::connect(&config.with_prefix(KeyPrefix::new("production", "shop")))
            .unwrap();

    staging.store("flag", &1, NO_EXPIRY).await.unwrap();
    production.store("flag", &2, NO_EXPIRY).await.unwrap();

    assert_eq!(staging.fetch::<i32>("flag").await.unwrap(), Some(1));
    assert_eq!(production.fetch::<i32>("flag").await.unwrap(), Some(2));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_single_connection_pool_serializes_callers() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let config = RedisConfig {
        max_active: 1,
        max_idle: 1,
        ..config
    };
    let storage = RedisKvStorage::connect(&config).unwrap();

    let (a, b) = tokio::join!(
        storage.store("a", "1", NO_EXPIRY),
        storage.store("b", "2", NO_EXPIRY)
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(storage.executor().pool_stats().active, 0);
    assert_eq!(storage.executor().pool_stats().idle, 1);
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_scope_deadline_applies_to_calls() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let config = RedisConfig {
        max_active: 1,
        ..config
    };
    let storage = RedisKvStorage::connect(&config).unwrap();

    // Park the only connection inside a blocking pop.
    let blocker = storage.executor().clone();
    let parked = tokio::spawn(async move {
        blocker
            .exec(
                &Scope::background(),
                kvstore_redis::Command::new("BLPOP").arg("never").arg(2),
            )
            .await
    });
    tokio::time::sleep(Duration::from_millis(200)).await;

    let scoped = storage.with_scope(Scope::background().with_timeout(Duration::from_millis(100)));
    let err = scoped.fetch::<String>("k").await.unwrap_err();
    assert!(err.is_canceled());

    parked.await.unwrap().unwrap();
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_liveness_check() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let storage = RedisKvStorage::connect(&config).unwrap();

    let status = storage.liveness_check().await;
    assert_eq!(status.len(), 1);
    assert_eq!(status.get(&config.address()).map(String::as_str), Some("ok"));
}

#[tokio::test]
#[ignore] // Requires Docker
async fn test_maximum_ttl_keeps_key() {
    let (_container, config) = start_redis().await.expect("Failed to start Redis");
    let storage = RedisKvStorage::connect(&config).unwrap();

    storage.store("forever", "v", Duration::MAX).await.unwrap();

    let loaded: Option<String> = storage.fetch("forever").await.unwrap();
    assert_eq!(loaded.as_deref(), Some("v"));
}
