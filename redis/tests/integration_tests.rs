//! Integration tests for `RedisCache` using testcontainers.
//!
//! # Requirements
//!
//! Docker must be running. Run with `cargo test -p book-exchange-redis -- --ignored`.

#![allow(clippy::expect_used)] // Test code uses expect for clear failure messages

use book_exchange_core::cache::{Cache, CacheExt};
use book_exchange_redis::RedisCache;
use std::time::Duration;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;

async fn setup_redis_cache() -> (ContainerAsync<Redis>, RedisCache) {
    let container = Redis::default()
        .start()
        .await
        .expect("Failed to start redis container");

    let port = container
        .get_host_port_ipv4(6379)
        .await
        .expect("Failed to get redis port");
    let url = format!("redis://127.0.0.1:{port}");

    let mut retries = 0;
    loop {
        if let Ok(cache) = RedisCache::new(&url).await {
            return (container, cache);
        }
        assert!(retries < 30, "Failed to connect to redis");
        retries += 1;
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_set_get_del() {
    let (_container, cache) = setup_redis_cache().await;

    cache
        .set("book:abc", b"{\"title\":\"Dune\"}".to_vec(), Duration::from_secs(60))
        .await
        .expect("set");
    let value = cache.get("book:abc").await.expect("get");
    assert_eq!(value.as_deref(), Some(b"{\"title\":\"Dune\"}".as_slice()));

    cache
        .del(&["book:abc".to_string(), "books:all".to_string()])
        .await
        .expect("del");
    assert_eq!(cache.get("book:abc").await.expect("get"), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_entries_expire() {
    let (_container, cache) = setup_redis_cache().await;

    cache
        .set("books:all", b"[]".to_vec(), Duration::from_secs(1))
        .await
        .expect("set");
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert_eq!(cache.get("books:all").await.expect("get"), None);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_typed_json_round_trip() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Snapshot {
        title: String,
    }

    let (_container, cache) = setup_redis_cache().await;
    let snapshot = vec![Snapshot {
        title: "Emma".to_string(),
    }];

    cache
        .set_json("books:genre:classic", &snapshot, Duration::from_secs(60))
        .await
        .expect("set_json");
    let read: Option<Vec<Snapshot>> = cache.get_json("books:genre:classic").await.expect("get_json");
    assert_eq!(read, Some(snapshot));
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_empty_del_is_noop() {
    let (_container, cache) = setup_redis_cache().await;
    cache.del(&[]).await.expect("empty del");
}
