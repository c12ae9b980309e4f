//! SSO hierarchy against a real Redis.
//!
//! Tests use testcontainers to spin up a Redis instance and are ignored by
//! default. Run with `--ignored` where Docker is available.

use std::sync::Arc;

use ssogate_auth::{AuthorizeOptions, AuthorizeParams, Client, OAuthServer, OAuthServerConfig};
use ssogate_sso::{KeyTtl, RedisConfig, SsoConfig, SsoStorage, create_kv_store};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::redis::Redis;
use tokio::sync::OnceCell;

// Shared Redis container for all tests
static SHARED_REDIS: OnceCell<(ContainerAsync<Redis>, String)> = OnceCell::const_new();

async fn get_redis_url() -> String {
    let (_, url) = SHARED_REDIS
        .get_or_init(|| async {
            let container = Redis::default()
                .start()
                .await
                .expect("start redis container");

            let host_port = container.get_host_port_ipv4(6379).await.expect("get port");
            let url = format!("redis://127.0.0.1:{}", host_port);

            (container, url)
        })
        .await;

    url.clone()
}

async fn redis_config() -> RedisConfig {
    RedisConfig {
        enabled: true,
        url: get_redis_url().await,
        ..Default::default()
    }
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_store_roundtrip() {
    let store = create_kv_store(&redis_config().await).await;
    assert_eq!(store.mode(), "redis");

    store.set_ex("t:key", "value", 60).await.unwrap();
    assert_eq!(store.get("t:key").await.unwrap().as_deref(), Some("value"));
    assert!(matches!(store.ttl("t:key").await.unwrap(), KeyTtl::Expires(s) if s <= 60));

    assert!(store.expire("t:key", 5).await.unwrap());
    assert!(store.ttl("t:key").await.unwrap().seconds().unwrap() <= 5);

    store.del("t:key").await.unwrap();
    assert_eq!(store.get("t:key").await.unwrap(), None);
    assert_eq!(store.ttl("t:key").await.unwrap(), KeyTtl::Missing);
    assert!(!store.expire("t:key", 5).await.unwrap());
}

#[tokio::test]
#[ignore = "requires docker"]
async fn test_redis_login_and_logout() {
    let store = create_kv_store(&redis_config().await).await;
    let storage = Arc::new(SsoStorage::new(store, SsoConfig::default()));
    storage
        .put_client(&Client::new("redis-client", "secret", "http://localhost/cb"))
        .await
        .unwrap();
    let server = OAuthServer::new(OAuthServerConfig::default(), storage.clone());

    let mut request = server
        .handle_authorize_request(AuthorizeParams {
            response_type: "login".to_string(),
            ..Default::default()
        })
        .await;
    request
        .build(AuthorizeOptions::authorized().with_uid(77))
        .await
        .unwrap();
    let parent = request.parent_token().unwrap().token.clone();

    assert_eq!(storage.get_uid_by_parent_token(&parent).await.unwrap(), 77);
    let view = storage.parent_session(&parent).await.unwrap().unwrap();
    assert!(view.ttl.unwrap() > 0);

    storage.remove_parent_token(&parent).await.unwrap();
    assert!(storage.get_uid_by_parent_token(&parent).await.is_err());
    let index = storage.user_index(77).await.unwrap();
    assert!(index.is_none_or(|view| !view.record.parent_sessions.contains(&parent)));
}
