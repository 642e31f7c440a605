use newsfeed_core::traits::ShortTermCache;
use newsfeed_db::RedisCache;
use testcontainers_modules::{redis::Redis, testcontainers::runners::AsyncRunner};

#[tokio::test]
async fn marker_round_trips_through_redis() {
    let container = Redis::default().start().await.expect("failed to start redis container");
    let port = container.get_host_port_ipv4(6379).await.expect("failed to get mapped port");
    let url = format!("redis://127.0.0.1:{port}/");

    let cache = RedisCache::connect(&url, "newsfeed:").expect("failed to build redis pool");

    assert_eq!(cache.get_marker("IRNA").await.unwrap(), None);

    cache.set_marker("IRNA", "https://irna.ir/latest").await.unwrap();
    assert_eq!(cache.get_marker("IRNA").await.unwrap(), Some("https://irna.ir/latest".to_string()));

    cache.set_marker("IRNA", "https://irna.ir/newer").await.unwrap();
    assert_eq!(cache.get_marker("IRNA").await.unwrap(), Some("https://irna.ir/newer".to_string()));
}
