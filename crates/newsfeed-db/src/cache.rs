//! Redis-backed [`ShortTermCache`] holding per-source "last link seen"
//! markers. Values are plain strings — the URL itself — there is nothing
//! to serialize.

use async_trait::async_trait;
use deadpool_redis::{redis::AsyncCommands, Config, Pool, Runtime};
use newsfeed_core::error::{PipelineError, Result};
use newsfeed_core::traits::ShortTermCache;

pub struct RedisCache {
    pool: Pool,
    key_prefix: String,
}

impl RedisCache {
    pub fn connect(redis_url: &str, key_prefix: impl Into<String>) -> anyhow::Result<Self> {
        let pool = Config::from_url(redis_url).create_pool(Some(Runtime::Tokio1))?;
        Ok(Self { pool, key_prefix: key_prefix.into() })
    }

    fn full_key(&self, source: &str) -> String {
        format!("{}marker:{}", self.key_prefix, source)
    }
}

#[async_trait]
impl ShortTermCache for RedisCache {
    async fn get_marker(&self, source: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await.map_err(|e| PipelineError::Other(e.to_string()))?;
        let value: Option<String> = conn.get(self.full_key(source)).await?;
        Ok(value)
    }

    async fn set_marker(&self, source: &str, url: &str) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| PipelineError::Other(e.to_string()))?;
        let _: () = conn.set(self.full_key(source), url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_key_namespaces_source_under_the_configured_prefix() {
        let cache = RedisCache::connect("redis://127.0.0.1/", "newsfeed:").unwrap();
        assert_eq!(cache.full_key("IRNA"), "newsfeed:marker:IRNA");
    }
}
