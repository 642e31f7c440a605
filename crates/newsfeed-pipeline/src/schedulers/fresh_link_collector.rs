//! Polls each source's `discover_recent` on a fixed interval and persists
//! whatever is new. Grounded on the teacher's `ScheduledPipelineRunner`
//! spawn-and-tick idiom, generalized to one task per source instead of
//! one task per fixed stage.

use newsfeed_core::traits::{PublisherAdapter, RelationalStore, ShortTermCache};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct FreshLinkCollector {
    source: String,
    adapter: Arc<dyn PublisherAdapter>,
    store: Arc<dyn RelationalStore>,
    cache: Arc<dyn ShortTermCache>,
    interval: Duration,
}

impl FreshLinkCollector {
    pub fn new(
        source: impl Into<String>,
        adapter: Arc<dyn PublisherAdapter>,
        store: Arc<dyn RelationalStore>,
        cache: Arc<dyn ShortTermCache>,
        interval: Duration,
    ) -> Self {
        Self { source: source.into(), adapter, store, cache, interval }
    }

    /// One discover-and-persist cycle. Errors are logged and swallowed:
    /// the marker is only advanced on success, so a failed cycle retries
    /// cleanly on the next tick.
    pub async fn run_once(&self) {
        let marker = match self.cache.get_marker(&self.source).await {
            Ok(marker) => marker,
            Err(error) => {
                tracing::error!(source = %self.source, %error, "failed to read fresh-link marker");
                return;
            }
        };

        let result = match self.adapter.discover_recent(marker.as_deref()).await {
            Ok(result) => result,
            Err(error) => {
                tracing::error!(source = %self.source, %error, "fresh discovery failed");
                return;
            }
        };

        if !result.new_records.is_empty() {
            if let Err(error) = self.store.upsert_link_records(&result.new_records).await {
                tracing::error!(source = %self.source, %error, "failed to persist fresh links");
                return;
            }
        }

        if !result.new_records.is_empty() {
            metrics::counter!("pipeline_links_discovered_total", "source" => self.source.clone())
                .increment(result.new_records.len() as u64);
        }
        tracing::info!(source = %self.source, new_links = result.new_records.len(), "fresh discovery cycle complete");

        if let Some(newest_url) = result.newest_url {
            if let Err(error) = self.cache.set_marker(&self.source, &newest_url).await {
                tracing::error!(source = %self.source, %error, "failed to advance fresh-link marker");
            }
        }
    }

    /// Spawns the interval loop; exits once `shutdown` is notified.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_once().await,
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use newsfeed_core::error::Result;
    use newsfeed_core::models::{ArticleRecord, LinkRecord, LinkStatus};
    use newsfeed_core::traits::{DiscoverRecentResult, StoreStats};

    mockall::mock! {
        Adapter {}
        #[async_trait::async_trait]
        impl PublisherAdapter for Adapter {
            fn source_tag(&self) -> &str;
            async fn discover_recent(&self, last_seen_url: Option<&str>) -> Result<DiscoverRecentResult>;
            async fn discover_for_day(&self, date: chrono::NaiveDate) -> Result<Vec<LinkRecord>>;
            async fn fetch(&self, link: &LinkRecord, min_content_chars: usize) -> Result<ArticleRecord>;
        }
    }

    mockall::mock! {
        Store {}
        #[async_trait::async_trait]
        impl RelationalStore for Store {
            async fn upsert_link_records(&self, records: &[LinkRecord]) -> Result<()>;
            async fn claim_pending_links(&self, source: Option<&str>, limit: i64, max_retries: i32) -> Result<Vec<LinkRecord>>;
            async fn record_fetch_outcome(&self, link_id: i64, new_status: LinkStatus, tried_count: i32, article: Option<&ArticleRecord>) -> Result<()>;
            async fn claim_pending_articles(&self, limit: i64) -> Result<Vec<ArticleRecord>>;
            async fn mark_articles_completed(&self, urls: &[String]) -> Result<()>;
            async fn reset_failed_link(&self, link_id: i64) -> Result<()>;
            async fn stats(&self) -> Result<StoreStats>;
        }
    }

    mockall::mock! {
        Cache {}
        #[async_trait::async_trait]
        impl ShortTermCache for Cache {
            async fn get_marker(&self, source: &str) -> Result<Option<String>>;
            async fn set_marker(&self, source: &str, url: &str) -> Result<()>;
        }
    }

    #[tokio::test]
    async fn fresh_discovery_with_empty_marker_persists_all_records_and_advances_marker() {
        let mut adapter = MockAdapter::new();
        adapter.expect_discover_recent().withf(|marker| marker.is_none()).returning(|_| {
            Box::pin(async {
                Ok(DiscoverRecentResult {
                    newest_url: Some("https://irna.ir/u1".into()),
                    new_records: vec![
                        LinkRecord::new("IRNA", "https://irna.ir/u1", Utc::now()),
                        LinkRecord::new("IRNA", "https://irna.ir/u2", Utc::now()),
                        LinkRecord::new("IRNA", "https://irna.ir/u3", Utc::now()),
                    ],
                })
            })
        });

        let mut store = MockStore::new();
        store
            .expect_upsert_link_records()
            .withf(|records| records.len() == 3)
            .returning(|_| Box::pin(async { Ok(()) }));

        let mut cache = MockCache::new();
        cache.expect_get_marker().returning(|_| Box::pin(async { Ok(None) }));
        cache
            .expect_set_marker()
            .withf(|source, url| source == "IRNA" && url == "https://irna.ir/u1")
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let collector = FreshLinkCollector::new("IRNA", Arc::new(adapter), Arc::new(store), Arc::new(cache), Duration::from_secs(1));
        collector.run_once().await;
    }

    #[tokio::test]
    async fn discovery_failure_leaves_marker_untouched() {
        let mut adapter = MockAdapter::new();
        adapter
            .expect_discover_recent()
            .returning(|_| Box::pin(async { Err(newsfeed_core::error::PipelineError::Other("feed down".into())) }));

        let mut store = MockStore::new();
        store.expect_upsert_link_records().times(0);

        let mut cache = MockCache::new();
        cache.expect_get_marker().returning(|_| Box::pin(async { Ok(Some("https://irna.ir/u0".into())) }));
        cache.expect_set_marker().times(0);

        let collector = FreshLinkCollector::new("IRNA", Arc::new(adapter), Arc::new(store), Arc::new(cache), Duration::from_secs(1));
        collector.run_once().await;
    }

    #[tokio::test]
    async fn no_new_records_still_advances_marker_without_touching_the_store() {
        let mut adapter = MockAdapter::new();
        adapter.expect_discover_recent().returning(|_| {
            Box::pin(async { Ok(DiscoverRecentResult { newest_url: Some("https://irna.ir/u1".into()), new_records: Vec::new() }) })
        });

        let mut store = MockStore::new();
        store.expect_upsert_link_records().times(0);

        let mut cache = MockCache::new();
        cache.expect_get_marker().returning(|_| Box::pin(async { Ok(Some("https://irna.ir/u1".into())) }));
        cache.expect_set_marker().returning(|_, _| Box::pin(async { Ok(()) }));

        let collector = FreshLinkCollector::new("IRNA", Arc::new(adapter), Arc::new(store), Arc::new(cache), Duration::from_secs(1));
        collector.run_once().await;
    }
}
