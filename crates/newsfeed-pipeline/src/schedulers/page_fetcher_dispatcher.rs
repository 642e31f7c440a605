//! Drives PENDING `LinkRecord`s to COMPLETED or FAILED. This is the one
//! component whose correctness the at-least-once/retry invariants hinge
//! on, so it stays deliberately simple: claim a batch, group by source,
//! fetch each group under a per-source semaphore, persist each outcome
//! individually. Grounded on the teacher's `ScheduledPipelineRunner`
//! spawn/tick idiom (`orchestrator.rs`) combined with the claim-then-group
//! pattern in `crawlers/dispatcher.py`.

use newsfeed_core::error::ErrorClass;
use newsfeed_core::models::{ArticleRecord, LinkRecord, LinkStatus};
use newsfeed_core::traits::{PublisherAdapter, RelationalStore};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

use crate::adapters::AdapterRegistry;

pub struct DispatcherConfig {
    pub claim_batch_size: i64,
    pub max_retries: i32,
    pub min_content_chars: usize,
    /// Per-source fetch concurrency, keyed by source tag (`SourceConfig::fetch_concurrency`).
    /// A source with no entry falls back to `default_concurrency`.
    pub per_source_concurrency: HashMap<String, usize>,
    pub default_concurrency: usize,
    pub poll_interval: Duration,
    pub idle_backoff_cap: Duration,
    /// Consecutive empty claims required before the poll interval starts
    /// doubling; a non-empty claim resets the counter.
    pub idle_threshold: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            claim_batch_size: 20,
            max_retries: 3,
            min_content_chars: 50,
            per_source_concurrency: HashMap::new(),
            default_concurrency: 5,
            poll_interval: Duration::from_secs(30),
            idle_backoff_cap: Duration::from_secs(480),
            idle_threshold: 3,
        }
    }
}

pub struct PageFetcherDispatcher {
    store: Arc<dyn RelationalStore>,
    registry: Arc<AdapterRegistry>,
    config: DispatcherConfig,
    /// Process-local optimization only; the claim query's row lock is the
    /// authoritative cross-process exclusion.
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl PageFetcherDispatcher {
    pub fn new(store: Arc<dyn RelationalStore>, registry: Arc<AdapterRegistry>, config: DispatcherConfig) -> Self {
        Self { store, registry, config, in_flight: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// One claim/dispatch/commit cycle. Returns the number of links
    /// claimed, so the caller can apply idle backoff.
    pub async fn run_once(&self) -> usize {
        let claimed = match self
            .store
            .claim_pending_links(None, self.config.claim_batch_size, self.config.max_retries)
            .await
        {
            Ok(links) => links,
            Err(error) => {
                tracing::error!(%error, "failed to claim pending links");
                return 0;
            }
        };
        if claimed.is_empty() {
            return 0;
        }

        {
            let mut in_flight = self.in_flight.lock().expect("in-flight mutex poisoned");
            in_flight.extend(claimed.iter().map(|l| l.id));
            metrics::gauge!("pipeline_dispatcher_in_flight_ids").set(in_flight.len() as f64);
        }

        let mut by_source: HashMap<String, Vec<LinkRecord>> = HashMap::new();
        for link in claimed {
            by_source.entry(link.source.clone()).or_default().push(link);
        }

        let mut workers = Vec::with_capacity(by_source.len());
        for (source, links) in by_source {
            let store = self.store.clone();
            let adapter = self.registry.get(&source);
            let min_content_chars = self.config.min_content_chars;
            let max_retries = self.config.max_retries;
            let permits = self
                .config
                .per_source_concurrency
                .get(&source)
                .copied()
                .unwrap_or(self.config.default_concurrency);
            workers.push(tokio::spawn(async move {
                let Some(adapter) = adapter else {
                    tracing::error!(source = %source, "no adapter registered for source, leaving links pending");
                    return;
                };
                fetch_source_batch(adapter, store, links, min_content_chars, max_retries, permits).await;
            }));
        }

        let claimed_count = {
            let mut total = 0;
            for worker in workers {
                if let Err(error) = worker.await {
                    tracing::error!(%error, "fetch worker task panicked");
                }
                total += 1;
            }
            total
        };

        {
            let mut in_flight = self.in_flight.lock().expect("in-flight mutex poisoned");
            in_flight.clear();
            metrics::gauge!("pipeline_dispatcher_in_flight_ids").set(0.0);
        }

        claimed_count
    }

    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = self.config.poll_interval;
            let mut idle_cycles: u32 = 0;
            loop {
                let sleep = tokio::time::sleep(interval);
                tokio::select! {
                    _ = sleep => {}
                    _ = shutdown.changed() => break,
                }

                let claimed = self.run_once().await;
                if claimed == 0 {
                    idle_cycles += 1;
                    if idle_cycles >= self.config.idle_threshold {
                        let backoff_steps = idle_cycles - self.config.idle_threshold + 1;
                        interval = std::cmp::min(
                            self.config.poll_interval * 2u32.pow(backoff_steps.min(8)),
                            self.config.idle_backoff_cap,
                        );
                    }
                } else {
                    idle_cycles = 0;
                    interval = self.config.poll_interval;
                }
            }
        })
    }
}

async fn fetch_source_batch(
    adapter: Arc<dyn PublisherAdapter>,
    store: Arc<dyn RelationalStore>,
    links: Vec<LinkRecord>,
    min_content_chars: usize,
    max_retries: i32,
    permits: usize,
) {
    let source = adapter.source_tag().to_string();
    metrics::gauge!("pipeline_dispatcher_active_workers", "source" => source.clone()).set(links.len() as f64);

    let semaphore = Arc::new(Semaphore::new(permits.max(1)));
    let mut tasks = Vec::with_capacity(links.len());

    for link in links {
        let adapter = adapter.clone();
        let store = store.clone();
        let semaphore = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            apply_fetch_outcome(adapter.as_ref(), store.as_ref(), &link, min_content_chars, max_retries).await;
        }));
    }

    for task in tasks {
        if let Err(error) = task.await {
            tracing::error!(%error, "fetch task panicked");
        }
    }

    metrics::gauge!("pipeline_dispatcher_active_workers", "source" => source).set(0.0);
}

async fn apply_fetch_outcome(
    adapter: &dyn PublisherAdapter,
    store: &dyn RelationalStore,
    link: &LinkRecord,
    min_content_chars: usize,
    max_retries: i32,
) {
    metrics::counter!("pipeline_links_fetch_attempts_total", "source" => link.source.clone()).increment(1);

    let started = std::time::Instant::now();
    let outcome = tokio::time::timeout(Duration::from_secs(15), adapter.fetch(link, min_content_chars)).await;
    metrics::histogram!("pipeline_fetch_duration_seconds", "source" => link.source.clone())
        .record(started.elapsed().as_secs_f64());

    let result = match outcome {
        Ok(result) => result,
        Err(_) => Err(newsfeed_core::error::PipelineError::Timeout { url: link.url.clone() }),
    };

    match result {
        Ok(article) => {
            if let Err(error) = persist_success(store, link, &article).await {
                tracing::error!(url = %link.url, %error, "failed to persist fetch success");
            }
        }
        Err(error) => persist_failure(store, link, error, max_retries).await,
    }
}

async fn persist_success(store: &dyn RelationalStore, link: &LinkRecord, article: &ArticleRecord) -> newsfeed_core::error::Result<()> {
    let result = store
        .record_fetch_outcome(link.id, LinkStatus::Completed, link.tried_count + 1, Some(article))
        .await;
    if result.is_ok() {
        metrics::counter!("pipeline_links_completed_total", "source" => link.source.clone()).increment(1);
    }
    result
}

async fn persist_failure(store: &dyn RelationalStore, link: &LinkRecord, error: newsfeed_core::error::PipelineError, max_retries: i32) {
    let class = error.classify();
    metrics::counter!(
        "pipeline_links_fetch_failures_total",
        "source" => link.source.clone(),
        "error_kind" => format!("{class:?}"),
    )
    .increment(1);

    if class == ErrorClass::Infrastructure {
        tracing::error!(url = %link.url, %error, "infrastructure error, leaving link untouched");
        return;
    }

    let tried_count = link.tried_count + 1;
    let new_status = match class {
        ErrorClass::LogicalMismatch => LinkStatus::Failed,
        _ if tried_count >= max_retries => LinkStatus::Failed,
        _ => LinkStatus::Pending,
    };

    if new_status == LinkStatus::Failed {
        metrics::counter!("pipeline_links_failed_total", "source" => link.source.clone()).increment(1);
    }

    tracing::warn!(url = %link.url, %error, tried_count, ?new_status, "fetch failed");

    if let Err(error) = store.record_fetch_outcome(link.id, new_status, tried_count, None).await {
        tracing::error!(url = %link.url, %error, "failed to persist fetch failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsfeed_core::error::PipelineError;
    use newsfeed_core::traits::StoreStats;

    mockall::mock! {
        Store {}

        #[async_trait::async_trait]
        impl RelationalStore for Store {
            async fn upsert_link_records(&self, records: &[LinkRecord]) -> newsfeed_core::error::Result<()>;
            async fn claim_pending_links(&self, source: Option<&str>, limit: i64, max_retries: i32) -> newsfeed_core::error::Result<Vec<LinkRecord>>;
            async fn record_fetch_outcome(&self, link_id: i64, new_status: LinkStatus, tried_count: i32, article: Option<&ArticleRecord>) -> newsfeed_core::error::Result<()>;
            async fn claim_pending_articles(&self, limit: i64) -> newsfeed_core::error::Result<Vec<ArticleRecord>>;
            async fn mark_articles_completed(&self, urls: &[String]) -> newsfeed_core::error::Result<()>;
            async fn reset_failed_link(&self, link_id: i64) -> newsfeed_core::error::Result<()>;
            async fn stats(&self) -> newsfeed_core::error::Result<StoreStats>;
        }
    }

    fn link_with_tried_count(tried_count: i32) -> LinkRecord {
        let mut link = LinkRecord::new("IRNA", "https://irna.ir/x", chrono::Utc::now());
        link.id = 1;
        link.tried_count = tried_count;
        link
    }

    #[tokio::test]
    async fn transient_error_under_max_retries_stays_pending() {
        let link = link_with_tried_count(0);
        let mut store = MockStore::new();
        store
            .expect_record_fetch_outcome()
            .withf(|_, status, tried_count, article| *status == LinkStatus::Pending && *tried_count == 1 && article.is_none())
            .returning(|_, _, _, _| Box::pin(async { Ok(()) }));

        persist_failure(&store, &link, PipelineError::Timeout { url: link.url.clone() }, 3).await;
    }

    #[tokio::test]
    async fn transient_error_at_max_retries_fails_permanently() {
        let link = link_with_tried_count(2);
        let mut store = MockStore::new();
        store
            .expect_record_fetch_outcome()
            .withf(|_, status, tried_count, _| *status == LinkStatus::Failed && *tried_count == 3)
            .returning(|_, _, _, _| Box::pin(async { Ok(()) }));

        persist_failure(&store, &link, PipelineError::Timeout { url: link.url.clone() }, 3).await;
    }

    #[tokio::test]
    async fn logical_mismatch_fails_immediately_regardless_of_retry_count() {
        let link = link_with_tried_count(0);
        let mut store = MockStore::new();
        store
            .expect_record_fetch_outcome()
            .withf(|_, status, tried_count, _| *status == LinkStatus::Failed && *tried_count == 1)
            .returning(|_, _, _, _| Box::pin(async { Ok(()) }));

        let error = PipelineError::LogicalMismatch { source: "IRNA".into(), url: link.url.clone() };
        persist_failure(&store, &link, error, 3).await;
    }

    #[tokio::test]
    async fn infrastructure_error_leaves_link_untouched() {
        let link = link_with_tried_count(0);
        let mut store = MockStore::new();
        store.expect_record_fetch_outcome().times(0);

        persist_failure(&store, &link, PipelineError::VectorStore("lancedb unreachable".into()), 3).await;
    }

    #[tokio::test]
    async fn fetch_success_records_completed_status_with_incremented_tried_count() {
        let link = link_with_tried_count(1);
        let article = ArticleRecord::new("IRNA", &link.url, "Title", "x".repeat(200), link.published_at);
        let mut store = MockStore::new();
        store
            .expect_record_fetch_outcome()
            .withf(|_, status, tried_count, article| *status == LinkStatus::Completed && *tried_count == 2 && article.is_some())
            .returning(|_, _, _, _| Box::pin(async { Ok(()) }));

        persist_success(&store, &link, &article).await.unwrap();
    }
}
