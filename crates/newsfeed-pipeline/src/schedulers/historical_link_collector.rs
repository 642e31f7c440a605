//! One-shot backfill over a date range: `discover_for_day` run W-wide per
//! batch of B days, persisted as each day completes. Batches run
//! sequentially so memory stays bounded regardless of range length.

use chrono::NaiveDate;
use futures::stream::{FuturesUnordered, StreamExt};
use newsfeed_core::error::Result;
use newsfeed_core::traits::{PublisherAdapter, RelationalStore};
use std::sync::Arc;

pub struct HistoricalLinkCollector {
    source: String,
    adapter: Arc<dyn PublisherAdapter>,
    store: Arc<dyn RelationalStore>,
    batch_days: i64,
    day_workers: usize,
}

impl HistoricalLinkCollector {
    pub fn new(
        source: impl Into<String>,
        adapter: Arc<dyn PublisherAdapter>,
        store: Arc<dyn RelationalStore>,
        batch_days: i64,
        day_workers: usize,
    ) -> Self {
        Self { source: source.into(), adapter, store, batch_days, day_workers }
    }

    pub async fn run(&self, from: NaiveDate, to: NaiveDate) -> Result<()> {
        let mut batch_start = from;
        while batch_start <= to {
            let batch_end = std::cmp::min(
                batch_start + chrono::Duration::days(self.batch_days - 1),
                to,
            );
            self.run_batch(batch_start, batch_end).await;
            batch_start = batch_end + chrono::Duration::days(1);
        }
        Ok(())
    }

    async fn run_batch(&self, start: NaiveDate, end: NaiveDate) {
        let days: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        let mut in_flight = FuturesUnordered::new();
        let mut remaining = days.into_iter();

        for date in remaining.by_ref().take(self.day_workers) {
            in_flight.push(self.discover_and_persist(date));
        }

        while let Some(()) = in_flight.next().await {
            if let Some(date) = remaining.next() {
                in_flight.push(self.discover_and_persist(date));
            }
        }
    }

    async fn discover_and_persist(&self, date: NaiveDate) {
        let records = match self.adapter.discover_for_day(date).await {
            Ok(records) => records,
            Err(error) => {
                tracing::error!(source = %self.source, %date, %error, "historical discovery failed for day");
                return;
            }
        };
        if records.is_empty() {
            return;
        }
        if let Err(error) = self.store.upsert_link_records(&records).await {
            tracing::error!(source = %self.source, %date, %error, "failed to persist historical links");
            return;
        }
        metrics::counter!("pipeline_links_discovered_total", "source" => self.source.clone())
            .increment(records.len() as u64);
        tracing::info!(source = %self.source, %date, count = records.len(), "historical day persisted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsfeed_core::models::{ArticleRecord, LinkRecord, LinkStatus};
    use newsfeed_core::traits::{DiscoverRecentResult, StoreStats};
    use std::sync::atomic::{AtomicUsize, Ordering};

    mockall::mock! {
        Adapter {}
        #[async_trait::async_trait]
        impl PublisherAdapter for Adapter {
            fn source_tag(&self) -> &str;
            async fn discover_recent(&self, last_seen_url: Option<&str>) -> Result<DiscoverRecentResult>;
            async fn discover_for_day(&self, date: NaiveDate) -> Result<Vec<LinkRecord>>;
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

    #[tokio::test]
    async fn run_visits_every_day_in_range_exactly_once() {
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut adapter = MockAdapter::new();
        let seen_clone = seen.clone();
        adapter.expect_discover_for_day().returning(move |date| {
            seen_clone.lock().unwrap().push(date);
            Box::pin(async { Ok(Vec::new()) })
        });

        let store = MockStore::new();
        let collector = HistoricalLinkCollector::new("IRNA", Arc::new(adapter), Arc::new(store), 2, 2);

        let from = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 7, 5).unwrap();
        collector.run(from, to).await.unwrap();

        let mut days = seen.lock().unwrap().clone();
        days.sort();
        let expected: Vec<NaiveDate> = from.iter_days().take_while(|d| *d <= to).collect();
        assert_eq!(days, expected);
    }

    #[tokio::test]
    async fn a_day_with_no_records_never_calls_the_store() {
        let mut adapter = MockAdapter::new();
        adapter.expect_discover_for_day().returning(|_| Box::pin(async { Ok(Vec::new()) }));

        let mut store = MockStore::new();
        store.expect_upsert_link_records().times(0);

        let collector = HistoricalLinkCollector::new("IRNA", Arc::new(adapter), Arc::new(store), 30, 4);
        let day = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        collector.run(day, day).await.unwrap();
    }

    #[tokio::test]
    async fn a_failing_day_does_not_abort_the_remaining_days() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();
        let mut adapter = MockAdapter::new();
        adapter.expect_discover_for_day().returning(move |date| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            if date == NaiveDate::from_ymd_opt(2026, 7, 2).unwrap() {
                Box::pin(async { Err(newsfeed_core::error::PipelineError::Other("site down".into())) })
            } else {
                Box::pin(async { Ok(Vec::new()) })
            }
        });

        let store = MockStore::new();
        let collector = HistoricalLinkCollector::new("IRNA", Arc::new(adapter), Arc::new(store), 10, 1);

        let from = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2026, 7, 3).unwrap();
        collector.run(from, to).await.unwrap();

        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }
}
