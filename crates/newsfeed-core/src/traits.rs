//! Capability contracts every component implements against. Kept here,
//! dependency-free of any concrete backend, so adapters/stores/schedulers
//! can all depend on `newsfeed-core` without depending on each other.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::{ArticleRecord, LinkRecord, LinkStatus, VectorPoint};

/// One outcome of `PublisherAdapter::discover_recent`: the newest URL seen
/// in the feed (even if it produced no new records) and the records that
/// are new relative to the caller's last-seen marker.
#[derive(Debug, Clone)]
pub struct DiscoverRecentResult {
    pub newest_url: Option<String>,
    pub new_records: Vec<LinkRecord>,
}

/// Per-source capability set. Implementations are pure with respect to
/// pipeline state — they only talk to the publisher's site — and own no
/// retry or persistence logic; that belongs to the dispatcher/collectors.
#[async_trait]
pub trait PublisherAdapter: Send + Sync {
    /// Short tag identifying this source, e.g. `"IRNA"`.
    fn source_tag(&self) -> &str;

    /// Fetch the publisher's "what's new" feed, newest-first, stopping at
    /// `last_seen_url` if given.
    async fn discover_recent(&self, last_seen_url: Option<&str>) -> Result<DiscoverRecentResult>;

    /// Fetch all links the publisher attributes to `date`.
    async fn discover_for_day(&self, date: NaiveDate) -> Result<Vec<LinkRecord>>;

    /// Load and parse one article. Must fail with
    /// [`crate::error::PipelineError::ContentTooShort`] if the parsed
    /// content is shorter than `min_content_chars`.
    async fn fetch(&self, link: &LinkRecord, min_content_chars: usize) -> Result<ArticleRecord>;

    /// Diagnostic-only check of whether `url` plausibly belongs to this
    /// source. Never used to silently drop a link.
    fn validate_link(&self, _url: &str) -> bool {
        true
    }
}

/// Abstract batch text-to-vector service. Two variants ship: a remote API
/// embedder and a local single-shot model fanned out across workers. Both
/// must satisfy: `embed_documents` returns one vector per input text, in
/// order, each of length `dimension()`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Detected once at construction and cached; never recomputed per call.
    fn dimension(&self) -> usize;

    fn provider_name(&self) -> &str;
}

/// Durable table of link records and article records: the source of truth
/// for "what has been seen" and "what has been processed".
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn upsert_link_records(&self, records: &[LinkRecord]) -> Result<()>;

    /// Returns PENDING links with `tried_count < max_retries`, ordered
    /// `published_at DESC NULLS LAST, id ASC`, claimed with skip-locked
    /// semantics so concurrent callers never receive overlapping rows.
    async fn claim_pending_links(
        &self,
        source: Option<&str>,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<LinkRecord>>;

    /// Atomically applies one fetch outcome: updates the link's status /
    /// `tried_count` / `last_tried_at`, and on success inserts `article`
    /// (a unique-url conflict there is itself treated as success).
    async fn record_fetch_outcome(
        &self,
        link_id: i64,
        new_status: LinkStatus,
        tried_count: i32,
        article: Option<&ArticleRecord>,
    ) -> Result<()>;

    async fn claim_pending_articles(&self, limit: i64) -> Result<Vec<ArticleRecord>>;

    async fn mark_articles_completed(&self, urls: &[String]) -> Result<()>;

    /// Returns a FAILED link to PENDING with `tried_count` reset to 0.
    /// Never called by any scheduler; operator-invoked only.
    async fn reset_failed_link(&self, link_id: i64) -> Result<()>;

    async fn stats(&self) -> Result<StoreStats>;
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub pending_links: i64,
    pub failed_links: i64,
    pub completed_links: i64,
    pub pending_articles: i64,
    pub completed_articles: i64,
}

/// Content-addressed index of article embeddings.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<()>;

    async fn ensure_payload_indexes(&self, name: &str) -> Result<()>;

    async fn upsert_points(&self, name: &str, points: &[VectorPoint]) -> Result<()>;
}

/// Tiny key/value store for per-source "newest link seen" markers.
#[async_trait]
pub trait ShortTermCache: Send + Sync {
    async fn get_marker(&self, source: &str) -> Result<Option<String>>;

    async fn set_marker(&self, source: &str, url: &str) -> Result<()>;
}

/// Topology-agnostic queue interface satisfied either by a durable broker
/// or by the relational store polled by status.
#[async_trait]
pub trait Queue<T>: Send + Sync {
    async fn publish(&self, topic: &str, item: T) -> Result<()>;
}
