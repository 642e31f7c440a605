//! Wiring: builds the concrete store/cache/embedder/vector-store/adapter
//! set from `PipelineConfig` and assembles the schedulers. `main.rs` only
//! parses CLI args and calls into here.

use newsfeed_core::config::{EmbedderProvider, PipelineConfig, SourceConfig};
use newsfeed_core::traits::{Embedder, RelationalStore, ShortTermCache, VectorStore};
use newsfeed_db::{Database, PostgresStore, RedisCache};
use newsfeed_pipeline::adapters::{ArchiveAdapter, ArticleSelectors, RssAdapter};
use newsfeed_pipeline::{
    AdapterRegistry, DispatcherConfig, EmbeddingScheduler, EmbeddingSchedulerConfig,
    FreshLinkCollector, HistoricalLinkCollector, LanceVectorStore, LocalEmbedder,
    PageFetcherDispatcher, RemoteEmbedder,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Every concrete dependency the CLI subcommands need, constructed once at
/// startup from `PipelineConfig`.
pub struct Runtime {
    pub config: PipelineConfig,
    pub database: Database,
    pub store: Arc<dyn RelationalStore>,
    pub cache: Arc<dyn ShortTermCache>,
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub registry: Arc<AdapterRegistry>,
    pub sources: HashMap<String, SourceConfig>,
}

impl Runtime {
    pub async fn bootstrap(config: PipelineConfig) -> anyhow::Result<Self> {
        let database = Database::connect(
            &config.database.url,
            config.database.max_connections,
            config.database.acquire_timeout,
        )
        .await?;
        let store: Arc<dyn RelationalStore> = Arc::new(PostgresStore::new(database.pool()));
        let cache: Arc<dyn ShortTermCache> =
            Arc::new(RedisCache::connect(&config.cache.redis_url, config.cache.key_prefix.clone())?);
        let vector_store: Arc<dyn VectorStore> = Arc::new(LanceVectorStore::connect(&config.vector_store.path).await?);

        let embedder: Arc<dyn Embedder> = match config.embedder.provider {
            EmbedderProvider::Remote => {
                let api_key = config
                    .embedder
                    .api_key
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("EMBEDDER_API_KEY required for remote embedder"))?;
                let endpoint = config
                    .embedder
                    .host
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string());
                Arc::new(RemoteEmbedder::new(endpoint, api_key, config.embedder.model_name.clone()))
            }
            EmbedderProvider::Local => {
                Arc::new(LocalEmbedder::new(&config.embedder.model_name, config.embedder.max_workers)?)
            }
        };

        let registry = Arc::new(build_adapter_registry());
        let sources = build_source_configs();

        Ok(Self { config, database, store, cache, vector_store, embedder, registry, sources })
    }

    pub fn dispatcher(&self) -> PageFetcherDispatcher {
        let per_source_concurrency = self
            .sources
            .values()
            .map(|source| (source.tag.clone(), source.fetch_concurrency))
            .collect();

        PageFetcherDispatcher::new(
            self.store.clone(),
            self.registry.clone(),
            DispatcherConfig {
                claim_batch_size: self.config.dispatcher.claim_batch_size,
                max_retries: self.config.retry.max_retries,
                min_content_chars: self.config.retry.min_content_chars,
                per_source_concurrency,
                default_concurrency: 5,
                poll_interval: std::time::Duration::from_secs(self.config.dispatcher.poll_interval_secs),
                idle_backoff_cap: std::time::Duration::from_secs(self.config.dispatcher.idle_backoff_cap_secs),
                idle_threshold: self.config.dispatcher.idle_threshold,
            },
        )
    }

    pub async fn embedding_scheduler(&self) -> anyhow::Result<EmbeddingScheduler> {
        let scheduler = EmbeddingScheduler::new(
            self.store.clone(),
            self.embedder.clone(),
            self.vector_store.clone(),
            self.config.vector_store.collection_name.clone(),
            EmbeddingSchedulerConfig {
                claim_batch_size: self.config.embedding_scheduler.claim_batch_size,
                poll_interval: std::time::Duration::from_secs(self.config.embedding_scheduler.poll_interval_secs),
                backoff_base: std::time::Duration::from_secs(self.config.embedding_scheduler.backoff_base_secs),
                backoff_cap: std::time::Duration::from_secs(self.config.embedding_scheduler.backoff_cap_secs),
                backoff_max_attempts: self.config.embedding_scheduler.backoff_max_attempts,
            },
        )
        .await?;
        Ok(scheduler)
    }

    pub fn fresh_link_collectors(&self) -> Vec<FreshLinkCollector> {
        self.registry
            .sources()
            .map(|source| {
                let interval_secs = self.sources.get(source).map(|s| s.fresh_interval_secs).unwrap_or(15);
                FreshLinkCollector::new(
                    source.to_string(),
                    self.registry.get(source).expect("source came from registry iterator"),
                    self.store.clone(),
                    self.cache.clone(),
                    std::time::Duration::from_secs(interval_secs),
                )
            })
            .collect()
    }

    pub fn historical_link_collector(&self, source: &str) -> anyhow::Result<HistoricalLinkCollector> {
        let adapter = self.registry.get(source).ok_or_else(|| anyhow::anyhow!("unknown source {source}"))?;
        Ok(HistoricalLinkCollector::new(
            source.to_string(),
            adapter,
            self.store.clone(),
            self.config.historical.batch_days,
            self.config.historical.day_workers,
        ))
    }
}

/// The two reference sources this crate ships adapters for. Additional
/// sources are added here as new `PublisherAdapter` implementations land;
/// there is no dynamic plugin loading.
fn build_adapter_registry() -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    registry.register(Arc::new(RssAdapter::new(
        "IRNA",
        "https://www.irna.ir/rss",
        ArticleSelectors { title: "h1.title".to_string(), body_paragraphs: "div.item-body p".to_string() },
    )));
    registry.register(Arc::new(ArchiveAdapter::new(
        "DONYAYE_EGHTESAD",
        "https://donya-e-eqtesad.com/sitemap.xml",
        ArticleSelectors { title: "h1.title".to_string(), body_paragraphs: "div.item-text p".to_string() },
    )));
    registry
}

/// Per-source tuning, keyed the same as `build_adapter_registry`. Extend
/// alongside it when a new source needs non-default concurrency or polling.
fn build_source_configs() -> HashMap<String, SourceConfig> {
    let mut sources = HashMap::new();
    for tag in ["IRNA", "DONYAYE_EGHTESAD"] {
        sources.insert(tag.to_string(), SourceConfig::new(tag));
    }
    sources
}
