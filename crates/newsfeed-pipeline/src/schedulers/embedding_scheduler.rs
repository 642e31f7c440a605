//! Turns PENDING `ArticleRecord`s into vector points. Grounded on
//! `news_embedding_scheduler.py`'s claim-batch/embed-batch/persist-batch
//! cycle, re-expressed as one `tokio` interval task instead of a consumer
//! loop over a broker topic.

use newsfeed_core::error::{PipelineError, Result};
use newsfeed_core::models::{ArticleRecord, VectorPoint};
use newsfeed_core::traits::{Embedder, RelationalStore, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct EmbeddingSchedulerConfig {
    pub claim_batch_size: i64,
    pub poll_interval: Duration,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    pub backoff_max_attempts: u32,
}

impl Default for EmbeddingSchedulerConfig {
    fn default() -> Self {
        Self {
            claim_batch_size: 50,
            poll_interval: Duration::from_secs(30),
            backoff_base: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(10),
            backoff_max_attempts: 5,
        }
    }
}

pub struct EmbeddingScheduler {
    store: Arc<dyn RelationalStore>,
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    collection_name: String,
    config: EmbeddingSchedulerConfig,
}

impl EmbeddingScheduler {
    /// Wires the embedder and vector store together and runs the startup
    /// self-check: a pre-existing collection with a mismatched dimension
    /// is a fatal construction error, never a runtime retry.
    pub async fn new(
        store: Arc<dyn RelationalStore>,
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        collection_name: impl Into<String>,
        config: EmbeddingSchedulerConfig,
    ) -> Result<Self> {
        let collection_name = collection_name.into();
        vector_store.ensure_collection(&collection_name, embedder.dimension()).await?;
        vector_store.ensure_payload_indexes(&collection_name).await?;
        Ok(Self { store, embedder, vector_store, collection_name, config })
    }

    pub async fn run_once(&self) -> usize {
        let articles = match self.store.claim_pending_articles(self.config.claim_batch_size).await {
            Ok(articles) => articles,
            Err(error) => {
                tracing::error!(%error, "failed to claim pending articles");
                return 0;
            }
        };
        if articles.is_empty() {
            return 0;
        }

        let texts: Vec<String> = articles.iter().map(ArticleRecord::embedding_text).collect();
        let (articles, texts): (Vec<ArticleRecord>, Vec<String>) = articles
            .into_iter()
            .zip(texts)
            .filter(|(article, text)| {
                let keep = !text.is_empty();
                if !keep {
                    tracing::warn!(url = %article.url, "empty embedding text, skipping this cycle");
                }
                keep
            })
            .unzip();
        if articles.is_empty() {
            return 0;
        }
        metrics::histogram!("pipeline_embedding_batch_size").record(articles.len() as f64);

        let started = std::time::Instant::now();
        let vectors = match self.embed_with_retry(&texts).await {
            Ok(vectors) => vectors,
            Err(error) => {
                metrics::counter!("pipeline_embedding_errors_total", "error_kind" => format!("{:?}", error.classify())).increment(1);
                tracing::error!(%error, "embedding batch failed, will retry next cycle");
                return 0;
            }
        };

        let points: Vec<VectorPoint> = articles
            .iter()
            .zip(vectors)
            .map(|(article, vector)| VectorPoint::from_article(article, vector))
            .collect();

        if let Err(error) = self.upsert_with_retry(&points).await {
            metrics::counter!("pipeline_embedding_errors_total", "error_kind" => format!("{:?}", error.classify())).increment(1);
            tracing::error!(%error, "vector upsert failed after all retries, leaving articles pending");
            return 0;
        }

        let urls: Vec<String> = articles.iter().map(|a| a.url.clone()).collect();
        if let Err(error) = self.store.mark_articles_completed(&urls).await {
            tracing::error!(%error, "failed to mark articles completed after successful upsert");
            return 0;
        }

        metrics::histogram!("pipeline_embedding_batch_duration_seconds").record(started.elapsed().as_secs_f64());
        for article in &articles {
            metrics::counter!("pipeline_articles_embedded_total", "source" => article.source.clone()).increment(1);
        }

        tracing::info!(count = articles.len(), "embedding cycle complete");
        articles.len()
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.embedder.embed_documents(texts).await?;
        for vector in &vectors {
            if vector.len() != self.embedder.dimension() {
                return Err(PipelineError::Embedder(format!(
                    "provider {} returned dimension {} but dimension() reports {}",
                    self.embedder.provider_name(),
                    vector.len(),
                    self.embedder.dimension()
                )));
            }
        }
        Ok(vectors)
    }

    async fn upsert_with_retry(&self, points: &[VectorPoint]) -> Result<()> {
        let mut attempt = 0;
        loop {
            match self.vector_store.upsert_points(&self.collection_name, points).await {
                Ok(()) => return Ok(()),
                Err(error) if attempt < self.config.backoff_max_attempts => {
                    attempt += 1;
                    let backoff = std::cmp::min(self.config.backoff_base * 2u32.pow(attempt), self.config.backoff_cap);
                    tracing::warn!(attempt, ?backoff, %error, "retrying vector upsert");
                    tokio::time::sleep(backoff).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.config.poll_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => { self.run_once().await; }
                    _ = shutdown.changed() => break,
                }
            }
        })
    }
}
