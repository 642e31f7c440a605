//! Local embedder backed by `fastembed`. `fastembed` batches natively, but
//! the contract models a single-shot-per-call provider (matching the
//! other local-inference backends this pipeline has supported), so
//! documents are embedded individually and fanned out across
//! `max_workers` concurrent tasks, then reassembled in input order.

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use newsfeed_core::error::{PipelineError, Result};
use newsfeed_core::traits::Embedder;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

fn model_for_name(name: &str) -> EmbeddingModel {
    match name {
        "BAAI/bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "BAAI/bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "BAAI/bge-large-en-v1.5" => EmbeddingModel::BGELargeENV15,
        _ => EmbeddingModel::BGESmallENV15,
    }
}

/// Fallback dimensions keyed by model family, used only if a sentinel
/// embed at construction time somehow fails to report a length.
fn fallback_dimension(name: &str) -> usize {
    if name.contains("large") {
        1024
    } else if name.contains("base") {
        768
    } else {
        384
    }
}

pub struct LocalEmbedder {
    model: Arc<TextEmbedding>,
    dimension: usize,
    max_workers: usize,
    provider_name: String,
}

impl LocalEmbedder {
    pub fn new(model_name: &str, max_workers: usize) -> Result<Self> {
        let options = InitOptions::new(model_for_name(model_name)).with_show_download_progress(true);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| PipelineError::Embedder(format!("failed to initialize local embedding model: {e}")))?;

        let dimension = model
            .embed(vec!["dimension probe".to_string()], None)
            .map_err(|e| PipelineError::Embedder(format!("dimension probe failed: {e}")))?
            .into_iter()
            .next()
            .map(|v| v.len())
            .unwrap_or_else(|| fallback_dimension(model_name));

        Ok(Self { model: Arc::new(model), dimension, max_workers: max_workers.max(1), provider_name: format!("fastembed-{model_name}") })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();

        for (index, text) in texts.iter().cloned().enumerate() {
            let model = self.model.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                tokio::task::spawn_blocking(move || {
                    model
                        .embed(vec![text], None)
                        .map(|mut v| (index, v.remove(0)))
                        .map_err(|e| PipelineError::Embedder(format!("embedding failed: {e}")))
                })
                .await
                .map_err(|e| PipelineError::Embedder(format!("embedding task panicked: {e}")))?
            });
        }

        let mut ordered: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        while let Some(result) = tasks.join_next().await {
            let (index, vector) = result.map_err(|e| PipelineError::Embedder(format!("embedding task join failed: {e}")))??;
            if vector.len() != self.dimension {
                return Err(PipelineError::Embedder(format!(
                    "model {} returned dimension {} but constructor detected {}",
                    self.provider_name,
                    vector.len(),
                    self.dimension
                )));
            }
            ordered[index] = Some(vector);
        }

        Ok(ordered.into_iter().map(|v| v.expect("every index is filled by its spawned task")).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }
}
