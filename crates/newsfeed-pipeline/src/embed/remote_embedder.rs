//! Remote embedding-API client. The API batches natively, so the whole
//! text slice goes out in one request; a small retry loop with
//! exponential backoff absorbs transient 5xx/timeout failures the same
//! way the rest of this pipeline treats adapter fetches.

use async_trait::async_trait;
use newsfeed_core::error::{PipelineError, Result};
use newsfeed_core::traits::Embedder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn dimension_for_model(model_name: &str) -> usize {
    match model_name {
        "text-embedding-3-small" => 1536,
        "text-embedding-3-large" => 3072,
        "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

pub struct RemoteEmbedder {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model_name: String,
    dimension: usize,
    max_retries: u32,
}

impl RemoteEmbedder {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model_name: impl Into<String>) -> Self {
        let model_name = model_name.into();
        let dimension = dimension_for_model(&model_name);
        Self {
            client: reqwest::Client::builder().timeout(Duration::from_secs(30)).build().expect("static client config"),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model_name,
            dimension,
            max_retries: 3,
        }
    }

    async fn embed_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest { model: &self.model_name, input: texts })
            .send()
            .await?
            .error_for_status()?
            .json::<EmbeddingResponse>()
            .await?;

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        for datum in response.data {
            if datum.index < vectors.len() {
                vectors[datum.index] = Some(datum.embedding);
            }
        }
        vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| v.ok_or_else(|| PipelineError::Embedder(format!("response missing embedding at index {i}"))))
            .collect()
    }
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut attempt = 0;
        loop {
            match self.embed_once(texts).await {
                Ok(vectors) => {
                    for vector in &vectors {
                        if vector.len() != self.dimension {
                            return Err(PipelineError::Embedder(format!(
                                "provider {} returned dimension {} but expected {}",
                                self.model_name,
                                vector.len(),
                                self.dimension
                            )));
                        }
                    }
                    return Ok(vectors);
                }
                Err(err) if attempt < self.max_retries && err.classify().is_retryable() => {
                    attempt += 1;
                    let backoff = Duration::from_millis(200 * 2u64.pow(attempt));
                    tracing::warn!(attempt, ?backoff, error = %err, "retrying embedding request");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn response_body(vectors: &[(usize, Vec<f32>)]) -> serde_json::Value {
        serde_json::json!({
            "data": vectors.iter().map(|(index, embedding)| {
                serde_json::json!({ "index": index, "embedding": embedding })
            }).collect::<Vec<_>>()
        })
    }

    #[tokio::test]
    async fn embed_documents_returns_vectors_in_request_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body(&[
                (1, vec![0.2, 0.2]),
                (0, vec![0.1, 0.1]),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let mut embedder = RemoteEmbedder::new(format!("{}/embeddings", server.uri()), "key", "text-embedding-3-small");
        embedder.dimension = 2;

        let vectors = embedder.embed_documents(&["a".into(), "b".into()]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.1], vec![0.2, 0.2]]);
    }

    #[tokio::test]
    async fn embed_documents_retries_transient_failures_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body(&[(0, vec![0.1, 0.1])])))
            .mount(&server)
            .await;

        let mut embedder = RemoteEmbedder::new(format!("{}/embeddings", server.uri()), "key", "text-embedding-3-small");
        embedder.dimension = 2;

        let vectors = embedder.embed_documents(&["a".into()]).await.unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.1]]);
    }

    #[tokio::test]
    async fn empty_input_short_circuits_without_a_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

        let embedder = RemoteEmbedder::new(format!("{}/embeddings", server.uri()), "key", "text-embedding-3-small");
        let vectors = embedder.embed_documents(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected_without_retrying() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(response_body(&[(0, vec![0.1, 0.1, 0.3])])))
            .expect(1)
            .mount(&server)
            .await;

        let mut embedder = RemoteEmbedder::new(format!("{}/embeddings", server.uri()), "key", "text-embedding-3-small");
        embedder.dimension = 2;

        let err = embedder.embed_documents(&["a".into()]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Embedder(_)));
    }
}
