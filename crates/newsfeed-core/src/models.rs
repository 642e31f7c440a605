//! Entities shared by every stage of the pipeline: link records, article
//! records, vector points, and the source marker held in the short-term
//! cache. See the relational schema and vector collection shape these
//! mirror.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a [`LinkRecord`]. `Failed` is terminal and is only reached
/// once `tried_count >= MAX_RETRIES`; nothing in this crate moves a record
/// back out of it automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "link_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Pending,
    Completed,
    Failed,
}

/// Lifecycle of an [`ArticleRecord`]. There is no `Failed` variant: an
/// article that fails to embed simply stays `Pending` and is retried next
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "article_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    Pending,
    Completed,
}

/// Metadata about a single article URL, independent of whether the article
/// has been fetched yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LinkRecord {
    pub id: i64,
    pub source: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    pub status: LinkStatus,
    pub tried_count: i32,
    pub last_tried_at: Option<DateTime<Utc>>,
}

impl LinkRecord {
    /// A record not yet persisted; `id` is assigned by the store on insert.
    pub fn new(source: impl Into<String>, url: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            source: source.into(),
            url: url.into(),
            published_at,
            status: LinkStatus::Pending,
            tried_count: 0,
            last_tried_at: None,
        }
    }

    pub fn can_retry(&self, max_retries: i32) -> bool {
        self.tried_count < max_retries
    }
}

/// Parsed article content for a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ArticleRecord {
    pub source: String,
    pub url: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    #[sqlx(json)]
    pub keywords: Option<Vec<String>>,
    #[sqlx(json)]
    pub images: Option<Vec<String>>,
    pub published_at: DateTime<Utc>,
    pub published_ts: i64,
    pub status: ArticleStatus,
}

impl ArticleRecord {
    pub fn new(
        source: impl Into<String>,
        url: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source: source.into(),
            url: url.into(),
            title: title.into(),
            content: content.into(),
            summary: None,
            keywords: None,
            images: None,
            published_at,
            published_ts: published_at.timestamp(),
            status: ArticleStatus::Pending,
        }
    }

    /// Text handed to the embedder: `title + ". " + summary` when both are
    /// present, else the raw content, newlines stripped.
    pub fn embedding_text(&self) -> String {
        let raw = match &self.summary {
            Some(summary) if !summary.trim().is_empty() => format!("{}. {}", self.title, summary),
            _ => self.content.clone(),
        };
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// An embedding plus payload stored in the vector store under a
/// URL-derived id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorPayload {
    pub source: String,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub link: String,
    pub keywords: Vec<String>,
    pub images: Vec<String>,
    pub published_datetime: String,
    pub published_timestamp: i64,
}

impl VectorPoint {
    /// The namespace UUIDv5 ids are derived under, matching the namespace
    /// `uuid.NAMESPACE_URL` used by the system this crate replaces.
    pub const URL_NAMESPACE: Uuid = Uuid::NAMESPACE_URL;

    pub fn id_for_url(url: &str) -> Uuid {
        Uuid::new_v5(&Self::URL_NAMESPACE, url.as_bytes())
    }

    pub fn from_article(article: &ArticleRecord, vector: Vec<f32>) -> Self {
        Self {
            id: Self::id_for_url(&article.url),
            vector,
            payload: VectorPayload {
                source: article.source.clone(),
                title: article.title.clone(),
                content: article.content.clone(),
                summary: article.summary.clone(),
                link: article.url.clone(),
                keywords: article.keywords.clone().unwrap_or_default(),
                images: article.images.clone().unwrap_or_default(),
                published_datetime: article.published_at.to_rfc3339(),
                published_timestamp: article.published_ts,
            },
        }
    }
}

/// Distance metric a vector store collection is created with. The core
/// only ever uses `Cosine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_stable_across_runs() {
        let a = VectorPoint::id_for_url("https://example.com/a");
        let b = VectorPoint::id_for_url("https://example.com/a");
        assert_eq!(a, b);
    }

    #[test]
    fn point_id_differs_by_url() {
        let a = VectorPoint::id_for_url("https://example.com/a");
        let b = VectorPoint::id_for_url("https://example.com/b");
        assert_ne!(a, b);
    }

    #[test]
    fn can_retry_respects_max() {
        let mut link = LinkRecord::new("IRNA", "https://irna.ir/x", Utc::now());
        link.tried_count = 3;
        assert!(!link.can_retry(3));
        assert!(link.can_retry(4));
    }

    #[test]
    fn embedding_text_prefers_title_and_summary() {
        let mut article = ArticleRecord::new("IRNA", "https://irna.ir/x", "Title", "Body text", Utc::now());
        article.summary = Some("A summary.".to_string());
        assert_eq!(article.embedding_text(), "Title. A summary.");

        article.summary = None;
        assert_eq!(article.embedding_text(), "Body text");
    }
}
