//! Postgres-backed [`RelationalStore`]. Claim operations use
//! `FOR UPDATE SKIP LOCKED` inside a single atomic `UPDATE ... WHERE id IN
//! (SELECT ...)` statement rather than a held transaction, so a claim never
//! blocks on slow adapter I/O; a claim that is never followed by a
//! recorded outcome self-expires after `claim_ttl` and is re-claimable,
//! giving the at-least-once behavior a crash must preserve.

use async_trait::async_trait;
use chrono::Utc;
use newsfeed_core::error::{PipelineError, Result};
use newsfeed_core::models::{ArticleRecord, LinkRecord, LinkStatus};
use newsfeed_core::traits::{RelationalStore, StoreStats};
use sqlx::PgPool;
use std::time::Duration;

pub struct PostgresStore {
    pool: PgPool,
    claim_ttl: Duration,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, claim_ttl: Duration::from_secs(120) }
    }

    pub fn with_claim_ttl(mut self, ttl: Duration) -> Self {
        self.claim_ttl = ttl;
        self
    }
}

#[async_trait]
impl RelationalStore for PostgresStore {
    async fn upsert_link_records(&self, records: &[LinkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT INTO news_links (source, url, published_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (url) DO UPDATE SET published_at = EXCLUDED.published_at",
            )
            .bind(&record.source)
            .bind(&record.url)
            .bind(record.published_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn claim_pending_links(
        &self,
        source: Option<&str>,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<LinkRecord>> {
        let claim_cutoff = Utc::now() - chrono::Duration::from_std(self.claim_ttl).unwrap();
        let rows = sqlx::query_as::<_, LinkRecord>(
            "UPDATE news_links
             SET claimed_at = now()
             WHERE id IN (
                 SELECT id FROM news_links
                 WHERE status = 'pending'
                   AND tried_count < $1
                   AND ($2::text IS NULL OR source = $2)
                   AND (claimed_at IS NULL OR claimed_at < $4)
                 ORDER BY published_at DESC NULLS LAST, id ASC
                 LIMIT $3
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING id, source, url, published_at, status, tried_count, last_tried_at",
        )
        .bind(max_retries)
        .bind(source)
        .bind(limit)
        .bind(claim_cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn record_fetch_outcome(
        &self,
        link_id: i64,
        new_status: LinkStatus,
        tried_count: i32,
        article: Option<&ArticleRecord>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(article) = article {
            let insert = sqlx::query(
                "INSERT INTO news_articles
                    (source, url, title, content, summary, keywords, images, published_at, published_ts, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
                 ON CONFLICT (url) DO NOTHING",
            )
            .bind(&article.source)
            .bind(&article.url)
            .bind(&article.title)
            .bind(&article.content)
            .bind(&article.summary)
            .bind(serde_json::to_value(&article.keywords).map_err(|e| PipelineError::Other(e.to_string()))?)
            .bind(serde_json::to_value(&article.images).map_err(|e| PipelineError::Other(e.to_string()))?)
            .bind(article.published_at)
            .bind(article.published_ts)
            .execute(&mut *tx)
            .await?;
            let _ = insert; // a conflict on url is itself the "treat as success" path
        }

        sqlx::query(
            "UPDATE news_links
             SET status = $1, tried_count = $2, last_tried_at = now(), claimed_at = NULL
             WHERE id = $3",
        )
        .bind(new_status)
        .bind(tried_count)
        .bind(link_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn claim_pending_articles(&self, limit: i64) -> Result<Vec<ArticleRecord>> {
        let claim_cutoff = Utc::now() - chrono::Duration::from_std(self.claim_ttl).unwrap();
        let rows = sqlx::query_as::<_, ArticleRecord>(
            "UPDATE news_articles
             SET claimed_at = now()
             WHERE url IN (
                 SELECT url FROM news_articles
                 WHERE status = 'pending'
                   AND (claimed_at IS NULL OR claimed_at < $2)
                 ORDER BY published_at DESC NULLS LAST
                 LIMIT $1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING source, url, title, content, summary, keywords, images, published_at, published_ts, status",
        )
        .bind(limit)
        .bind(claim_cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_articles_completed(&self, urls: &[String]) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }
        sqlx::query(
            "UPDATE news_articles SET status = 'completed', claimed_at = NULL WHERE url = ANY($1)",
        )
        .bind(urls)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_failed_link(&self, link_id: i64) -> Result<()> {
        sqlx::query(
            "UPDATE news_links SET status = 'pending', tried_count = 0, claimed_at = NULL
             WHERE id = $1 AND status = 'failed'",
        )
        .bind(link_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row: (i64, i64, i64) = sqlx::query_as(
            "SELECT
                count(*) FILTER (WHERE status = 'pending'),
                count(*) FILTER (WHERE status = 'failed'),
                count(*) FILTER (WHERE status = 'completed')
             FROM news_links",
        )
        .fetch_one(&self.pool)
        .await?;
        let article_row: (i64, i64) = sqlx::query_as(
            "SELECT
                count(*) FILTER (WHERE status = 'pending'),
                count(*) FILTER (WHERE status = 'completed')
             FROM news_articles",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(StoreStats {
            pending_links: row.0,
            failed_links: row.1,
            completed_links: row.2,
            pending_articles: article_row.0,
            completed_articles: article_row.1,
        })
    }
}

#[cfg(test)]
mod tests {
    // Exercised against a real Postgres instance in
    // tests/relational_store_integration.rs via `testcontainers`; the
    // claim query's `FOR UPDATE SKIP LOCKED` semantics aren't meaningfully
    // testable against a mock.
}
