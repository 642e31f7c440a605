//! Sitemap-index-backed adapter: `discover_for_day` finds the daily
//! sitemap whose `<lastmod>` matches the requested date and returns every
//! `<url>` entry in it. `discover_recent` walks the most recent sitemap
//! the same way the RSS adapter walks a feed.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use newsfeed_core::error::{PipelineError, Result};
use newsfeed_core::models::{ArticleRecord, LinkRecord};
use newsfeed_core::traits::{DiscoverRecentResult, PublisherAdapter};
use scraper::{Html, Selector};
use std::time::Duration;

use super::rss_adapter::ArticleSelectors;

pub struct ArchiveAdapter {
    source: String,
    sitemap_index_url: String,
    selectors: ArticleSelectors,
    client: reqwest::Client,
}

struct SitemapEntry {
    url: String,
    published_at: DateTime<Utc>,
}

impl ArchiveAdapter {
    pub fn new(source: impl Into<String>, sitemap_index_url: impl Into<String>, selectors: ArticleSelectors) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client build should not fail with static config");
        Self { source: source.into(), sitemap_index_url: sitemap_index_url.into(), selectors, client }
    }

    async fn fetch_xml(&self, url: &str) -> Result<String> {
        Ok(self.client.get(url).send().await?.error_for_status()?.text().await?)
    }

    /// `<sitemap><loc>...</loc><lastmod>...</lastmod></sitemap>` entries
    /// from the index document. Parsed with `scraper` the same way article
    /// bodies are — sitemap XML has no namespaced tags, so html5ever's
    /// lenient tree builder reads it fine without a dedicated XML parser.
    async fn list_daily_sitemaps(&self) -> Result<Vec<(String, NaiveDate)>> {
        let xml = self.fetch_xml(&self.sitemap_index_url).await?;
        let document = Html::parse_document(&xml);
        let sitemap_selector = Selector::parse("sitemap").unwrap();
        let loc_selector = Selector::parse("loc").unwrap();
        let lastmod_selector = Selector::parse("lastmod").unwrap();

        let mut out = Vec::new();
        for node in document.select(&sitemap_selector) {
            let loc = node.select(&loc_selector).next().map(|e| e.text().collect::<String>());
            let lastmod = node.select(&lastmod_selector).next().map(|e| e.text().collect::<String>());
            if let (Some(loc), Some(lastmod)) = (loc, lastmod) {
                if let Ok(date) = DateTime::parse_from_rfc3339(lastmod.trim()).map(|d| d.date_naive()) {
                    out.push((loc.trim().to_string(), date));
                }
            }
        }
        Ok(out)
    }

    async fn entries_from_sitemap(&self, sitemap_url: &str) -> Result<Vec<SitemapEntry>> {
        let xml = self.fetch_xml(sitemap_url).await?;
        let document = Html::parse_document(&xml);
        let url_selector = Selector::parse("url").unwrap();
        let loc_selector = Selector::parse("loc").unwrap();
        let lastmod_selector = Selector::parse("lastmod").unwrap();

        let mut out = Vec::new();
        for node in document.select(&url_selector) {
            let loc = node.select(&loc_selector).next().map(|e| e.text().collect::<String>());
            let lastmod = node.select(&lastmod_selector).next().map(|e| e.text().collect::<String>());
            if let (Some(loc), Some(lastmod)) = (loc, lastmod) {
                if let Ok(published_at) = DateTime::parse_from_rfc3339(lastmod.trim()) {
                    out.push(SitemapEntry { url: loc.trim().to_string(), published_at: published_at.with_timezone(&Utc) });
                }
            }
        }
        out.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Ok(out)
    }

    fn extract(&self, html: &str) -> Option<(String, String)> {
        let document = Html::parse_document(html);
        let title_selector = Selector::parse(&self.selectors.title).ok()?;
        let body_selector = Selector::parse(&self.selectors.body_paragraphs).ok()?;
        let title = document
            .select(&title_selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_else(|| "No Title".to_string());
        let content = document
            .select(&body_selector)
            .map(|el| el.text().collect::<String>())
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if content.is_empty() {
            return None;
        }
        Some((title, content))
    }
}

#[async_trait]
impl PublisherAdapter for ArchiveAdapter {
    fn source_tag(&self) -> &str {
        &self.source
    }

    async fn discover_recent(&self, last_seen_url: Option<&str>) -> Result<DiscoverRecentResult> {
        let sitemaps = self.list_daily_sitemaps().await?;
        let Some((latest_sitemap, _)) = sitemaps.last() else {
            return Ok(DiscoverRecentResult { newest_url: None, new_records: Vec::new() });
        };
        let entries = self.entries_from_sitemap(latest_sitemap).await?;

        let mut newest_url = None;
        let mut new_records = Vec::new();
        for entry in entries {
            if newest_url.is_none() {
                newest_url = Some(entry.url.clone());
            }
            if Some(entry.url.as_str()) == last_seen_url {
                break;
            }
            new_records.push(LinkRecord::new(self.source.clone(), entry.url, entry.published_at));
        }
        Ok(DiscoverRecentResult { newest_url, new_records })
    }

    async fn discover_for_day(&self, date: NaiveDate) -> Result<Vec<LinkRecord>> {
        let sitemaps = self.list_daily_sitemaps().await?;
        let Some((sitemap_url, _)) = sitemaps.iter().find(|(_, d)| *d == date) else {
            return Ok(Vec::new());
        };
        let entries = self.entries_from_sitemap(sitemap_url).await?;
        Ok(entries
            .into_iter()
            .map(|e| LinkRecord::new(self.source.clone(), e.url, e.published_at))
            .collect())
    }

    async fn fetch(&self, link: &LinkRecord, min_content_chars: usize) -> Result<ArticleRecord> {
        let html = self.client.get(&link.url).send().await?.error_for_status()?.text().await?;
        let (title, content) = self.extract(&html).ok_or_else(|| PipelineError::ContentTooShort {
            url: link.url.clone(),
            len: 0,
            min: min_content_chars,
        })?;
        if content.len() < min_content_chars {
            return Err(PipelineError::ContentTooShort { url: link.url.clone(), len: content.len(), min: min_content_chars });
        }
        Ok(ArticleRecord::new(self.source.clone(), link.url.clone(), title, content, link.published_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn selectors() -> ArticleSelectors {
        ArticleSelectors { title: "h1.title".into(), body_paragraphs: "div.item-text p".into() }
    }

    fn sitemap_index_xml(server_uri: &str) -> String {
        format!(
            r#"<sitemapindex>
                <sitemap><loc>{server_uri}/sitemap-2026-07-26.xml</loc><lastmod>2026-07-26T00:00:00Z</lastmod></sitemap>
                <sitemap><loc>{server_uri}/sitemap-2026-07-27.xml</loc><lastmod>2026-07-27T00:00:00Z</lastmod></sitemap>
            </sitemapindex>"#
        )
    }

    fn daily_sitemap_xml(server_uri: &str) -> String {
        format!(
            r#"<urlset>
                <url><loc>{server_uri}/a/old</loc><lastmod>2026-07-27T08:00:00Z</lastmod></url>
                <url><loc>{server_uri}/a/new</loc><lastmod>2026-07-27T10:00:00Z</lastmod></url>
            </urlset>"#
        )
    }

    #[tokio::test]
    async fn discover_recent_stops_at_last_seen_url_and_reports_newest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap-index.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_index_xml(&server.uri())))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/sitemap-2026-07-27.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(daily_sitemap_xml(&server.uri())))
            .mount(&server)
            .await;

        let adapter = ArchiveAdapter::new("TEST", format!("{}/sitemap-index.xml", server.uri()), selectors());
        let result = adapter.discover_recent(Some(&format!("{}/a/old", server.uri()))).await.unwrap();

        assert_eq!(result.newest_url, Some(format!("{}/a/new", server.uri())));
        assert_eq!(result.new_records.len(), 1);
        assert_eq!(result.new_records[0].url, format!("{}/a/new", server.uri()));
    }

    #[tokio::test]
    async fn discover_for_day_returns_empty_when_no_sitemap_matches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sitemap-index.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sitemap_index_xml(&server.uri())))
            .mount(&server)
            .await;

        let adapter = ArchiveAdapter::new("TEST", format!("{}/sitemap-index.xml", server.uri()), selectors());
        let links = adapter.discover_for_day(NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()).await.unwrap();
        assert!(links.is_empty());
    }

    #[tokio::test]
    async fn fetch_rejects_content_below_minimum_length() {
        let server = MockServer::start().await;
        let html = r#"<html><body><h1 class="title">T</h1><div class="item-text"><p>short</p></div></body></html>"#;
        Mock::given(method("GET")).and(path("/article")).respond_with(ResponseTemplate::new(200).set_body_string(html)).mount(&server).await;

        let adapter = ArchiveAdapter::new("TEST", format!("{}/sitemap-index.xml", server.uri()), selectors());
        let link = LinkRecord::new("TEST", format!("{}/article", server.uri()), Utc::now());
        let err = adapter.fetch(&link, 50).await.unwrap_err();
        assert!(matches!(err, PipelineError::ContentTooShort { .. }));
    }

    #[tokio::test]
    async fn fetch_extracts_title_and_joined_paragraphs() {
        let server = MockServer::start().await;
        let html = r#"<html><body><h1 class="title">Headline</h1><div class="item-text"><p>First paragraph of the article body.</p><p>Second paragraph continues it further.</p></div></body></html>"#;
        Mock::given(method("GET")).and(path("/article")).respond_with(ResponseTemplate::new(200).set_body_string(html)).mount(&server).await;

        let adapter = ArchiveAdapter::new("TEST", format!("{}/sitemap-index.xml", server.uri()), selectors());
        let link = LinkRecord::new("TEST", format!("{}/article", server.uri()), Utc::now());
        let article = adapter.fetch(&link, 10).await.unwrap();
        assert_eq!(article.title, "Headline");
        assert!(article.content.contains("First paragraph"));
        assert!(article.content.contains("Second paragraph"));
    }
}
