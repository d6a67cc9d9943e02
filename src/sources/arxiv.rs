//! arXiv search through the public Atom API.

use crate::models::WorkItem;
use crate::pipeline::collaborators::Source;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Datelike;
use std::time::Duration;
use tracing::{debug, error, info};

pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Source tag stored on every arXiv item.
pub const SOURCE_NAME: &str = "arXiv";

/// Search parameters.
#[derive(Debug, Clone)]
pub struct ArxivQuery {
    /// Used as the search term when `keywords` is empty.
    pub domain: String,
    pub keywords: Vec<String>,
    pub categories: Vec<String>,
    pub start_year: i32,
    pub end_year: i32,
    pub max_results: usize,
}

impl ArxivQuery {
    /// The `search_query` parameter for this search.
    pub fn search_query(&self) -> String {
        let terms: Vec<String> = if self.keywords.is_empty() {
            vec![self.domain.clone()]
        } else {
            self.keywords.clone()
        };
        let keyword_query = terms
            .iter()
            .map(|term| quote_term(term))
            .collect::<Vec<_>>()
            .join(" OR ");

        let mut query = if self.categories.is_empty() {
            keyword_query
        } else {
            let category_query = self
                .categories
                .iter()
                .map(|cat| format!("cat:{}", cat))
                .collect::<Vec<_>>()
                .join(" OR ");
            format!("({}) AND ({})", keyword_query, category_query)
        };

        query.push_str(&format!(
            " AND submittedDate:[{}0101 TO {}0101]",
            self.start_year,
            self.end_year + 1
        ));
        query
    }

    fn in_range(&self, year: Option<i32>) -> bool {
        year.map_or(true, |y| y >= self.start_year && y <= self.end_year)
    }
}

fn quote_term(term: &str) -> String {
    let term = term.trim();
    if term.contains(char::is_whitespace) {
        format!("\"{}\"", term)
    } else {
        term.to_string()
    }
}

/// Paper source backed by the arXiv API.
pub struct ArxivSource {
    query: ArxivQuery,
    api_url: String,
    client: reqwest::Client,
}

impl ArxivSource {
    pub fn new(query: ArxivQuery) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build arXiv HTTP client")?;

        Ok(Self {
            query,
            api_url: ARXIV_API_URL.to_string(),
            client,
        })
    }

    /// Point the source at another endpoint. Tests use an unroutable one.
    #[cfg(test)]
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    async fn search(&self) -> Result<Vec<WorkItem>> {
        let search_query = self.query.search_query();
        info!("arXiv query: {}", search_query);
        let max_results = self.query.max_results.to_string();

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", "0"),
                ("max_results", max_results.as_str()),
                ("sortBy", "relevance"),
                ("sortOrder", "descending"),
            ])
            .header("User-Agent", concat!("litscout/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .context("arXiv request failed")?
            .error_for_status()
            .context("arXiv returned an error status")?;

        let bytes = response
            .bytes()
            .await
            .context("Failed to read arXiv response body")?;

        let mut items = parse_feed(&bytes)?;
        let total = items.len();
        items.retain(|item| self.query.in_range(item.publish_year));
        items.truncate(self.query.max_results);
        debug!(
            "{} of {} arXiv entries within {}-{}",
            items.len(),
            total,
            self.query.start_year,
            self.query.end_year
        );
        Ok(items)
    }
}

#[async_trait]
impl Source for ArxivSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn acquire(&self) -> Vec<WorkItem> {
        match self.search().await {
            Ok(items) => {
                info!("Fetched {} papers from arXiv", items.len());
                items
            }
            Err(e) => {
                error!("arXiv search failed: {:#}", e);
                Vec::new()
            }
        }
    }
}

/// Parse an arXiv Atom response into work items.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<WorkItem>> {
    let feed = feed_rs::parser::parse(bytes).context("Failed to parse arXiv Atom feed")?;

    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let title = collapse_whitespace(&entry.title?.content);
            if title.is_empty() {
                return None;
            }

            let arxiv_id = short_id(&entry.id);
            let pdf_url = entry
                .links
                .iter()
                .find(|link| link.title.as_deref() == Some("pdf"))
                .map(|link| link.href.clone())
                .or_else(|| arxiv_id.as_ref().map(|id| format!("https://arxiv.org/pdf/{}", id)));
            let doi = entry
                .links
                .iter()
                .find(|link| link.title.as_deref() == Some("doi"))
                .and_then(|link| doi_from_url(&link.href));
            let categories: Vec<String> = entry
                .categories
                .iter()
                .map(|category| category.term.clone())
                .collect();

            Some(WorkItem {
                title,
                authors: entry.authors.into_iter().map(|p| p.name).collect(),
                summary: entry
                    .summary
                    .map(|s| collapse_whitespace(&s.content))
                    .unwrap_or_default(),
                publish_year: entry.published.or(entry.updated).map(|d| d.year()),
                source: SOURCE_NAME.to_string(),
                html_url: arxiv_id.as_ref().map(|id| format!("https://arxiv.org/abs/{}", id)),
                primary_category: categories.first().cloned(),
                arxiv_id,
                doi,
                pdf_url,
                categories,
                ..WorkItem::default()
            })
        })
        .collect();

    Ok(items)
}

/// `2401.01234v2` from `http://arxiv.org/abs/2401.01234v2`.
fn short_id(entry_id: &str) -> Option<String> {
    entry_id
        .split("/abs/")
        .nth(1)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}

fn doi_from_url(url: &str) -> Option<String> {
    url.split_once("doi.org/").map(|(_, doi)| doi.to_string())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
