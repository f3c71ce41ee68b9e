use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::config::SearchConfig;
use crate::models::SearchResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchProvider {
    /// DuckDuckGo's no-JavaScript HTML endpoint.
    DuckDuckGo { base_url: String },
    /// A SearXNG instance with the JSON output format enabled.
    Searxng { base_url: String },
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("search provider returned HTTP {status}")]
    Status { status: u16 },
    #[error("failed to decode search response: {0}")]
    Decode(String),
}

#[derive(Deserialize)]
struct SearxngResponse {
    #[serde(default)]
    results: Vec<SearxngResult>,
}

#[derive(Deserialize)]
struct SearxngResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

#[derive(Clone)]
pub struct WebSearchClient {
    client: Client,
    config: SearchConfig,
}

impl WebSearchClient {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Up to `max_results` hits. Provider or network failures are logged and
    /// yield an empty list.
    pub async fn search(&self, query: &str) -> Vec<SearchResult> {
        match self.try_search(query).await {
            Ok(results) => results,
            Err(err) => {
                tracing::warn!(error = %err, "web search failed");
                Vec::new()
            }
        }
    }

    pub async fn try_search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let mut results = match &self.config.provider {
            SearchProvider::DuckDuckGo { base_url } => self.search_duckduckgo(base_url, query).await?,
            SearchProvider::Searxng { base_url } => self.search_searxng(base_url, query).await?,
        };
        results.truncate(self.config.max_results);
        tracing::debug!(count = results.len(), "web search completed");
        Ok(results)
    }

    async fn search_duckduckgo(
        &self,
        base_url: &str,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let response = self
            .client
            .get(base_url)
            .query(&[("q", query)])
            .header(reqwest::header::USER_AGENT, "Mozilla/5.0 (X11; Linux x86_64)")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        parse_duckduckgo_html(&body)
    }

    async fn search_searxng(
        &self,
        base_url: &str,
        query: &str,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let url = format!("{}/search", base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Status {
                status: response.status().as_u16(),
            });
        }

        let body = response.text().await?;
        let parsed: SearxngResponse =
            serde_json::from_str(&body).map_err(|e| SearchError::Decode(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.url.is_empty())
            .map(|r| SearchResult::new(r.title, r.url, r.content))
            .collect())
    }
}

fn parse_duckduckgo_html(body: &str) -> Result<Vec<SearchResult>, SearchError> {
    let document = Html::parse_document(body);
    let result_sel = selector("div.result")?;
    let link_sel = selector("a.result__a")?;
    let snippet_sel = selector(".result__snippet")?;

    let mut results = Vec::new();
    for block in document.select(&result_sel) {
        let is_ad = block
            .value()
            .classes()
            .any(|class| class == "result--ad");
        if is_ad {
            continue;
        }

        let Some(link) = block.select(&link_sel).next() else {
            continue;
        };
        let Some(href) = link.value().attr("href").and_then(resolve_duckduckgo_href) else {
            continue;
        };

        let snippet = block
            .select(&snippet_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();

        results.push(SearchResult::new(element_text(link), href, snippet));
    }

    Ok(results)
}

fn selector(css: &str) -> Result<Selector, SearchError> {
    Selector::parse(css).map_err(|e| SearchError::Decode(format!("bad selector {css}: {e}")))
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Result links are wrapped in `//duckduckgo.com/l/?uddg=<target>` redirects.
fn resolve_duckduckgo_href(href: &str) -> Option<String> {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };

    let parsed = Url::parse(&absolute).ok()?;
    if parsed.path().starts_with("/l/") {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "uddg")
            .map(|(_, target)| target.into_owned());
    }

    matches!(parsed.scheme(), "http" | "https").then_some(absolute)
}
