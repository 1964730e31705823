// src/learning/discovery.rs
//
// Default collaborators for the topic worker: a community Q&A search
// provider for candidate URLs and an HTTP paragraph extractor. Both
// are behind traits so tests can substitute fixtures.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use serde::Deserialize;
use std::time::Duration;

use crate::learning::types::{ContentExtractor, SourceDiscovery};

const SEARCH_ENDPOINT: &str = "https://api.stackexchange.com/2.3/search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: Option<String>,
}

fn shared_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(
            "assistant-orchestrator/",
            env!("CARGO_PKG_VERSION")
        ))
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(15))
        .build()
        .context("building http client")
}

/// Finds question links on a Stack Exchange site for a topic.
pub struct StackExchangeDiscovery {
    mode: Mode,
    site: String,
}

enum Mode {
    Fixture(String),
    Http(reqwest::Client),
}

impl StackExchangeDiscovery {
    pub fn new() -> Result<Self> {
        Ok(Self {
            mode: Mode::Http(shared_client()?),
            site: "stackoverflow".to_string(),
        })
    }

    /// Build from a canned API response body (tests).
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
            site: "stackoverflow".to_string(),
        }
    }

    fn parse_links(body: &str) -> Result<Vec<String>> {
        let resp: SearchResponse = serde_json::from_str(body).context("parsing search json")?;
        let links = resp.items.into_iter().filter_map(|i| i.link).collect();
        Ok(links)
    }
}

#[async_trait]
impl SourceDiscovery for StackExchangeDiscovery {
    async fn discover(&self, topic: &str) -> Result<Vec<String>> {
        let body = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http(client) => {
                let resp = client
                    .get(SEARCH_ENDPOINT)
                    .query(&[
                        ("order", "desc"),
                        ("sort", "votes"),
                        ("intitle", topic),
                        ("site", self.site.as_str()),
                    ])
                    .send()
                    .await
                    .context("search request")?;
                if !resp.status().is_success() {
                    counter!("learning_discovery_errors_total").increment(1);
                    return Err(anyhow!("search returned HTTP {}", resp.status()));
                }
                resp.text().await.context("search body")?
            }
        };
        Self::parse_links(&body)
    }

    fn name(&self) -> &'static str {
        "stackexchange"
    }
}

/// Fetches a page and extracts readable paragraph text.
pub struct HttpExtractor {
    client: reqwest::Client,
    max_chars: usize,
}

impl HttpExtractor {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: shared_client()?,
            max_chars: 4000,
        })
    }
}

#[async_trait]
impl ContentExtractor for HttpExtractor {
    async fn extract(&self, url: &str) -> Result<Option<String>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetching {url}"))?;
        if !resp.status().is_success() {
            return Err(anyhow!("{url}: HTTP {}", resp.status()));
        }
        let html = resp.text().await.with_context(|| format!("reading {url}"))?;
        Ok(extract_paragraphs(&html, self.max_chars))
    }
}

/// Pull paragraph text out of an HTML document and normalize it.
/// Returns `None` when nothing usable remains.
pub(crate) fn extract_paragraphs(html: &str, max_chars: usize) -> Option<String> {
    let doc = scraper::Html::parse_document(html);
    let p_sel = scraper::Selector::parse("p").expect("static selector");
    let joined = doc
        .select(&p_sel)
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");
    let text = normalize_extracted(&joined, max_chars);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Normalize extracted text: decode entities, collapse whitespace,
/// cap length.
pub(crate) fn normalize_extracted(s: &str, max_chars: usize) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }
    out
}
