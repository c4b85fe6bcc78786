//! Page fetching: `fetch(url) → visible text`.
//!
//! The contract is deliberately narrow: GET the URL with an honest
//! User-Agent, follow redirects, honor 429 Retry-After, and reduce the HTML
//! to visible text capped at 10 KB. Step-level retry/timeout policy lives in
//! the engine; this layer only handles rate-limit backoff.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use tracing::{debug, warn};

use terascout_common::TerascoutError;

/// Visible-text cap for extracted pages.
pub const MAX_VISIBLE_TEXT_BYTES: usize = 10_000;

const USER_AGENT: &str = "terascout/0.1 (event scout; +https://github.com/terascout/terascout)";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra attempts allowed when the server answers 429.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(5);

// --- PageFetcher trait ---

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a URL and return its visible text, capped at
    /// [`MAX_VISIBLE_TEXT_BYTES`].
    async fn fetch(&self, url: &str) -> Result<String>;
}

// --- Reqwest-backed fetcher ---

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let mut rate_limit_retries = 0;
        loop {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("Request failed for {url}"))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && rate_limit_retries < MAX_RATE_LIMIT_RETRIES
            {
                rate_limit_retries += 1;
                let delay = retry_after(&response).min(MAX_RETRY_AFTER);
                warn!(
                    url,
                    attempt = rate_limit_retries,
                    delay_secs = delay.as_secs(),
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }
            if !status.is_success() {
                bail!(TerascoutError::Fetch(format!("{url} returned {status}")));
            }

            let html = response
                .text()
                .await
                .with_context(|| format!("Failed to read body from {url}"))?;
            let text = html_to_text(&html);
            debug!(url, bytes = text.len(), "Fetched page text");
            return Ok(text);
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Reduce an HTML document to its visible text: text nodes only, script/style
/// and other non-rendered subtrees skipped, whitespace collapsed to single
/// spaces, capped at [`MAX_VISIBLE_TEXT_BYTES`] on a char boundary.
pub fn html_to_text(html: &str) -> String {
    let doc = scraper::Html::parse_document(html);
    let mut parts: Vec<String> = Vec::new();

    // Depth-first, document order; skipped subtrees never have their
    // children pushed.
    let mut stack = vec![doc.tree.root()];
    while let Some(node) = stack.pop() {
        if let Some(element) = node.value().as_element() {
            if matches!(
                element.name(),
                "script" | "style" | "noscript" | "template" | "head" | "svg"
            ) {
                continue;
            }
        }
        if let Some(text) = node.value().as_text() {
            let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
            if !collapsed.is_empty() {
                parts.push(collapsed);
            }
        }
        let children: Vec<_> = node.children().collect();
        for child in children.into_iter().rev() {
            stack.push(child);
        }
    }

    let joined = parts.join(" ");
    ai_client::truncate_to_char_boundary(&joined, MAX_VISIBLE_TEXT_BYTES).to_string()
}
