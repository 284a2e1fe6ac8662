// Competitor page fetching
//
// Enriches the merged candidate set with text pulled from competitor
// homepages. Fetches run under a semaphore sized by configuration, and
// fetched text is tag-stripped and truncated at a sentence boundary so
// one verbose page cannot dominate the synthesis prompt.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Semaphore;

use super::EvidenceError;
use crate::config::EvidenceConfig;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);

static SCRIPT_REGEX: OnceLock<Regex> = OnceLock::new();
static TAG_REGEX: OnceLock<Regex> = OnceLock::new();

fn script_regex() -> &'static Regex {
    SCRIPT_REGEX.get_or_init(|| {
        Regex::new(r"(?is)<(script|style|noscript)[^>]*>.*?</(script|style|noscript)>")
            .expect("script regex must compile")
    })
}

fn tag_regex() -> &'static Regex {
    TAG_REGEX.get_or_init(|| Regex::new(r"<[^>]+>").expect("tag regex must compile"))
}

/// Reduce an HTML document to whitespace-normalized visible text
pub fn strip_html(html: &str) -> String {
    let without_scripts = script_regex().replace_all(html, " ");
    let without_tags = tag_regex().replace_all(&without_scripts, " ");
    without_tags.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Truncate text to at most `max_chars`, preferring a sentence boundary in
/// the second half of the window over a hard cut.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let window: String = text.chars().take(max_chars).collect();
    let floor = max_chars / 2;
    let boundary = window
        .char_indices()
        .filter(|(_, c)| *c == '.' || *c == '!' || *c == '?')
        .map(|(i, c)| i + c.len_utf8())
        .filter(|&end| window[..end].chars().count() > floor)
        .last();

    match boundary {
        Some(end) => window[..end].trim_end().to_string(),
        None => window.trim_end().to_string(),
    }
}

/// Concurrency-bounded page fetcher
pub struct PageFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
    max_chars: usize,
}

impl PageFetcher {
    pub fn new(config: &EvidenceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        PageFetcher {
            client,
            permits: Arc::new(Semaphore::new(config.page_fetch_concurrency.max(1))),
            max_chars: config.max_page_chars,
        }
    }

    /// Fetch one page and return its truncated visible text
    pub async fn fetch(&self, url: &str) -> Result<String, EvidenceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| fetch_error(url, "fetch pool closed"))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(url, &e.to_string()))?
            .error_for_status()
            .map_err(|e| fetch_error(url, &e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| fetch_error(url, &e.to_string()))?;

        let text = truncate_at_sentence(&strip_html(&body), self.max_chars);
        if text.is_empty() {
            return Err(fetch_error(url, "page has no visible text"));
        }
        Ok(text)
    }
}

fn fetch_error(url: &str, message: &str) -> EvidenceError {
    EvidenceError::Provider {
        provider: "page".to_string(),
        message: format!("{}: {}", url, message),
    }
}
