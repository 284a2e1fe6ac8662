// Web and forum search providers
//
// Search runs through its own small provider chain (Tavily, then Serper),
// distinct from the LLM fallback chain: a transport failure tries the next
// search backend within the same call, and nothing is remembered across
// calls. The forum provider is the web searcher with a site-restricted
// query.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{EvidenceError, EvidenceProvider, SearchPlan};
use crate::config::EvidenceConfig;
use crate::models::CompetitorCandidate;

const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

const TAVILY_URL: &str = "https://api.tavily.com/search";
const SERPER_URL: &str = "https://google.serper.dev/search";

/// One raw search result, before candidate mapping
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub title: String,
    pub url: Option<String>,
    pub snippet: String,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperResult>,
}

#[derive(Debug, Deserialize)]
struct SerperResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    snippet: String,
}

/// Search client trying the configured backends in order
pub struct SearchClient {
    client: reqwest::Client,
    tavily_key_env: String,
    serper_key_env: String,
    results_per_query: usize,
}

impl SearchClient {
    pub fn new(config: &EvidenceConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(SEARCH_TIMEOUT)
            .build()
            .unwrap_or_default();
        SearchClient {
            client,
            tavily_key_env: config.tavily_api_key_env.clone(),
            serper_key_env: config.serper_api_key_env.clone(),
            results_per_query: config.results_per_query,
        }
    }

    fn key(env: &str) -> Option<String> {
        std::env::var(env).ok().filter(|k| !k.trim().is_empty())
    }

    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>, EvidenceError> {
        let mut last_error: Option<EvidenceError> = None;

        if let Some(key) = Self::key(&self.tavily_key_env) {
            match self.search_tavily(&key, query).await {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    log::warn!("Tavily search failed, trying next backend: {}", e);
                    last_error = Some(e);
                }
            }
        }

        if let Some(key) = Self::key(&self.serper_key_env) {
            match self.search_serper(&key, query).await {
                Ok(hits) => return Ok(hits),
                Err(e) => {
                    log::warn!("Serper search failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| EvidenceError::Provider {
            provider: "search".to_string(),
            message: "no search backend configured".to_string(),
        }))
    }

    async fn search_tavily(&self, key: &str, query: &str) -> Result<Vec<SearchHit>, EvidenceError> {
        let body = json!({
            "api_key": key,
            "query": query,
            "max_results": self.results_per_query,
        });

        let response: TavilyResponse = self
            .client
            .post(TAVILY_URL)
            .json(&body)
            .send()
            .await
            .map_err(provider_error("tavily"))?
            .error_for_status()
            .map_err(provider_error("tavily"))?
            .json()
            .await
            .map_err(provider_error("tavily"))?;

        Ok(response
            .results
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.content,
            })
            .collect())
    }

    async fn search_serper(&self, key: &str, query: &str) -> Result<Vec<SearchHit>, EvidenceError> {
        let body = json!({ "q": query, "num": self.results_per_query });

        let response: SerperResponse = self
            .client
            .post(SERPER_URL)
            .header("X-API-KEY", key)
            .json(&body)
            .send()
            .await
            .map_err(provider_error("serper"))?
            .error_for_status()
            .map_err(provider_error("serper"))?
            .json()
            .await
            .map_err(provider_error("serper"))?;

        Ok(response
            .organic
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                url: r.link,
                snippet: r.snippet,
            })
            .collect())
    }
}

fn provider_error(provider: &'static str) -> impl Fn(reqwest::Error) -> EvidenceError {
    move |e| EvidenceError::Provider {
        provider: provider.to_string(),
        message: e.to_string(),
    }
}

/// Strip marketing suffixes from a result title to get a product name.
/// "Notion – Your connected workspace" becomes "Notion".
pub fn clean_product_name(title: &str) -> String {
    let mut name = title;
    for separator in [" - ", " – ", " — ", " | ", ": "] {
        if let Some(head) = name.split(separator).next() {
            name = head;
        }
    }
    name.trim().to_string()
}

fn hits_to_candidates(hits: Vec<SearchHit>, source: &str) -> Vec<CompetitorCandidate> {
    hits.into_iter()
        .filter(|h| !h.title.trim().is_empty())
        .map(|h| CompetitorCandidate {
            name: clean_product_name(&h.title),
            url: h.url,
            snippet: h.snippet,
            source: source.to_string(),
        })
        .collect()
}

/// General web search for competitor leads
pub struct WebSearchProvider {
    client: SearchClient,
}

impl WebSearchProvider {
    pub fn new(config: &EvidenceConfig) -> Self {
        WebSearchProvider {
            client: SearchClient::new(config),
        }
    }
}

#[async_trait]
impl EvidenceProvider for WebSearchProvider {
    fn name(&self) -> &'static str {
        "web_search"
    }

    async fn candidates(&self, plan: &SearchPlan) -> Result<Vec<CompetitorCandidate>, EvidenceError> {
        let query = format!("best {} {} alternatives", plan.domain, plan.keywords)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let hits = self.client.search(&query).await?;
        Ok(hits_to_candidates(hits, self.name()))
    }
}

/// Site-restricted search over reddit for user sentiment and complaints
pub struct ForumSearchProvider {
    client: SearchClient,
}

impl ForumSearchProvider {
    pub fn new(config: &EvidenceConfig) -> Self {
        ForumSearchProvider {
            client: SearchClient::new(config),
        }
    }
}

#[async_trait]
impl EvidenceProvider for ForumSearchProvider {
    fn name(&self) -> &'static str {
        "forum"
    }

    async fn candidates(&self, plan: &SearchPlan) -> Result<Vec<CompetitorCandidate>, EvidenceError> {
        let query = format!(
            "site:reddit.com {} {} recommendations complaints",
            plan.domain, plan.keywords
        )
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
        let hits = self.client.search(&query).await?;
        Ok(hits_to_candidates(hits, self.name()))
    }
}
