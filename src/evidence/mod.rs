// Evidence fan-out for competitor discovery
//
// The fan-out runs every evidence provider concurrently against one search
// plan, merges whatever came back with any cached evidence for the same
// domain, and hands the merged candidate set to the LLM for profile
// synthesis. A failed or timed-out provider degrades that branch to empty;
// the call only fails outright when every branch and the cache are empty.

pub mod appstore;
pub mod fetch;
pub mod search;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::EvidenceConfig;
use crate::llm::{competitors_schema, LlmGateway};
use crate::models::{ClarificationContext, CompetitorCandidate, CompetitorProfile};
use crate::storage::cache_ops;

pub use appstore::AppStoreProvider;
pub use fetch::PageFetcher;
pub use search::{ForumSearchProvider, WebSearchProvider};

/// Ceiling on a single provider branch, including its network retries
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// How many merged candidates get a homepage fetch
const PAGE_ENRICH_LIMIT: usize = 3;

/// Combined-snippet ceiling for one merged candidate
const MERGED_SNIPPET_CHARS: usize = 700;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("evidence provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("no competitor evidence found: every provider and the cache came back empty")]
    Exhausted,

    #[error("competitor synthesis failed: {0}")]
    Synthesis(String),
}

/// Query context shared by every provider branch
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub domain: String,
    /// Space-joined clarification choices, used to sharpen queries
    pub keywords: String,
}

impl SearchPlan {
    pub fn new(domain: &str, clarifications: &ClarificationContext) -> Self {
        let keywords = clarifications
            .entries
            .iter()
            .flat_map(|e| e.choices.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        SearchPlan {
            domain: domain.to_string(),
            keywords,
        }
    }
}

/// One evidence source. Implementations must be cheap to call concurrently.
#[async_trait]
pub trait EvidenceProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn candidates(&self, plan: &SearchPlan) -> Result<Vec<CompetitorCandidate>, EvidenceError>;
}

/// Outcome of one fan-out invocation
#[derive(Debug, Clone)]
pub struct FanOutReport {
    pub profiles: Vec<CompetitorProfile>,
    /// Branches (and "cache") that contributed at least one candidate
    pub provenance: Vec<String>,
    /// Branches that failed or timed out this invocation
    pub degraded: Vec<String>,
}

/// Profile shape the synthesis prompt asks the model for; ids and source
/// attribution are attached locally.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizedProfile {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    pricing: Option<String>,
    #[serde(default)]
    reddit_sentiment: Option<String>,
}

pub struct EvidenceFanOut {
    providers: Vec<Arc<dyn EvidenceProvider>>,
    gateway: Arc<LlmGateway>,
    data_root: PathBuf,
    fetcher: Option<Arc<PageFetcher>>,
    provider_timeout: Duration,
}

impl EvidenceFanOut {
    pub fn new(config: &EvidenceConfig, gateway: Arc<LlmGateway>, data_root: &Path) -> Self {
        let providers: Vec<Arc<dyn EvidenceProvider>> = vec![
            Arc::new(WebSearchProvider::new(config)),
            Arc::new(ForumSearchProvider::new(config)),
            Arc::new(AppStoreProvider::new()),
        ];
        EvidenceFanOut {
            providers,
            gateway,
            data_root: data_root.to_path_buf(),
            fetcher: Some(Arc::new(PageFetcher::new(config))),
            provider_timeout: PROVIDER_TIMEOUT,
        }
    }

    /// Construct with explicit providers and no page enrichment
    pub fn with_providers(
        providers: Vec<Arc<dyn EvidenceProvider>>,
        gateway: Arc<LlmGateway>,
        data_root: &Path,
    ) -> Self {
        EvidenceFanOut {
            providers,
            gateway,
            data_root: data_root.to_path_buf(),
            fetcher: None,
            provider_timeout: PROVIDER_TIMEOUT,
        }
    }

    /// Run the full fan-out for a domain: providers concurrently, cache as
    /// a floor, merge, optional page enrichment, then LLM synthesis.
    pub async fn gather_competitors(
        &self,
        domain: &str,
        clarifications: &ClarificationContext,
    ) -> Result<FanOutReport, EvidenceError> {
        let plan = SearchPlan::new(domain, clarifications);

        let mut provenance = Vec::new();
        let mut degraded = Vec::new();
        let mut live: Vec<CompetitorCandidate> = Vec::new();

        let mut branches = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let plan = plan.clone();
            let timeout = self.provider_timeout;
            branches.push(tokio::spawn(async move {
                let name = provider.name();
                match tokio::time::timeout(timeout, provider.candidates(&plan)).await {
                    Ok(result) => (name, result),
                    Err(_) => (
                        name,
                        Err(EvidenceError::Provider {
                            provider: name.to_string(),
                            message: format!("timed out after {:?}", timeout),
                        }),
                    ),
                }
            }));
        }

        for branch in branches {
            match branch.await {
                Ok((name, Ok(candidates))) => {
                    log::debug!("Provider '{}' returned {} candidates", name, candidates.len());
                    if !candidates.is_empty() {
                        provenance.push(name.to_string());
                    }
                    live.extend(candidates);
                }
                Ok((name, Err(e))) => {
                    log::warn!("Provider '{}' degraded to empty: {}", name, e);
                    degraded.push(name.to_string());
                }
                Err(e) => {
                    log::warn!("Evidence branch panicked: {}", e);
                    degraded.push("unknown".to_string());
                }
            }
        }

        let mut all = live.clone();
        match cache_ops::get(&self.data_root, domain) {
            Ok(Some(entry)) if !entry.payload.is_empty() => {
                log::debug!(
                    "Cache floor for '{}': {} candidates from {}",
                    domain,
                    entry.payload.len(),
                    entry.fetched_at
                );
                provenance.push("cache".to_string());
                all.extend(entry.payload);
            }
            Ok(_) => {}
            Err(e) => log::warn!("Cache read failed for '{}': {}", domain, e),
        }

        let mut merged = merge_candidates(all);
        if merged.is_empty() {
            return Err(EvidenceError::Exhausted);
        }

        if let Some(fetcher) = &self.fetcher {
            let pages = self.fetch_pages(fetcher, &merged).await;
            if !pages.is_empty() {
                provenance.push("page".to_string());
                merged.extend(pages);
            }
        }

        if !live.is_empty() {
            if let Err(e) = cache_ops::put(&self.data_root, domain, merged.clone(), "fan_out") {
                log::warn!("Cache write failed for '{}': {}", domain, e);
            }
        }

        let profiles = self.synthesize(domain, clarifications, &merged).await?;
        Ok(FanOutReport {
            profiles,
            provenance,
            degraded,
        })
    }

    /// Fetch homepages for the first few candidates that have URLs. Failures
    /// are logged and dropped; page text never blocks the fan-out.
    async fn fetch_pages(
        &self,
        fetcher: &Arc<PageFetcher>,
        merged: &[CompetitorCandidate],
    ) -> Vec<CompetitorCandidate> {
        let targets: Vec<(String, String)> = merged
            .iter()
            .filter_map(|c| c.url.as_ref().map(|u| (c.name.clone(), u.clone())))
            .take(PAGE_ENRICH_LIMIT)
            .collect();

        let mut fetches = Vec::with_capacity(targets.len());
        for (name, url) in targets {
            let fetcher = Arc::clone(fetcher);
            fetches.push(tokio::spawn(async move {
                let text = fetcher.fetch(&url).await;
                (name, url, text)
            }));
        }

        let mut pages = Vec::new();
        for fetch in fetches {
            match fetch.await {
                Ok((name, url, Ok(text))) => pages.push(CompetitorCandidate {
                    name,
                    url: Some(url),
                    snippet: text,
                    source: "page".to_string(),
                }),
                Ok((_, url, Err(e))) => log::debug!("Page fetch skipped ({}): {}", url, e),
                Err(e) => log::debug!("Page fetch task failed: {}", e),
            }
        }
        pages
    }

    async fn synthesize(
        &self,
        domain: &str,
        clarifications: &ClarificationContext,
        candidates: &[CompetitorCandidate],
    ) -> Result<Vec<CompetitorProfile>, EvidenceError> {
        // Serialize with explicit nulls; the template tests each field
        let candidate_values: Vec<serde_json::Value> = candidates
            .iter()
            .map(|c| {
                json!({
                    "name": c.name,
                    "url": c.url,
                    "snippet": c.snippet,
                    "source": c.source,
                })
            })
            .collect();

        let mut bindings = tera::Context::new();
        bindings.insert("domain", domain);
        bindings.insert("clarifications", &clarifications.summary());
        bindings.insert("candidates", &candidate_values);

        let value = self
            .gateway
            .invoke(
                crate::prompts::builtin::SYNTHESIZE_COMPETITORS,
                &bindings,
                &competitors_schema(),
            )
            .await
            .map_err(|e| EvidenceError::Synthesis(e.to_string()))?;

        let raw: Vec<SynthesizedProfile> =
            serde_json::from_value(value["competitors"].clone())
                .map_err(|e| EvidenceError::Synthesis(format!("unparseable profiles: {}", e)))?;
        if raw.is_empty() {
            return Err(EvidenceError::Synthesis(
                "model produced no usable competitor profiles".to_string(),
            ));
        }

        // Source attribution comes from the evidence, not the model
        let mut sources_by_name: HashMap<String, Vec<String>> = HashMap::new();
        for candidate in candidates {
            let entry = sources_by_name.entry(normalize_name(&candidate.name)).or_default();
            for source in candidate.source.split('+') {
                if !entry.iter().any(|s| s == source) {
                    entry.push(source.to_string());
                }
            }
        }

        Ok(raw
            .into_iter()
            .map(|p| {
                let sources = sources_by_name
                    .get(&normalize_name(&p.name))
                    .cloned()
                    .unwrap_or_else(|| vec!["synthesis".to_string()]);
                CompetitorProfile {
                    id: slug_id(&p.name),
                    name: p.name,
                    url: p.url,
                    description: p.description,
                    features: p.features,
                    weaknesses: p.weaknesses,
                    pricing: p.pricing,
                    reddit_sentiment: p.reddit_sentiment,
                    sources,
                }
            })
            .collect())
    }
}

/// Case- and punctuation-insensitive name key for de-duplication
fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Stable lowercase-dash identifier derived from a display name
pub fn slug_id(name: &str) -> String {
    let mut id = String::new();
    let mut last_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
            last_dash = false;
        } else if !last_dash {
            id.push('-');
            last_dash = true;
        }
    }
    let id = id.trim_matches('-').to_string();
    if id.is_empty() {
        "competitor".to_string()
    } else {
        id
    }
}

/// Merge candidates that refer to the same product. The first mention wins
/// the display name and URL; snippets are concatenated up to a ceiling and
/// contributing sources are recorded as a `+`-joined list.
pub fn merge_candidates(candidates: Vec<CompetitorCandidate>) -> Vec<CompetitorCandidate> {
    let mut order: Vec<String> = Vec::new();
    let mut by_key: HashMap<String, CompetitorCandidate> = HashMap::new();

    for candidate in candidates {
        let key = normalize_name(&candidate.name);
        if key.is_empty() {
            continue;
        }
        match by_key.get_mut(&key) {
            None => {
                order.push(key.clone());
                by_key.insert(key, candidate);
            }
            Some(existing) => {
                if existing.url.is_none() {
                    existing.url = candidate.url;
                }
                let snippet = candidate.snippet.trim();
                if !snippet.is_empty()
                    && !existing.snippet.contains(snippet)
                    && existing.snippet.chars().count() < MERGED_SNIPPET_CHARS
                {
                    if !existing.snippet.is_empty() {
                        existing.snippet.push_str(" | ");
                    }
                    existing.snippet.push_str(snippet);
                }
                for source in candidate.source.split('+') {
                    if !existing.source.split('+').any(|s| s == source) {
                        existing.source.push('+');
                        existing.source.push_str(source);
                    }
                }
            }
        }
    }

    order
        .into_iter()
        .filter_map(|key| by_key.remove(&key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::llm::ChatMessage;
    use crate::llm::ChatTransport;
    use crate::prompts::PromptResolver;
    use tempfile::TempDir;

    fn candidate(name: &str, source: &str) -> CompetitorCandidate {
        CompetitorCandidate {
            name: name.to_string(),
            url: Some(format!("https://{}.example.com", normalize_name(name))),
            snippet: format!("{} via {}", name, source),
            source: source.to_string(),
        }
    }

    struct StubProvider {
        name: &'static str,
        outcome: Result<Vec<CompetitorCandidate>, String>,
    }

    #[async_trait]
    impl EvidenceProvider for StubProvider {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn candidates(
            &self,
            _plan: &SearchPlan,
        ) -> Result<Vec<CompetitorCandidate>, EvidenceError> {
            match &self.outcome {
                Ok(candidates) => Ok(candidates.clone()),
                Err(message) => Err(EvidenceError::Provider {
                    provider: self.name.to_string(),
                    message: message.clone(),
                }),
            }
        }
    }

    /// Transport that answers every completion with one canned body
    struct CannedTransport {
        body: String,
    }

    #[async_trait]
    impl ChatTransport for CannedTransport {
        async fn complete(
            &self,
            _provider: &ProviderConfig,
            _messages: &[ChatMessage],
        ) -> Result<String, crate::llm::LlmError> {
            Ok(self.body.clone())
        }
    }

    fn canned_gateway(body: &str) -> Arc<LlmGateway> {
        let provider = ProviderConfig {
            id: "stub".to_string(),
            base_url: "https://stub.invalid/v1".to_string(),
            model: "stub-model".to_string(),
            api_key_env: "BLUEPRINT_STUB_KEY".to_string(),
        };
        Arc::new(LlmGateway::with_transport(
            vec![provider],
            PromptResolver::new(),
            Arc::new(CannedTransport {
                body: body.to_string(),
            }),
        ))
    }

    const SYNTH_BODY: &str = r#"{
        "competitors": [{
            "name": "Notion",
            "url": "https://notion.so",
            "description": "All-in-one workspace",
            "features": ["databases", "wikis"],
            "weaknesses": ["slow search"],
            "pricing": null,
            "redditSentiment": null
        }]
    }"#;

    fn fan_out(
        providers: Vec<Arc<dyn EvidenceProvider>>,
        temp: &TempDir,
    ) -> EvidenceFanOut {
        EvidenceFanOut::with_providers(providers, canned_gateway(SYNTH_BODY), temp.path())
    }

    #[tokio::test]
    async fn test_partial_provider_failure_degrades_not_fails() {
        let temp = TempDir::new().unwrap();
        let providers: Vec<Arc<dyn EvidenceProvider>> = vec![
            Arc::new(StubProvider {
                name: "web_stub",
                outcome: Ok(vec![candidate("Notion", "web_stub")]),
            }),
            Arc::new(StubProvider {
                name: "forum_stub",
                outcome: Err("search backend down".to_string()),
            }),
        ];

        let report = fan_out(providers, &temp)
            .gather_competitors("note-taking apps", &ClarificationContext::default())
            .await
            .unwrap();

        assert_eq!(report.profiles.len(), 1);
        assert_eq!(report.profiles[0].id, "notion");
        assert_eq!(report.provenance, vec!["web_stub".to_string()]);
        assert_eq!(report.degraded, vec!["forum_stub".to_string()]);
        assert_eq!(report.profiles[0].sources, vec!["web_stub".to_string()]);
    }

    #[tokio::test]
    async fn test_all_branches_empty_is_exhausted() {
        let temp = TempDir::new().unwrap();
        let providers: Vec<Arc<dyn EvidenceProvider>> = vec![
            Arc::new(StubProvider {
                name: "web_stub",
                outcome: Ok(vec![]),
            }),
            Arc::new(StubProvider {
                name: "forum_stub",
                outcome: Err("down".to_string()),
            }),
        ];

        let result = fan_out(providers, &temp)
            .gather_competitors("note-taking apps", &ClarificationContext::default())
            .await;

        assert!(matches!(result, Err(EvidenceError::Exhausted)));
    }

    #[tokio::test]
    async fn test_cache_floor_rescues_failed_providers() {
        let temp = TempDir::new().unwrap();
        cache_ops::put(
            temp.path(),
            "note-taking apps",
            vec![candidate("Notion", "web_search")],
            "fan_out",
        )
        .unwrap();

        let providers: Vec<Arc<dyn EvidenceProvider>> = vec![Arc::new(StubProvider {
            name: "web_stub",
            outcome: Err("offline".to_string()),
        })];

        let report = fan_out(providers, &temp)
            .gather_competitors("note-taking apps", &ClarificationContext::default())
            .await
            .unwrap();

        assert_eq!(report.profiles.len(), 1);
        assert!(report.provenance.contains(&"cache".to_string()));
        assert_eq!(report.degraded, vec!["web_stub".to_string()]);
    }

    #[tokio::test]
    async fn test_live_results_refresh_cache() {
        let temp = TempDir::new().unwrap();
        let providers: Vec<Arc<dyn EvidenceProvider>> = vec![Arc::new(StubProvider {
            name: "web_stub",
            outcome: Ok(vec![candidate("Notion", "web_stub")]),
        })];

        fan_out(providers, &temp)
            .gather_competitors("note-taking apps", &ClarificationContext::default())
            .await
            .unwrap();

        let entry = cache_ops::get(temp.path(), "note-taking apps")
            .unwrap()
            .expect("fan-out should have written the cache");
        assert_eq!(entry.provider, "fan_out");
        assert_eq!(entry.payload[0].name, "Notion");
    }

    #[test]
    fn test_merge_candidates_dedups_by_name() {
        let merged = merge_candidates(vec![
            candidate("Notion", "web_search"),
            CompetitorCandidate {
                name: "notion".to_string(),
                url: None,
                snippet: "great for wikis".to_string(),
                source: "forum".to_string(),
            },
            candidate("Obsidian", "web_search"),
        ]);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].name, "Notion");
        assert_eq!(merged[0].source, "web_search+forum");
        assert!(merged[0].snippet.contains("great for wikis"));
        assert!(merged[0].url.is_some());
        assert_eq!(merged[1].name, "Obsidian");
    }

    #[test]
    fn test_merge_candidates_skips_unnameable_entries() {
        let merged = merge_candidates(vec![CompetitorCandidate {
            name: "???".to_string(),
            url: None,
            snippet: "noise".to_string(),
            source: "web_search".to_string(),
        }]);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_search_plan_keywords_from_clarifications() {
        let clarifications = ClarificationContext {
            entries: vec![crate::models::ClarificationEntry {
                question: "Target platform?".to_string(),
                choices: vec!["iOS".to_string(), "Android".to_string()],
            }],
        };
        let plan = SearchPlan::new("note-taking apps", &clarifications);
        assert_eq!(plan.keywords, "iOS Android");
    }

    #[test]
    fn test_slug_id_slugs() {
        assert_eq!(slug_id("Notion"), "notion");
        assert_eq!(slug_id("Roam Research"), "roam-research");
        assert_eq!(slug_id("C++ IDE!"), "c-ide");
        assert_eq!(slug_id("???"), "competitor");
    }
}
