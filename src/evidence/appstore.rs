// App Store evidence provider
//
// Uses the public iTunes Search API, which needs no key. Mobile-adjacent
// domains get real app listings out of it; for purely web domains it
// usually returns nothing, which the fan-out treats as an empty branch,
// not a failure.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::{EvidenceError, EvidenceProvider, SearchPlan};
use crate::models::CompetitorCandidate;

const ITUNES_SEARCH_URL: &str = "https://itunes.apple.com/search";
const APPSTORE_TIMEOUT: Duration = Duration::from_secs(15);
const RESULT_LIMIT: usize = 10;
const DESCRIPTION_SNIPPET_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct ItunesResponse {
    #[serde(default)]
    results: Vec<ItunesApp>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItunesApp {
    #[serde(default)]
    track_name: String,
    #[serde(default)]
    track_view_url: Option<String>,
    #[serde(default)]
    description: String,
}

pub struct AppStoreProvider {
    client: reqwest::Client,
}

impl AppStoreProvider {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(APPSTORE_TIMEOUT)
            .build()
            .unwrap_or_default();
        AppStoreProvider { client }
    }
}

impl Default for AppStoreProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceProvider for AppStoreProvider {
    fn name(&self) -> &'static str {
        "app_store"
    }

    async fn candidates(&self, plan: &SearchPlan) -> Result<Vec<CompetitorCandidate>, EvidenceError> {
        let term = format!("{} {}", plan.domain, plan.keywords);
        let response: ItunesResponse = self
            .client
            .get(ITUNES_SEARCH_URL)
            .query(&[
                ("media", "software"),
                ("entity", "software"),
                ("limit", &RESULT_LIMIT.to_string()),
                ("term", term.trim()),
            ])
            .send()
            .await
            .map_err(transport_error)?
            .error_for_status()
            .map_err(transport_error)?
            .json()
            .await
            .map_err(transport_error)?;

        Ok(response
            .results
            .into_iter()
            .filter(|app| !app.track_name.trim().is_empty())
            .map(|app| CompetitorCandidate {
                name: app.track_name.trim().to_string(),
                url: app.track_view_url,
                snippet: snippet_of(&app.description),
                source: "app_store".to_string(),
            })
            .collect())
    }
}

fn transport_error(e: reqwest::Error) -> EvidenceError {
    EvidenceError::Provider {
        provider: "app_store".to_string(),
        message: e.to_string(),
    }
}

/// App descriptions run to thousands of characters; keep the opening only
fn snippet_of(description: &str) -> String {
    let collapsed = description.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= DESCRIPTION_SNIPPET_CHARS {
        collapsed
    } else {
        let cut: String = collapsed.chars().take(DESCRIPTION_SNIPPET_CHARS).collect();
        format!("{}…", cut.trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_itunes_response_deserialization() {
        let body = r#"{
            "resultCount": 1,
            "results": [{
                "trackName": "Notability",
                "trackViewUrl": "https://apps.apple.com/app/notability/id360593530",
                "description": "Note-taking for iPad"
            }]
        }"#;
        let parsed: ItunesResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].track_name, "Notability");
    }

    #[test]
    fn test_itunes_response_tolerates_missing_fields() {
        let parsed: ItunesResponse = serde_json::from_str(r#"{"results": [{}]}"#).unwrap();
        assert_eq!(parsed.results[0].track_name, "");
        assert!(parsed.results[0].track_view_url.is_none());
    }

    #[test]
    fn test_snippet_of_collapses_and_truncates() {
        assert_eq!(snippet_of("short  description\nhere"), "short description here");

        let long = "word ".repeat(200);
        let snippet = snippet_of(&long);
        assert!(snippet.chars().count() <= DESCRIPTION_SNIPPET_CHARS + 1);
        assert!(snippet.ends_with('…'));
    }
}
