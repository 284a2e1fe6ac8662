// Individual pipeline stage computations
//
// Each function here does one stage's work against the gateway and returns
// a typed result. Persistence and event emission belong to the driver;
// these functions stay callable from tests without any journey on disk.

use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;

use super::PipelineError;
use crate::config::QUICK_RESPONSE_FALLBACKS;
use crate::evidence::slug_id;
use crate::llm::{
    classification_schema, gaps_schema, overview_schema, problem_schema, LlmGateway,
};
use crate::models::{
    Classification, ClarificationAnswer, ClarificationContext, ClarificationEntry,
    ClarificationQuestion, CompetitorProfile, MarketGap, MarketOverview, OpportunitySize,
    ProblemStatement,
};
use crate::prompts::builtin;

/// Classify the initial prompt into an intent, domain, and follow-up
/// questions.
pub async fn classify(gateway: &LlmGateway, prompt: &str) -> Result<Classification, PipelineError> {
    let mut bindings = tera::Context::new();
    bindings.insert("prompt", prompt);

    let value = gateway
        .invoke(builtin::CLASSIFY_INTENT, &bindings, &classification_schema())
        .await?;

    serde_json::from_value(value)
        .map_err(|e| PipelineError::Validation(format!("unparseable classification: {}", e)))
}

/// Inline reply for small-talk and off-topic prompts. Falls back to a
/// canned reply when the model did not supply one.
pub fn quick_response_text(classification: &Classification) -> String {
    classification
        .quick_response
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            QUICK_RESPONSE_FALLBACKS
                .choose(&mut rand::thread_rng())
                .copied()
                .unwrap_or(QUICK_RESPONSE_FALLBACKS[0])
                .to_string()
        })
}

/// Resolve submitted clarification answers against the offered questions.
/// Every referenced question and option id must exist; questions the user
/// skipped are simply absent from the context.
pub fn resolve_clarifications(
    questions: &[ClarificationQuestion],
    answers: &[ClarificationAnswer],
) -> Result<ClarificationContext, PipelineError> {
    let mut entries = Vec::new();

    for answer in answers {
        let question = questions
            .iter()
            .find(|q| q.id == answer.question_id)
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "Unknown clarification question '{}'",
                    answer.question_id
                ))
            })?;

        if !question.allow_multiple && answer.option_ids.len() > 1 {
            return Err(PipelineError::Validation(format!(
                "Question '{}' accepts a single option",
                question.id
            )));
        }
        if answer.other.is_some() && !question.allow_other {
            return Err(PipelineError::Validation(format!(
                "Question '{}' does not accept a free-text answer",
                question.id
            )));
        }

        let mut choices = Vec::new();
        for option_id in &answer.option_ids {
            let option = question
                .options
                .iter()
                .find(|o| &o.id == option_id)
                .ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "Unknown option '{}' for question '{}'",
                        option_id, question.id
                    ))
                })?;
            choices.push(option.label.clone());
        }
        if let Some(other) = answer.other.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            choices.push(other.to_string());
        }

        if !choices.is_empty() {
            entries.push(ClarificationEntry {
                question: question.label.clone(),
                choices,
            });
        }
    }

    Ok(ClarificationContext { entries })
}

/// Validate a competitor selection against the offered profiles. The
/// selection must be a non-empty subset; output order follows the offer.
pub fn select_profiles(
    offered: &[CompetitorProfile],
    selected_ids: &[String],
) -> Result<Vec<CompetitorProfile>, PipelineError> {
    validate_selection_ids(selected_ids, "competitor", |id| {
        offered.iter().any(|p| p.id == *id)
    })?;
    Ok(offered
        .iter()
        .filter(|p| selected_ids.contains(&p.id))
        .cloned()
        .collect())
}

/// Validate a gap selection against the offered gaps
pub fn select_gaps(
    offered: &[MarketGap],
    selected_ids: &[String],
) -> Result<Vec<MarketGap>, PipelineError> {
    validate_selection_ids(selected_ids, "gap", |id| offered.iter().any(|g| g.id == *id))?;
    Ok(offered
        .iter()
        .filter(|g| selected_ids.contains(&g.id))
        .cloned()
        .collect())
}

fn validate_selection_ids(
    selected_ids: &[String],
    noun: &str,
    exists: impl Fn(&String) -> bool,
) -> Result<(), PipelineError> {
    if selected_ids.is_empty() {
        return Err(PipelineError::Validation(format!(
            "At least one {} must be selected",
            noun
        )));
    }
    for id in selected_ids {
        if !exists(id) {
            return Err(PipelineError::Validation(format!(
                "Unknown {} id '{}'",
                noun, id
            )));
        }
    }
    Ok(())
}

/// Synthesize a market overview from the selected competitor profiles
pub async fn market_overview(
    gateway: &LlmGateway,
    domain: &str,
    clarifications: &ClarificationContext,
    profiles: &[CompetitorProfile],
) -> Result<MarketOverview, PipelineError> {
    let mut bindings = tera::Context::new();
    bindings.insert("domain", domain);
    bindings.insert("clarifications", &clarifications.summary());
    bindings.insert("profiles", &profile_values(profiles));

    let value = gateway
        .invoke(builtin::MARKET_OVERVIEW, &bindings, &overview_schema())
        .await?;

    #[derive(Deserialize)]
    struct RawOverview {
        title: String,
        content: String,
    }
    let raw: RawOverview = serde_json::from_value(value)
        .map_err(|e| PipelineError::Validation(format!("unparseable overview: {}", e)))?;

    Ok(MarketOverview {
        title: raw.title,
        content: raw.content,
        sources: profiles.iter().map(|p| p.id.clone()).collect(),
    })
}

/// Identify evidence-backed market gaps across the selected profiles
pub async fn gap_analysis(
    gateway: &LlmGateway,
    domain: &str,
    profiles: &[CompetitorProfile],
) -> Result<Vec<MarketGap>, PipelineError> {
    let mut bindings = tera::Context::new();
    bindings.insert("domain", domain);
    bindings.insert("profiles", &profile_values(profiles));

    let value = gateway
        .invoke(builtin::GAP_ANALYSIS, &bindings, &gaps_schema())
        .await?;

    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct RawGap {
        title: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        evidence: Vec<String>,
        opportunity_size: OpportunitySize,
    }

    let raw: Vec<RawGap> = serde_json::from_value(value["gaps"].clone())
        .map_err(|e| PipelineError::Validation(format!("unparseable gaps: {}", e)))?;

    Ok(raw
        .into_iter()
        .map(|g| MarketGap {
            id: slug_id(&g.title),
            title: g.title,
            description: g.description,
            evidence: g.evidence,
            opportunity_size: g.opportunity_size,
        })
        .collect())
}

/// Turn the selected gaps into a problem statement
pub async fn define_problem(
    gateway: &LlmGateway,
    domain: &str,
    clarifications: &ClarificationContext,
    gaps: &[MarketGap],
    profiles: &[CompetitorProfile],
) -> Result<ProblemStatement, PipelineError> {
    let gap_values: Vec<serde_json::Value> = gaps
        .iter()
        .map(|g| {
            json!({
                "title": g.title,
                "description": g.description,
                "evidence": g.evidence,
                "opportunitySize": g.opportunity_size.as_str(),
            })
        })
        .collect();

    let mut bindings = tera::Context::new();
    bindings.insert("domain", domain);
    bindings.insert("clarifications", &clarifications.summary());
    bindings.insert("gaps", &gap_values);
    bindings.insert("profiles", &profile_values(profiles));

    let value = gateway
        .invoke(builtin::DEFINE_PROBLEM, &bindings, &problem_schema())
        .await?;

    serde_json::from_value(value)
        .map_err(|e| PipelineError::Validation(format!("unparseable problem statement: {}", e)))
}

/// Serialize profiles for template bindings with every optional field
/// explicitly present; the templates test each field with `{% if %}`.
fn profile_values(profiles: &[CompetitorProfile]) -> Vec<serde_json::Value> {
    profiles
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "url": p.url,
                "description": p.description,
                "features": p.features,
                "weaknesses": p.weaknesses,
                "pricing": p.pricing,
                "redditSentiment": p.reddit_sentiment,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderConfig;
    use crate::llm::{ChatMessage, ChatTransport, LlmError};
    use crate::models::{ClarificationOption, IntentType};
    use crate::prompts::PromptResolver;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct CannedTransport {
        body: String,
    }

    #[async_trait]
    impl ChatTransport for CannedTransport {
        async fn complete(
            &self,
            _provider: &ProviderConfig,
            _messages: &[ChatMessage],
        ) -> Result<String, LlmError> {
            Ok(self.body.clone())
        }
    }

    fn canned_gateway(body: &str) -> LlmGateway {
        let provider = ProviderConfig {
            id: "stub".to_string(),
            base_url: "https://stub.invalid/v1".to_string(),
            model: "stub-model".to_string(),
            api_key_env: "BLUEPRINT_STUB_KEY".to_string(),
        };
        LlmGateway::with_transport(
            vec![provider],
            PromptResolver::new(),
            Arc::new(CannedTransport {
                body: body.to_string(),
            }),
        )
    }

    fn question(id: &str, options: &[&str], allow_multiple: bool, allow_other: bool) -> ClarificationQuestion {
        ClarificationQuestion {
            id: id.to_string(),
            label: format!("Question {}?", id),
            options: options
                .iter()
                .map(|o| ClarificationOption {
                    id: o.to_string(),
                    label: o.to_uppercase(),
                    description: None,
                })
                .collect(),
            allow_multiple,
            allow_other,
        }
    }

    fn answer(question_id: &str, option_ids: &[&str]) -> ClarificationAnswer {
        ClarificationAnswer {
            question_id: question_id.to_string(),
            option_ids: option_ids.iter().map(|s| s.to_string()).collect(),
            other: None,
        }
    }

    fn profile(id: &str) -> CompetitorProfile {
        CompetitorProfile {
            id: id.to_string(),
            name: id.to_uppercase(),
            url: None,
            description: format!("{} does things", id),
            features: vec!["sync".to_string()],
            weaknesses: vec!["no offline mode".to_string()],
            pricing: None,
            reddit_sentiment: None,
            sources: vec!["web_search".to_string()],
        }
    }

    #[tokio::test]
    async fn test_classify_parses_model_output() {
        let gateway = canned_gateway(
            r#"{
                "intent": "build",
                "domain": "note-taking apps",
                "domainHierarchy": ["productivity", "note-taking apps"],
                "quickResponse": null,
                "questions": [{
                    "id": "platform",
                    "label": "Target platform?",
                    "options": [{"id": "mobile", "label": "Mobile", "description": null}],
                    "allowMultiple": true,
                    "allowOther": false
                }]
            }"#,
        );

        let classification = classify(&gateway, "a note app for students").await.unwrap();
        assert_eq!(classification.intent, IntentType::Build);
        assert_eq!(classification.domain, "note-taking apps");
        assert_eq!(classification.questions.len(), 1);
        assert!(classification.quick_response.is_none());
    }

    #[tokio::test]
    async fn test_classify_rejects_unknown_intent() {
        let gateway = canned_gateway(
            r#"{"intent": "world_domination", "domain": "", "domainHierarchy": [], "questions": []}"#,
        );

        let result = classify(&gateway, "hello").await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[test]
    fn test_quick_response_prefers_model_text() {
        let classification = Classification {
            intent: IntentType::SmallTalk,
            domain: String::new(),
            domain_hierarchy: vec![],
            quick_response: Some("Hello!".to_string()),
            questions: vec![],
        };
        assert_eq!(quick_response_text(&classification), "Hello!");
    }

    #[test]
    fn test_quick_response_falls_back_when_blank() {
        let classification = Classification {
            intent: IntentType::OffTopic,
            domain: String::new(),
            domain_hierarchy: vec![],
            quick_response: Some("   ".to_string()),
            questions: vec![],
        };
        let text = quick_response_text(&classification);
        assert!(QUICK_RESPONSE_FALLBACKS.contains(&text.as_str()));
    }

    #[test]
    fn test_resolve_clarifications_happy_path() {
        let questions = vec![
            question("platform", &["mobile", "web"], true, false),
            question("audience", &["students", "teams"], false, true),
        ];
        let answers = vec![
            answer("platform", &["mobile", "web"]),
            ClarificationAnswer {
                question_id: "audience".to_string(),
                option_ids: vec![],
                other: Some("freelancers".to_string()),
            },
        ];

        let context = resolve_clarifications(&questions, &answers).unwrap();
        assert_eq!(context.entries.len(), 2);
        assert_eq!(context.entries[0].choices, vec!["MOBILE", "WEB"]);
        assert_eq!(context.entries[1].choices, vec!["freelancers"]);
        assert!(context.summary().contains("freelancers"));
    }

    #[test]
    fn test_resolve_clarifications_unknown_option() {
        let questions = vec![question("platform", &["mobile"], true, false)];
        let result = resolve_clarifications(&questions, &[answer("platform", &["desktop"])]);
        let err = result.unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("desktop"));
    }

    #[test]
    fn test_resolve_clarifications_unknown_question() {
        let questions = vec![question("platform", &["mobile"], true, false)];
        let result = resolve_clarifications(&questions, &[answer("pricing", &["mobile"])]);
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_resolve_clarifications_single_choice_enforced() {
        let questions = vec![question("audience", &["students", "teams"], false, false)];
        let result = resolve_clarifications(&questions, &[answer("audience", &["students", "teams"])]);
        assert!(result.unwrap_err().is_validation());
    }

    #[test]
    fn test_resolve_clarifications_rejects_unexpected_other() {
        let questions = vec![question("platform", &["mobile"], true, false)];
        let answers = vec![ClarificationAnswer {
            question_id: "platform".to_string(),
            option_ids: vec![],
            other: Some("VR headsets".to_string()),
        }];
        assert!(resolve_clarifications(&questions, &answers)
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_resolve_clarifications_skipped_questions_allowed() {
        let questions = vec![
            question("platform", &["mobile"], true, false),
            question("audience", &["students"], true, false),
        ];
        let context =
            resolve_clarifications(&questions, &[answer("platform", &["mobile"])]).unwrap();
        assert_eq!(context.entries.len(), 1);
    }

    #[test]
    fn test_select_profiles_subset_in_offer_order() {
        let offered = vec![profile("notion"), profile("obsidian"), profile("evernote")];
        let selected = select_profiles(
            &offered,
            &["evernote".to_string(), "notion".to_string()],
        )
        .unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].id, "notion");
        assert_eq!(selected[1].id, "evernote");
    }

    #[test]
    fn test_select_profiles_rejects_empty_and_unknown() {
        let offered = vec![profile("notion")];
        assert!(select_profiles(&offered, &[]).unwrap_err().is_validation());
        assert!(select_profiles(&offered, &["ghost".to_string()])
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn test_select_gaps_rejects_unknown() {
        let offered = vec![MarketGap {
            id: "no-offline-mode".to_string(),
            title: "No offline mode".to_string(),
            description: String::new(),
            evidence: vec![],
            opportunity_size: OpportunitySize::High,
        }];
        assert!(select_gaps(&offered, &["nope".to_string()])
            .unwrap_err()
            .is_validation());
        assert_eq!(
            select_gaps(&offered, &["no-offline-mode".to_string()])
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_market_overview_attaches_sources() {
        let gateway = canned_gateway(
            r#"{"title": "Note-taking landscape", "content": "Crowded but stale."}"#,
        );
        let profiles = vec![profile("notion"), profile("obsidian")];

        let overview = market_overview(
            &gateway,
            "note-taking apps",
            &ClarificationContext::default(),
            &profiles,
        )
        .await
        .unwrap();

        assert_eq!(overview.title, "Note-taking landscape");
        assert_eq!(overview.sources, vec!["notion", "obsidian"]);
    }

    #[tokio::test]
    async fn test_gap_analysis_assigns_slug_ids() {
        let gateway = canned_gateway(
            r#"{"gaps": [{
                "title": "No Offline Mode",
                "description": "Everything needs connectivity",
                "evidence": ["NOTION: no offline mode"],
                "opportunitySize": "high"
            }]}"#,
        );

        let gaps = gap_analysis(&gateway, "note-taking apps", &[profile("notion")])
            .await
            .unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].id, "no-offline-mode");
        assert_eq!(gaps[0].opportunity_size, OpportunitySize::High);
    }

    #[tokio::test]
    async fn test_gap_analysis_rejects_invalid_size() {
        let gateway = canned_gateway(
            r#"{"gaps": [{"title": "Gap", "description": "", "evidence": [], "opportunitySize": "enormous"}]}"#,
        );
        let result = gap_analysis(&gateway, "note-taking apps", &[profile("notion")]).await;
        assert!(matches!(result, Err(PipelineError::Validation(_))));
    }

    #[tokio::test]
    async fn test_define_problem_parses_statement() {
        let gateway = canned_gateway(
            r#"{
                "title": "Students lose notes across devices",
                "content": "Long-form markdown here.",
                "targetUser": "University students",
                "keyDifferentiators": ["offline-first"],
                "validationQuestions": ["How do you take notes today?"]
            }"#,
        );
        let gaps = vec![MarketGap {
            id: "no-offline-mode".to_string(),
            title: "No offline mode".to_string(),
            description: "Everything needs connectivity".to_string(),
            evidence: vec![],
            opportunity_size: OpportunitySize::High,
        }];

        let statement = define_problem(
            &gateway,
            "note-taking apps",
            &ClarificationContext::default(),
            &gaps,
            &[profile("notion")],
        )
        .await
        .unwrap();

        assert_eq!(statement.target_user, "University students");
        assert_eq!(statement.key_differentiators, vec!["offline-first"]);
    }
}
