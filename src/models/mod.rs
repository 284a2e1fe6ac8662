// Data models for the research pipeline, matching the frontend TypeScript types

pub mod state_machine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum journey title length derived from the initial prompt
const JOURNEY_TITLE_MAX: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IntentType {
    SmallTalk,
    OffTopic,
    Improve,
    Explore,
    Build,
}

impl IntentType {
    /// Returns all known intent types
    pub fn all() -> &'static [IntentType] {
        &[
            IntentType::SmallTalk,
            IntentType::OffTopic,
            IntentType::Improve,
            IntentType::Explore,
            IntentType::Build,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentType::SmallTalk => "small_talk",
            IntentType::OffTopic => "off_topic",
            IntentType::Improve => "improve",
            IntentType::Explore => "explore",
            IntentType::Build => "build",
        }
    }

    /// Whether this intent starts a persisted research journey.
    /// Small talk and off-topic prompts are answered inline and never
    /// create a journey row.
    pub fn creates_journey(&self) -> bool {
        matches!(
            self,
            IntentType::Improve | IntentType::Explore | IntentType::Build
        )
    }

    /// Improve prompts are re-dispatched as explore journeys. Every other
    /// intent dispatches as itself.
    pub fn effective(&self) -> IntentType {
        match self {
            IntentType::Improve => IntentType::Explore,
            other => *other,
        }
    }
}

impl std::fmt::Display for IntentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IntentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "small_talk" => Ok(IntentType::SmallTalk),
            "off_topic" => Ok(IntentType::OffTopic),
            "improve" => Ok(IntentType::Improve),
            "explore" => Ok(IntentType::Explore),
            "build" => Ok(IntentType::Build),
            _ => Err(format!(
                "Unknown intent type: '{}'. Expected one of: small_talk, off_topic, improve, explore, build",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Classify,
    Clarify,
    FindCompetitors,
    SelectCompetitors,
    Explore,
    SelectProblems,
    DefineProblem,
}

impl StepType {
    /// Returns all step types in canonical build-pipeline order
    pub fn all() -> &'static [StepType] {
        &[
            StepType::Classify,
            StepType::Clarify,
            StepType::FindCompetitors,
            StepType::SelectCompetitors,
            StepType::Explore,
            StepType::SelectProblems,
            StepType::DefineProblem,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::Classify => "classify",
            StepType::Clarify => "clarify",
            StepType::FindCompetitors => "find_competitors",
            StepType::SelectCompetitors => "select_competitors",
            StepType::Explore => "explore",
            StepType::SelectProblems => "select_problems",
            StepType::DefineProblem => "define_problem",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            StepType::Classify => "Classify Intent",
            StepType::Clarify => "Clarify Direction",
            StepType::FindCompetitors => "Find Competitors",
            StepType::SelectCompetitors => "Select Competitors",
            StepType::Explore => "Explore Market",
            StepType::SelectProblems => "Select Problems",
            StepType::DefineProblem => "Define Problem",
        }
    }

    /// Whether this step consumes a user selection as its input. These are
    /// the steps a stream pauses on: the step row is persisted as
    /// `awaiting_selection` and execution resumes on the next request.
    pub fn requires_selection(&self) -> bool {
        matches!(
            self,
            StepType::Clarify | StepType::SelectCompetitors | StepType::SelectProblems
        )
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StepType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "classify" => Ok(StepType::Classify),
            "clarify" => Ok(StepType::Clarify),
            "find_competitors" => Ok(StepType::FindCompetitors),
            "select_competitors" => Ok(StepType::SelectCompetitors),
            "explore" => Ok(StepType::Explore),
            "select_problems" => Ok(StepType::SelectProblems),
            "define_problem" => Ok(StepType::DefineProblem),
            _ => Err(format!("Unknown step type: '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    AwaitingSelection,
    Complete,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JourneyStatus {
    Active,
    Completed,
    Failed,
}

/// One end-to-end research session for a single initial prompt, spanning
/// multiple stream requests. Created only for research intents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Journey {
    pub id: String,
    pub intent_type: IntentType,
    pub title: String,
    pub status: JourneyStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Journey {
    /// Create a new active journey. The title is the prompt, truncated.
    pub fn new(intent_type: IntentType, prompt: &str) -> Self {
        let now = Utc::now();
        Journey {
            id: Uuid::new_v4().to_string(),
            intent_type,
            title: derive_title(prompt),
            status: JourneyStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }
}

fn derive_title(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.chars().count() <= JOURNEY_TITLE_MAX {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(JOURNEY_TITLE_MAX).collect();
        format!("{}…", cut)
    }
}

/// One executed (or awaiting) stage of a journey. Append-only except for
/// status/output transitions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JourneyStep {
    pub id: String,
    pub journey_id: String,
    pub step_type: StepType,
    pub step_number: i32,
    pub status: StepStatus,
    /// Snapshot of what the stage was given: the prompt, the offered
    /// options, or the user selection merged in on resume.
    pub input: serde_json::Value,
    /// Stage-typed result, present once the step completes.
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JourneyStep {
    pub fn new(
        journey_id: &str,
        step_type: StepType,
        step_number: i32,
        status: StepStatus,
        input: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        JourneyStep {
            id: Uuid::new_v4().to_string(),
            journey_id: journey_id.to_string(),
            step_type,
            step_number,
            status,
            input,
            output: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn complete_with(&mut self, output: serde_json::Value) {
        self.status = StepStatus::Complete;
        self.output = Some(output);
        self.updated_at = Utc::now();
    }

    pub fn fail_with(&mut self, error: String) {
        self.status = StepStatus::Failed;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }
}

/// Output of the classify stage, as validated from the model's response.
/// `quick_response` is set only for small_talk/off_topic; `questions` only
/// for research intents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    pub intent: IntentType,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub domain_hierarchy: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quick_response: Option<String>,
    #[serde(default)]
    pub questions: Vec<ClarificationQuestion>,
}

// ============================================================================
// Clarification
// ============================================================================

/// One selectable answer to a clarification question. Option ids are stable
/// lowercase slugs; clients send ids back, never labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationOption {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationQuestion {
    pub id: String,
    pub label: String,
    pub options: Vec<ClarificationOption>,
    #[serde(default)]
    pub allow_multiple: bool,
    #[serde(default)]
    pub allow_other: bool,
}

/// A user's answer to one clarification question: chosen option ids plus an
/// optional free-text "other" when the question allows it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationAnswer {
    pub question_id: String,
    #[serde(default)]
    pub option_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other: Option<String>,
}

/// Resolved clarification answers, carried by all downstream stages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationContext {
    pub entries: Vec<ClarificationEntry>,
}

/// One resolved question: the question label plus the labels the user chose.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClarificationEntry {
    pub question: String,
    pub choices: Vec<String>,
}

impl ClarificationContext {
    /// Prompt-ready one-line-per-question rendering.
    pub fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{}: {}", e.question, e.choices.join(", ")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Evidence
// ============================================================================

/// A raw competitor lead from one evidence provider, pre-synthesis.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorCandidate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub snippet: String,
    /// Provider that supplied this lead (web_search, forum, app_store,
    /// page, cache).
    pub source: String,
}

/// A synthesized competitor profile. Immutable once produced for a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorProfile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub description: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reddit_sentiment: Option<String>,
    /// Which providers contributed evidence for this profile.
    #[serde(default)]
    pub sources: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OpportunitySize {
    High,
    Medium,
    Low,
}

impl OpportunitySize {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpportunitySize::High => "high",
            OpportunitySize::Medium => "medium",
            OpportunitySize::Low => "low",
        }
    }
}

/// A market gap grounded in competitor profile evidence. Produced only
/// within build-intent explore stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketGap {
    pub id: String,
    pub title: String,
    pub description: String,
    /// References into competitor profile fields backing this gap.
    #[serde(default)]
    pub evidence: Vec<String>,
    pub opportunity_size: OpportunitySize,
}

/// Market overview synthesis produced by the explore stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketOverview {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Combined explore-stage output: the overview always, gaps only for build
/// journeys. Two outputs of one stage invocation, merged at stage exit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExploreOutput {
    pub overview: MarketOverview,
    #[serde(default)]
    pub gaps: Vec<MarketGap>,
}

/// Terminal artifact of a build journey.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProblemStatement {
    pub title: String,
    pub content: String,
    pub target_user: String,
    #[serde(default)]
    pub key_differentiators: Vec<String>,
    #[serde(default)]
    pub validation_questions: Vec<String>,
}

// ============================================================================
// Requests
// ============================================================================

/// Body of `POST /research`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchRequest {
    pub prompt: String,
}

/// Body of `POST /research/{journey_id}/selection`. Exactly one of the
/// payload fields applies per step type: `answers` for clarify,
/// `selected_ids` for competitor/problem selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    pub step_type: StepType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<ClarificationAnswer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_ids: Option<Vec<String>>,
}
