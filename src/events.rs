// Event types and payload structures for the research stream
// These are delivered to clients as SSE data frames, one JSON object per event

use serde::{Deserialize, Serialize};

use crate::models::{
    ClarificationQuestion, CompetitorProfile, IntentType, MarketGap, StepType,
};

/// Options offered alongside a `waiting_for_selection` event. The variant is
/// implied by the step type that is awaiting input, so the payload is the
/// bare option list rather than a nested tagged object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SelectionOptions {
    Questions(Vec<ClarificationQuestion>),
    Competitors(Vec<CompetitorProfile>),
    Gaps(Vec<MarketGap>),
}

impl SelectionOptions {
    pub fn is_empty(&self) -> bool {
        match self {
            SelectionOptions::Questions(q) => q.is_empty(),
            SelectionOptions::Competitors(c) => c.is_empty(),
            SelectionOptions::Gaps(g) => g.is_empty(),
        }
    }
}

/// One event on a research stream. `journeyId` is absent on events emitted
/// before a journey row exists (classification of a not-yet-routed prompt).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResearchEvent {
    /// Inline answer for small-talk / off-topic prompts. The stream closes
    /// right after this event and no journey is persisted.
    #[serde(rename_all = "camelCase")]
    QuickResponse { text: String },

    /// Emitted when an improve prompt is re-dispatched as an explore journey.
    #[serde(rename_all = "camelCase")]
    IntentRedirect { from: IntentType, to: IntentType },

    #[serde(rename_all = "camelCase")]
    StepStarted {
        #[serde(skip_serializing_if = "Option::is_none")]
        journey_id: Option<String>,
        step_type: StepType,
    },

    #[serde(rename_all = "camelCase")]
    StepProgress {
        #[serde(skip_serializing_if = "Option::is_none")]
        journey_id: Option<String>,
        step_type: StepType,
        message: String,
    },

    /// Non-fatal degradation notice. The stage keeps running (or the journey
    /// stays resumable); the client may surface it as a warning.
    #[serde(rename_all = "camelCase")]
    BlockError {
        #[serde(skip_serializing_if = "Option::is_none")]
        journey_id: Option<String>,
        step_type: StepType,
        message: String,
    },

    /// The pipeline has suspended: the step row is checkpointed as
    /// `awaiting_selection` and this stream closes after the event. The
    /// client answers via `POST /research/{journeyId}/selection`.
    #[serde(rename_all = "camelCase")]
    WaitingForSelection {
        journey_id: String,
        step_type: StepType,
        options: SelectionOptions,
    },

    /// Terminal success event. `finalArtifact` is the output of the last
    /// stage (market overview for explore, problem statement for build).
    #[serde(rename_all = "camelCase")]
    ResearchComplete {
        journey_id: String,
        final_artifact: serde_json::Value,
    },

    /// Fatal for this stream. The journey (if any) is left at its last
    /// checkpoint; the stream closes after this event.
    #[serde(rename_all = "camelCase")]
    Error { message: String, code: String },
}

impl ResearchEvent {
    /// Tag string as it appears on the wire, for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            ResearchEvent::QuickResponse { .. } => "quick_response",
            ResearchEvent::IntentRedirect { .. } => "intent_redirect",
            ResearchEvent::StepStarted { .. } => "step_started",
            ResearchEvent::StepProgress { .. } => "step_progress",
            ResearchEvent::BlockError { .. } => "block_error",
            ResearchEvent::WaitingForSelection { .. } => "waiting_for_selection",
            ResearchEvent::ResearchComplete { .. } => "research_complete",
            ResearchEvent::Error { .. } => "error",
        }
    }

    /// Whether the driver closes the stream after emitting this event
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResearchEvent::QuickResponse { .. }
                | ResearchEvent::WaitingForSelection { .. }
                | ResearchEvent::ResearchComplete { .. }
                | ResearchEvent::Error { .. }
        )
    }
}
