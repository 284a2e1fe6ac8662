// Research driver
//
// Owns the lifecycle of a research stream: it checkpoints every step row
// before advancing, emits stream events, and suspends the journey on
// selection-consuming steps. A stream runs until it emits a terminal
// event; when the client disconnects mid-stage, the current stage still
// finishes and persists, but no further stage starts.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::mpsc;

use super::{stages, PipelineError};
use crate::config::{generate_error_code, AppConfig};
use crate::events::{ResearchEvent, SelectionOptions};
use crate::evidence::EvidenceFanOut;
use crate::llm::LlmGateway;
use crate::models::{
    Classification, ClarificationContext, ClarificationQuestion, CompetitorProfile, IntentType,
    Journey, JourneyStatus, JourneyStep, MarketGap, SelectionRequest, StepStatus, StepType,
};
use crate::storage::journeys::{self, JourneyFile};
use crate::utils::{lock_mutex_recover, short_hash};

/// In-flight run registry. One research stream may run per journey (and per
/// identical prompt) at a time; a second request gets a conflict before any
/// stream is opened.
#[derive(Clone, Default)]
pub struct ActiveRuns {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ActiveRuns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a run key. Returns None when the key is already held.
    pub fn try_acquire(&self, key: impl Into<String>) -> Option<RunToken> {
        let key = key.into();
        let mut held = lock_mutex_recover(&self.held);
        if held.insert(key.clone()) {
            Some(RunToken {
                key,
                held: Arc::clone(&self.held),
            })
        } else {
            None
        }
    }
}

/// Releases its run key on drop, so a panicking stream task still frees
/// the journey for the next request.
pub struct RunToken {
    key: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl Drop for RunToken {
    fn drop(&mut self) {
        lock_mutex_recover(&self.held).remove(&self.key);
    }
}

/// Why a selection request was refused before a stream was opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionRejection {
    NotFound(String),
    Conflict(String),
}

/// Event sender that tracks client disconnection. Sending into a closed
/// channel flips the flag; later sends become no-ops and the driver stops
/// starting new stages.
struct Emitter {
    tx: mpsc::Sender<ResearchEvent>,
    disconnected: bool,
}

impl Emitter {
    fn new(tx: mpsc::Sender<ResearchEvent>) -> Self {
        Emitter {
            tx,
            disconnected: false,
        }
    }

    async fn send(&mut self, event: ResearchEvent) {
        if self.disconnected {
            return;
        }
        log::debug!("Emitting event: {}", event.event_type());
        if self.tx.send(event).await.is_err() {
            log::info!("Client disconnected; finishing the current stage only");
            self.disconnected = true;
        }
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected
    }
}

pub struct Driver {
    gateway: Arc<LlmGateway>,
    evidence: Arc<EvidenceFanOut>,
    data_dir: PathBuf,
    runs: ActiveRuns,
}

impl Driver {
    pub fn new(config: &AppConfig) -> Self {
        let gateway = Arc::new(LlmGateway::new(config.providers.clone(), &config.data_dir));
        let evidence = Arc::new(EvidenceFanOut::new(
            &config.evidence,
            Arc::clone(&gateway),
            &config.data_dir,
        ));
        Self::with_components(gateway, evidence, &config.data_dir)
    }

    /// Construct from pre-built components (tests substitute stubs)
    pub fn with_components(
        gateway: Arc<LlmGateway>,
        evidence: Arc<EvidenceFanOut>,
        data_dir: &Path,
    ) -> Self {
        Driver {
            gateway,
            evidence,
            data_dir: data_dir.to_path_buf(),
            runs: ActiveRuns::new(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Claim the run slot for a fresh research prompt
    pub fn try_begin_prompt(&self, prompt: &str) -> Option<RunToken> {
        let key = format!("prompt:{:016x}", short_hash(prompt.trim()));
        self.runs.try_acquire(key)
    }

    /// Claim the run slot for a journey continuation
    pub fn try_begin_journey(&self, journey_id: &str) -> Option<RunToken> {
        self.runs.try_acquire(format!("journey:{}", journey_id))
    }

    /// Validate a selection request before any stream is opened, so the
    /// route can answer with a plain status code instead of an SSE error.
    pub fn prepare_selection(
        &self,
        journey_id: &str,
        step_type: StepType,
    ) -> Result<(), SelectionRejection> {
        if !journeys::journey_exists(&self.data_dir, journey_id) {
            return Err(SelectionRejection::NotFound(format!(
                "Journey '{}' not found",
                journey_id
            )));
        }
        let file = journeys::read_journey(&self.data_dir, journey_id)
            .map_err(SelectionRejection::Conflict)?;

        if file.journey.status != JourneyStatus::Active {
            return Err(SelectionRejection::Conflict(format!(
                "Journey '{}' is no longer active",
                journey_id
            )));
        }
        let awaiting = file.awaiting_step().ok_or_else(|| {
            SelectionRejection::Conflict(format!(
                "Journey '{}' has no step awaiting selection",
                journey_id
            ))
        })?;
        if awaiting.step_type != step_type {
            return Err(SelectionRejection::Conflict(format!(
                "Journey '{}' is awaiting '{}', not '{}'",
                journey_id, awaiting.step_type, step_type
            )));
        }
        Ok(())
    }

    /// Drive a fresh prompt to its first terminal event
    pub async fn run_research(&self, prompt: String, tx: mpsc::Sender<ResearchEvent>) {
        let mut emitter = Emitter::new(tx);
        if let Err(e) = self.research_flow(&prompt, &mut emitter).await {
            self.emit_failure(&mut emitter, e).await;
        }
    }

    /// Apply a selection to a suspended journey and drive it onward
    pub async fn run_selection(
        &self,
        journey_id: String,
        request: SelectionRequest,
        tx: mpsc::Sender<ResearchEvent>,
    ) {
        let mut emitter = Emitter::new(tx);
        if let Err(e) = self.selection_flow(&journey_id, &request, &mut emitter).await {
            self.emit_failure(&mut emitter, e).await;
        }
    }

    async fn emit_failure(&self, emitter: &mut Emitter, error: PipelineError) {
        let code = generate_error_code();
        if error.is_validation() {
            log::warn!("[{}] request rejected: {}", code, error);
        } else {
            log::error!("[{}] research stream failed: {}", code, error);
        }
        emitter
            .send(ResearchEvent::Error {
                message: error.to_string(),
                code,
            })
            .await;
    }

    async fn research_flow(
        &self,
        prompt: &str,
        emitter: &mut Emitter,
    ) -> Result<(), PipelineError> {
        emitter
            .send(ResearchEvent::StepStarted {
                journey_id: None,
                step_type: StepType::Classify,
            })
            .await;

        let classification = stages::classify(&self.gateway, prompt).await?;
        log::info!(
            "Classified prompt as '{}' (domain: '{}')",
            classification.intent,
            classification.domain
        );

        if !classification.intent.creates_journey() {
            emitter
                .send(ResearchEvent::QuickResponse {
                    text: stages::quick_response_text(&classification),
                })
                .await;
            return Ok(());
        }

        if classification.intent == IntentType::Improve {
            emitter
                .send(ResearchEvent::IntentRedirect {
                    from: IntentType::Improve,
                    to: IntentType::Explore,
                })
                .await;
        }

        let journey = Journey::new(classification.intent.effective(), prompt);
        journeys::create_journey(&self.data_dir, &journey).map_err(PipelineError::Storage)?;
        log::info!("Created journey {} ({})", journey.id, journey.intent_type);

        let mut classify_step = JourneyStep::new(
            &journey.id,
            StepType::Classify,
            1,
            StepStatus::Running,
            json!({ "prompt": prompt }),
        );
        classify_step.complete_with(to_json(&classification)?);
        journeys::append_step(&self.data_dir, &journey.id, &classify_step)
            .map_err(PipelineError::Storage)?;

        if classification.questions.is_empty() {
            // Nothing to ask; record an auto-resolved clarify step and keep
            // the stream going straight into evidence gathering
            let mut clarify = JourneyStep::new(
                &journey.id,
                StepType::Clarify,
                2,
                StepStatus::Running,
                json!({ "questions": [] }),
            );
            clarify.complete_with(json!({ "context": ClarificationContext::default() }));
            journeys::append_step(&self.data_dir, &journey.id, &clarify)
                .map_err(PipelineError::Storage)?;

            if emitter.is_disconnected() {
                return Ok(());
            }
            let file = journeys::read_journey(&self.data_dir, &journey.id)
                .map_err(PipelineError::Storage)?;
            return self.advance_find_competitors(emitter, file).await;
        }

        let clarify = JourneyStep::new(
            &journey.id,
            StepType::Clarify,
            2,
            StepStatus::AwaitingSelection,
            json!({ "questions": classification.questions }),
        );
        journeys::append_step(&self.data_dir, &journey.id, &clarify)
            .map_err(PipelineError::Storage)?;

        emitter
            .send(ResearchEvent::WaitingForSelection {
                journey_id: journey.id.clone(),
                step_type: StepType::Clarify,
                options: SelectionOptions::Questions(classification.questions),
            })
            .await;
        Ok(())
    }

    async fn selection_flow(
        &self,
        journey_id: &str,
        request: &SelectionRequest,
        emitter: &mut Emitter,
    ) -> Result<(), PipelineError> {
        let file =
            journeys::read_journey(&self.data_dir, journey_id).map_err(PipelineError::Storage)?;
        let awaiting = file
            .awaiting_step()
            .cloned()
            .ok_or_else(|| {
                PipelineError::Validation(format!(
                    "Journey '{}' has no step awaiting selection",
                    journey_id
                ))
            })?;
        if awaiting.step_type != request.step_type {
            return Err(PipelineError::Validation(format!(
                "Journey '{}' is awaiting '{}', not '{}'",
                journey_id, awaiting.step_type, request.step_type
            )));
        }

        match awaiting.step_type {
            StepType::Clarify => {
                let questions: Vec<ClarificationQuestion> =
                    from_json(awaiting.input["questions"].clone(), "offered questions")?;
                let answers = request.answers.clone().unwrap_or_default();
                let context = stages::resolve_clarifications(&questions, &answers)?;

                let mut step = awaiting;
                step.input = json!({ "questions": questions, "answers": answers });
                step.complete_with(json!({ "context": context }));
                journeys::update_step(&self.data_dir, journey_id, &step)
                    .map_err(PipelineError::Storage)?;

                let file = journeys::read_journey(&self.data_dir, journey_id)
                    .map_err(PipelineError::Storage)?;
                self.advance_find_competitors(emitter, file).await
            }
            StepType::SelectCompetitors => {
                let offered: Vec<CompetitorProfile> =
                    from_json(awaiting.input["profiles"].clone(), "offered profiles")?;
                let ids = request.selected_ids.clone().unwrap_or_default();
                let selected = stages::select_profiles(&offered, &ids)?;

                let mut step = awaiting;
                step.input = json!({ "profiles": offered, "selectedIds": ids });
                step.complete_with(json!({ "selected": selected }));
                journeys::update_step(&self.data_dir, journey_id, &step)
                    .map_err(PipelineError::Storage)?;

                let file = journeys::read_journey(&self.data_dir, journey_id)
                    .map_err(PipelineError::Storage)?;
                self.advance_explore(emitter, file, selected).await
            }
            StepType::SelectProblems => {
                let offered: Vec<MarketGap> =
                    from_json(awaiting.input["gaps"].clone(), "offered gaps")?;
                let ids = request.selected_ids.clone().unwrap_or_default();
                let selected = stages::select_gaps(&offered, &ids)?;

                let mut step = awaiting;
                step.input = json!({ "gaps": offered, "selectedIds": ids });
                step.complete_with(json!({ "selected": selected }));
                journeys::update_step(&self.data_dir, journey_id, &step)
                    .map_err(PipelineError::Storage)?;

                let file = journeys::read_journey(&self.data_dir, journey_id)
                    .map_err(PipelineError::Storage)?;
                self.advance_define_problem(emitter, file, selected).await
            }
            other => Err(PipelineError::Validation(format!(
                "Step '{}' does not take a selection",
                other
            ))),
        }
    }

    /// Evidence fan-out, then suspend on competitor selection
    async fn advance_find_competitors(
        &self,
        emitter: &mut Emitter,
        file: JourneyFile,
    ) -> Result<(), PipelineError> {
        let journey_id = file.journey.id.clone();
        let classification = classification_of(&file)?;
        let context = clarification_context_of(&file);

        emitter
            .send(ResearchEvent::StepStarted {
                journey_id: Some(journey_id.clone()),
                step_type: StepType::FindCompetitors,
            })
            .await;

        let mut step = JourneyStep::new(
            &journey_id,
            StepType::FindCompetitors,
            file.next_step_number(),
            StepStatus::Running,
            json!({ "domain": classification.domain, "clarifications": context }),
        );
        journeys::append_step(&self.data_dir, &journey_id, &step)
            .map_err(PipelineError::Storage)?;

        emitter
            .send(ResearchEvent::StepProgress {
                journey_id: Some(journey_id.clone()),
                step_type: StepType::FindCompetitors,
                message: "Searching the web, forums, and app stores for competitors".to_string(),
            })
            .await;

        let report = match self
            .evidence
            .gather_competitors(&classification.domain, &context)
            .await
        {
            Ok(report) => report,
            Err(e) => {
                emitter
                    .send(ResearchEvent::BlockError {
                        journey_id: Some(journey_id.clone()),
                        step_type: StepType::FindCompetitors,
                        message: e.to_string(),
                    })
                    .await;
                step.fail_with(e.to_string());
                journeys::update_step(&self.data_dir, &journey_id, &step)
                    .map_err(PipelineError::Storage)?;
                return Err(e.into());
            }
        };

        if !report.degraded.is_empty() {
            emitter
                .send(ResearchEvent::BlockError {
                    journey_id: Some(journey_id.clone()),
                    step_type: StepType::FindCompetitors,
                    message: format!(
                        "Some evidence sources were unavailable: {}",
                        report.degraded.join(", ")
                    ),
                })
                .await;
        }

        step.complete_with(json!({
            "profiles": report.profiles,
            "provenance": report.provenance,
            "degraded": report.degraded,
        }));
        journeys::update_step(&self.data_dir, &journey_id, &step)
            .map_err(PipelineError::Storage)?;

        let select = JourneyStep::new(
            &journey_id,
            StepType::SelectCompetitors,
            step.step_number + 1,
            StepStatus::AwaitingSelection,
            json!({ "profiles": report.profiles }),
        );
        journeys::append_step(&self.data_dir, &journey_id, &select)
            .map_err(PipelineError::Storage)?;

        emitter
            .send(ResearchEvent::WaitingForSelection {
                journey_id,
                step_type: StepType::SelectCompetitors,
                options: SelectionOptions::Competitors(report.profiles),
            })
            .await;
        Ok(())
    }

    /// Market overview (and gap analysis for build journeys), then either
    /// finish the journey or suspend on problem selection
    async fn advance_explore(
        &self,
        emitter: &mut Emitter,
        file: JourneyFile,
        selected: Vec<CompetitorProfile>,
    ) -> Result<(), PipelineError> {
        if emitter.is_disconnected() {
            return Ok(());
        }

        let journey_id = file.journey.id.clone();
        let intent = file.journey.intent_type;
        let classification = classification_of(&file)?;
        let context = clarification_context_of(&file);

        emitter
            .send(ResearchEvent::StepStarted {
                journey_id: Some(journey_id.clone()),
                step_type: StepType::Explore,
            })
            .await;

        let mut step = JourneyStep::new(
            &journey_id,
            StepType::Explore,
            file.next_step_number(),
            StepStatus::Running,
            json!({ "profiles": selected }),
        );
        journeys::append_step(&self.data_dir, &journey_id, &step)
            .map_err(PipelineError::Storage)?;

        emitter
            .send(ResearchEvent::StepProgress {
                journey_id: Some(journey_id.clone()),
                step_type: StepType::Explore,
                message: "Synthesizing the market overview".to_string(),
            })
            .await;

        let overview = match stages::market_overview(
            &self.gateway,
            &classification.domain,
            &context,
            &selected,
        )
        .await
        {
            Ok(overview) => overview,
            Err(e) => return self.fail_step(&journey_id, step, e).await,
        };

        let gaps = if intent == IntentType::Build {
            emitter
                .send(ResearchEvent::StepProgress {
                    journey_id: Some(journey_id.clone()),
                    step_type: StepType::Explore,
                    message: "Identifying market gaps".to_string(),
                })
                .await;
            match stages::gap_analysis(&self.gateway, &classification.domain, &selected).await {
                Ok(gaps) => gaps,
                Err(e) => return self.fail_step(&journey_id, step, e).await,
            }
        } else {
            Vec::new()
        };

        step.complete_with(json!({ "overview": overview, "gaps": gaps }));
        journeys::update_step(&self.data_dir, &journey_id, &step)
            .map_err(PipelineError::Storage)?;

        if intent != IntentType::Build {
            journeys::update_journey_status(&self.data_dir, &journey_id, JourneyStatus::Completed)
                .map_err(PipelineError::Storage)?;
            emitter
                .send(ResearchEvent::ResearchComplete {
                    journey_id,
                    final_artifact: to_json(&overview)?,
                })
                .await;
            return Ok(());
        }

        if gaps.is_empty() {
            emitter
                .send(ResearchEvent::BlockError {
                    journey_id: Some(journey_id.clone()),
                    step_type: StepType::Explore,
                    message: "No evidence-backed market gaps could be identified".to_string(),
                })
                .await;
        }

        let select = JourneyStep::new(
            &journey_id,
            StepType::SelectProblems,
            step.step_number + 1,
            StepStatus::AwaitingSelection,
            json!({ "gaps": gaps }),
        );
        journeys::append_step(&self.data_dir, &journey_id, &select)
            .map_err(PipelineError::Storage)?;

        emitter
            .send(ResearchEvent::WaitingForSelection {
                journey_id,
                step_type: StepType::SelectProblems,
                options: SelectionOptions::Gaps(gaps),
            })
            .await;
        Ok(())
    }

    /// Terminal stage of a build journey
    async fn advance_define_problem(
        &self,
        emitter: &mut Emitter,
        file: JourneyFile,
        selected: Vec<MarketGap>,
    ) -> Result<(), PipelineError> {
        if emitter.is_disconnected() {
            return Ok(());
        }

        let journey_id = file.journey.id.clone();
        let classification = classification_of(&file)?;
        let context = clarification_context_of(&file);
        let profiles = selected_profiles_of(&file)?;

        emitter
            .send(ResearchEvent::StepStarted {
                journey_id: Some(journey_id.clone()),
                step_type: StepType::DefineProblem,
            })
            .await;

        let mut step = JourneyStep::new(
            &journey_id,
            StepType::DefineProblem,
            file.next_step_number(),
            StepStatus::Running,
            json!({ "gaps": selected }),
        );
        journeys::append_step(&self.data_dir, &journey_id, &step)
            .map_err(PipelineError::Storage)?;

        let statement = match stages::define_problem(
            &self.gateway,
            &classification.domain,
            &context,
            &selected,
            &profiles,
        )
        .await
        {
            Ok(statement) => statement,
            Err(e) => return self.fail_step(&journey_id, step, e).await,
        };

        step.complete_with(to_json(&statement)?);
        journeys::update_step(&self.data_dir, &journey_id, &step)
            .map_err(PipelineError::Storage)?;
        journeys::update_journey_status(&self.data_dir, &journey_id, JourneyStatus::Completed)
            .map_err(PipelineError::Storage)?;

        emitter
            .send(ResearchEvent::ResearchComplete {
                journey_id,
                final_artifact: to_json(&statement)?,
            })
            .await;
        Ok(())
    }

    /// Record a stage failure on its step row and propagate the error. The
    /// journey stays active at its last checkpoint.
    async fn fail_step(
        &self,
        journey_id: &str,
        mut step: JourneyStep,
        error: PipelineError,
    ) -> Result<(), PipelineError> {
        step.fail_with(error.to_string());
        if let Err(e) = journeys::update_step(&self.data_dir, journey_id, &step) {
            log::error!("Failed to persist step failure for '{}': {}", journey_id, e);
        }
        Err(error)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, PipelineError> {
    serde_json::to_value(value)
        .map_err(|e| PipelineError::Storage(format!("serialization failed: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
    what: &str,
) -> Result<T, PipelineError> {
    serde_json::from_value(value)
        .map_err(|e| PipelineError::Storage(format!("corrupt {}: {}", what, e)))
}

/// Classification recorded by the journey's classify step
fn classification_of(file: &JourneyFile) -> Result<Classification, PipelineError> {
    let step = file.completed_step(StepType::Classify).ok_or_else(|| {
        PipelineError::Storage(format!(
            "Journey '{}' has no completed classify step",
            file.journey.id
        ))
    })?;
    let output = step.output.clone().ok_or_else(|| {
        PipelineError::Storage(format!(
            "Classify step of journey '{}' has no output",
            file.journey.id
        ))
    })?;
    from_json(output, "classification output")
}

/// Clarification context recorded by the clarify step; empty when the user
/// skipped every question.
fn clarification_context_of(file: &JourneyFile) -> ClarificationContext {
    file.completed_step(StepType::Clarify)
        .and_then(|s| s.output.as_ref())
        .and_then(|o| serde_json::from_value(o["context"].clone()).ok())
        .unwrap_or_default()
}

/// Profiles the user kept at the competitor-selection step
fn selected_profiles_of(file: &JourneyFile) -> Result<Vec<CompetitorProfile>, PipelineError> {
    let step = file
        .completed_step(StepType::SelectCompetitors)
        .ok_or_else(|| {
            PipelineError::Storage(format!(
                "Journey '{}' has no completed competitor selection",
                file.journey.id
            ))
        })?;
    let output = step.output.clone().unwrap_or_default();
    from_json(output["selected"].clone(), "selected profiles")
}
