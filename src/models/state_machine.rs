// Step status state machine with validation, plus the canonical stage
// sequences per intent. Every persisted journey must be a strict prefix of
// its intent's sequence; the driver consults next_step_type to advance.

use super::{IntentType, StepStatus, StepType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: StepStatus, to: StepStatus },

    #[error("Step already in terminal state: {0:?}")]
    AlreadyTerminal(StepStatus),
}

const EXPLORE_SEQUENCE: &[StepType] = &[
    StepType::Classify,
    StepType::Clarify,
    StepType::FindCompetitors,
    StepType::SelectCompetitors,
    StepType::Explore,
];

const BUILD_SEQUENCE: &[StepType] = &[
    StepType::Classify,
    StepType::Clarify,
    StepType::FindCompetitors,
    StepType::SelectCompetitors,
    StepType::Explore,
    StepType::SelectProblems,
    StepType::DefineProblem,
];

const CLASSIFY_ONLY: &[StepType] = &[StepType::Classify];

/// Canonical stage sequence for an intent. Improve is sequenced as explore
/// because improve journeys are stored post-redirect.
pub fn sequence_for(intent: IntentType) -> &'static [StepType] {
    match intent.effective() {
        IntentType::Build => BUILD_SEQUENCE,
        IntentType::Explore => EXPLORE_SEQUENCE,
        _ => CLASSIFY_ONLY,
    }
}

/// The step that follows `current` in the intent's canonical sequence.
/// None when `current` is the intent's terminal step or does not appear in
/// the sequence at all (build-only steps queried against explore).
pub fn next_step_type(intent: IntentType, current: StepType) -> Option<StepType> {
    let sequence = sequence_for(intent);
    let index = sequence.iter().position(|s| *s == current)?;
    sequence.get(index + 1).copied()
}

/// Whether the given persisted step_types form a prefix of the intent's
/// canonical sequence (no skipping, no reordering, no foreign steps)
pub fn is_valid_prefix(intent: IntentType, steps: &[StepType]) -> bool {
    let sequence = sequence_for(intent);
    steps.len() <= sequence.len() && steps.iter().zip(sequence.iter()).all(|(a, b)| a == b)
}

/// Validates if a step can transition from one status to another
pub fn can_transition(from: StepStatus, to: StepStatus) -> bool {
    match (from, to) {
        // From Pending
        (StepStatus::Pending, StepStatus::Running) => true,
        (StepStatus::Pending, StepStatus::AwaitingSelection) => true, // Suspends for user input
        (StepStatus::Pending, StepStatus::Failed) => true, // Can fail during validation

        // From AwaitingSelection
        (StepStatus::AwaitingSelection, StepStatus::Running) => true, // Selection received
        (StepStatus::AwaitingSelection, StepStatus::Failed) => true,

        // From Running
        (StepStatus::Running, StepStatus::Complete) => true,
        (StepStatus::Running, StepStatus::Failed) => true,

        // From Complete - outputs are immutable once written
        // (no transitions out)

        // From Failed - journey stays resumable at the checkpoint
        (StepStatus::Failed, StepStatus::Pending) => true,
        (StepStatus::Failed, StepStatus::Running) => true, // Direct retry

        // Same state is always allowed (no-op)
        (a, b) if a == b => true,

        // All other transitions are invalid
        _ => false,
    }
}

/// Validates and performs a state transition
pub fn transition_state(
    current: StepStatus,
    target: StepStatus,
) -> Result<StepStatus, StateTransitionError> {
    if current == StepStatus::Complete && target != StepStatus::Complete {
        return Err(StateTransitionError::AlreadyTerminal(current));
    }

    if !can_transition(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    Ok(target)
}

/// Check if a status is a terminal state
pub fn is_terminal_state(status: StepStatus) -> bool {
    matches!(status, StepStatus::Complete | StepStatus::Failed)
}

/// Check if a status indicates active work
pub fn is_active_state(status: StepStatus) -> bool {
    matches!(status, StepStatus::Running)
}

/// Check if a status indicates waiting (on scheduling or on the user)
pub fn is_waiting_state(status: StepStatus) -> bool {
    matches!(status, StepStatus::Pending | StepStatus::AwaitingSelection)
}

/// Get the next logical state for a step
pub fn next_state(current: StepStatus) -> Option<StepStatus> {
    match current {
        StepStatus::Pending => Some(StepStatus::Running),
        StepStatus::AwaitingSelection => Some(StepStatus::Running),
        StepStatus::Running => Some(StepStatus::Complete),
        StepStatus::Complete => None,                    // Terminal
        StepStatus::Failed => Some(StepStatus::Running), // Retry
    }
}

/// Get all valid next states from current state
pub fn valid_next_states(current: StepStatus) -> Vec<StepStatus> {
    let all_states = vec![
        StepStatus::Pending,
        StepStatus::Running,
        StepStatus::AwaitingSelection,
        StepStatus::Complete,
        StepStatus::Failed,
    ];

    all_states
        .into_iter()
        .filter(|&state| can_transition(current, state))
        .collect()
}
