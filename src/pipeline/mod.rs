// Research pipeline
//
// stages.rs holds the individual stage computations; driver.rs owns
// persistence, event emission, and the two-call resume protocol that
// stitches stages into a journey.

pub mod driver;
pub mod stages;

pub use driver::{ActiveRuns, Driver, RunToken, SelectionRejection};

use thiserror::Error;

use crate::evidence::EvidenceError;
use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A user selection or model output failed validation. Never advances
    /// or fails the journey; the awaiting step stays awaiting.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Evidence(#[from] EvidenceError),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Validation failures leave the journey exactly where it was; anything
    /// else fails the running step before the stream closes.
    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}
