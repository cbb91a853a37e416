//! Generation pipeline.
//!
//! Drives one run from analysis through review:
//!
//! ```text
//! Idle -> Analyzing -> AwaitingAnswers -> Generating -> Reviewing
//!                  \______________________/     ^          |
//!                                               |__________| generate more
//! ```
//!
//! Transitions are computed by [`PipelinePhase::apply`]; the [`Orchestrator`]
//! performs the work behind each one and emits [`PipelineEvent`]s.

mod events;
mod orchestrator;
mod run;
mod state;

pub use events::PipelineEvent;
pub use orchestrator::Orchestrator;
pub use run::{ClarifyingQuestion, DocStatus, GeneratedDoc, GenerationResult, PipelineRun};
pub use state::{PhaseEvent, PipelinePhase};

use crate::ai::AIError;
use crate::core::DocumentTypeId;

/// Pipeline error types.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Cannot apply {event:?} while {from}")]
    InvalidTransition { from: PipelinePhase, event: PhaseEvent },

    #[error("Operation requires phase {expected}, current phase is {actual}")]
    WrongPhase { expected: PipelinePhase, actual: PipelinePhase },

    #[error("No document types selected")]
    NoTypesSelected,

    #[error("Source content is empty")]
    EmptySource,

    #[error("Unknown document type: {0}")]
    UnknownDocumentType(String),

    #[error("Document type already generated in this run: {0}")]
    AlreadyGenerated(DocumentTypeId),

    #[error("Document type not generated in this run: {0}")]
    NotGenerated(DocumentTypeId),

    #[error("Document index {index} out of range ({len} documents)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Document {index} failed to generate; regenerate or edit it first")]
    FailedDocument { index: usize },

    #[error("No pipeline run in progress")]
    NoRun,

    #[error(transparent)]
    Ai(#[from] AIError),
}
