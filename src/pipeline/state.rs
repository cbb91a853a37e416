//! Pipeline phases and transitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::PipelineError;

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// No run in progress
    #[default]
    Idle,
    /// Categorizing the source and asking for clarifying questions
    Analyzing,
    /// Waiting for the user to answer or skip the questions
    AwaitingAnswers,
    /// A batch of documents is in flight
    Generating,
    /// Documents are ready for edit, regeneration and export
    Reviewing,
}

/// Something that happened to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    /// Source and types supplied
    Start,
    /// Analysis produced at least one question
    QuestionsReady,
    /// Analysis produced no questions
    NoQuestions,
    /// Answers were appended to the source
    AnswersSubmitted,
    /// Questions were skipped
    AnswersSkipped,
    /// Every call in the batch settled
    BatchSettled,
    /// Additional types requested during review
    GenerateMore,
    /// One document regenerated during review
    Regenerate,
    /// A fatal error stopped the analysis
    Aborted,
    /// Run discarded
    Reset,
}

impl PipelinePhase {
    /// Get the display name for this phase
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Analyzing => "Analyzing",
            Self::AwaitingAnswers => "Awaiting answers",
            Self::Generating => "Generating",
            Self::Reviewing => "Reviewing",
        }
    }

    /// Whether the user may act on the run in this phase.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Idle | Self::AwaitingAnswers | Self::Reviewing)
    }

    /// Compute the phase that follows `event`.
    pub fn apply(self, event: PhaseEvent) -> Result<Self, PipelineError> {
        use PhaseEvent as E;
        use PipelinePhase as P;

        let next = match (self, event) {
            (_, E::Reset) => P::Idle,
            (P::Idle, E::Start) => P::Analyzing,
            (P::Analyzing, E::QuestionsReady) => P::AwaitingAnswers,
            (P::Analyzing, E::NoQuestions) => P::Generating,
            (P::Analyzing, E::Aborted) => P::Idle,
            (P::AwaitingAnswers, E::AnswersSubmitted | E::AnswersSkipped) => P::Generating,
            (P::Generating, E::BatchSettled) => P::Reviewing,
            (P::Reviewing, E::GenerateMore) => P::Generating,
            (P::Reviewing, E::Regenerate) => P::Reviewing,
            (from, event) => return Err(PipelineError::InvalidTransition { from, event }),
        };
        Ok(next)
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}
