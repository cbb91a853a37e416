//! Lifecycle events emitted while a run progresses.

use serde::Serialize;

use super::PipelinePhase;
use crate::core::DocumentTypeId;

/// Event from the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The run moved to another phase
    PhaseChanged { from: PipelinePhase, to: PipelinePhase },
    /// A generation call was sent
    Started { doc_type: DocumentTypeId },
    /// Free-form progress note
    Progress { message: String },
    /// A generation call settled
    Settled { doc_type: DocumentTypeId, ok: bool, duration_ms: u64 },
}

impl PipelineEvent {
    /// Log the event through tracing.
    pub(crate) fn log(&self) {
        match self {
            Self::PhaseChanged { from, to } => {
                tracing::info!(%from, %to, "Pipeline phase changed");
            }
            Self::Started { doc_type } => {
                tracing::debug!(%doc_type, "Generation started");
            }
            Self::Progress { message } => {
                tracing::info!("{}", message);
            }
            Self::Settled { doc_type, ok: true, duration_ms } => {
                tracing::info!(%doc_type, duration_ms, "Generation complete");
            }
            Self::Settled { doc_type, ok: false, duration_ms } => {
                tracing::warn!(%doc_type, duration_ms, "Generation failed");
            }
        }
    }
}
