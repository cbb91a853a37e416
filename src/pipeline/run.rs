//! Per-run state: statuses, questions and generated documents.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{DocFormat, DocTypeProfile, DocumentTypeId};
use crate::export::sanitize_filename;
use crate::ingest::SourceContent;

/// Status of one document type within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStatus {
    /// Selected but not yet sent
    Pending,
    /// Request in flight
    Processing,
    /// Settled, successfully or not
    Complete,
}

impl DocStatus {
    /// Check if the document has settled.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// A question raised during analysis and the user's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyingQuestion {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

impl ClarifyingQuestion {
    pub fn new(question: impl Into<String>) -> Self {
        Self { question: question.into(), answer: String::new() }
    }

    /// Whether the user supplied a non-blank answer.
    pub fn is_answered(&self) -> bool {
        !self.answer.trim().is_empty()
    }
}

/// Outcome of one generation call.
///
/// Never an `Err`: a failed call still yields a result with `error` set and
/// a placeholder in `content`, so siblings in the batch are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub doc_type: DocumentTypeId,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl GenerationResult {
    /// Successful generation.
    pub fn success(doc_type: DocumentTypeId, content: String, duration_ms: u64) -> Self {
        Self { doc_type, content, error: None, generated_at: Utc::now(), duration_ms }
    }

    /// Failed generation with an error placeholder as content.
    pub fn failure(doc_type: DocumentTypeId, error: impl Into<String>, duration_ms: u64) -> Self {
        let error = error.into();
        Self {
            doc_type,
            content: format!("Error generating document: {error}"),
            error: Some(error),
            generated_at: Utc::now(),
            duration_ms,
        }
    }

    /// Check if the generation succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// A document owned by a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedDoc {
    /// Display label of the document type
    pub label: String,
    /// Filename derived from the label and format
    pub filename: String,
    pub content: String,
    pub doc_type: DocumentTypeId,
    pub format: DocFormat,
    pub generated_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl GeneratedDoc {
    /// Build a document from a generation result and its type profile.
    pub fn from_result(result: GenerationResult, profile: &DocTypeProfile) -> Self {
        Self {
            label: profile.label.clone(),
            filename: format!("{}.{}", sanitize_filename(&profile.label), profile.format.extension()),
            content: result.content,
            doc_type: result.doc_type,
            format: profile.format,
            generated_at: result.generated_at,
            duration_ms: result.duration_ms,
            error: result.error,
        }
    }

    /// Check if the document failed to generate.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// State of one generation workflow, from ingestion through review.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Content exactly as supplied
    pub original_source: SourceContent,
    /// Content every generation in this run reads
    pub source: SourceContent,
    /// Requested types in selection order
    pub selected_types: Vec<DocumentTypeId>,
    pub statuses: HashMap<DocumentTypeId, DocStatus>,
    /// Documents in selection order
    pub results: Vec<GeneratedDoc>,
    pub clarifying_questions: Vec<ClarifyingQuestion>,
}

impl PipelineRun {
    /// Create a run with every selected type pending.
    pub fn new(source: SourceContent, selected_types: Vec<DocumentTypeId>) -> Self {
        let statuses = selected_types.iter().map(|t| (t.clone(), DocStatus::Pending)).collect();
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            original_source: source.clone(),
            source,
            selected_types,
            statuses,
            results: Vec::new(),
            clarifying_questions: Vec::new(),
        }
    }

    /// Status of one type, if selected.
    pub fn status(&self, doc_type: &DocumentTypeId) -> Option<DocStatus> {
        self.statuses.get(doc_type).copied()
    }

    /// Index of a type's document in `results`.
    pub fn position(&self, doc_type: &DocumentTypeId) -> Option<usize> {
        self.results.iter().position(|doc| &doc.doc_type == doc_type)
    }

    /// Whether a document of this type already exists in the run.
    pub fn has_generated(&self, doc_type: &DocumentTypeId) -> bool {
        self.position(doc_type).is_some()
    }

    /// Types with a document, in display order.
    pub fn generated_types(&self) -> Vec<DocumentTypeId> {
        self.results.iter().map(|doc| doc.doc_type.clone()).collect()
    }

    /// Every selected type has settled and has exactly one document.
    pub fn is_settled(&self) -> bool {
        self.selected_types.len() == self.results.len()
            && self.selected_types.iter().all(|t| {
                self.status(t).is_some_and(|s| s.is_finished()) && self.has_generated(t)
            })
    }

    /// Count of documents that failed to generate.
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|doc| doc.is_error()).count()
    }

    /// Question/answer pairs with a non-blank answer.
    pub fn answered(&self) -> impl Iterator<Item = (&str, &str)> {
        self.clarifying_questions
            .iter()
            .filter(|q| q.is_answered())
            .map(|q| (q.question.as_str(), q.answer.trim()))
    }

    /// Documents in display order.
    pub fn documents(&self) -> &[GeneratedDoc] {
        &self.results
    }
}
