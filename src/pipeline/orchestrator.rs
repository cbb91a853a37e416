//! Pipeline orchestrator.
//!
//! Owns the phase and the current [`PipelineRun`]. Every mutating operation
//! takes `&mut self`, so a second batch cannot start while one is in flight.

use std::time::Instant;

use futures::future::join_all;
use tokio::sync::broadcast;

use super::run::{ClarifyingQuestion, DocStatus, GeneratedDoc, GenerationResult, PipelineRun};
use super::{PhaseEvent, PipelineError, PipelineEvent, PipelinePhase};
use crate::ai::{AIError, GenerationClient};
use crate::core::{DocTypeProfile, DocumentTypeId, GenerationConfig};
use crate::ingest::SourceContent;

/// Capacity of the event channel; slow subscribers miss older events.
const EVENT_CAPACITY: usize = 256;

/// Drives generation runs.
pub struct Orchestrator {
    client: GenerationClient,
    settings: GenerationConfig,
    phase: PipelinePhase,
    run: Option<PipelineRun>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Orchestrator {
    /// Create an idle orchestrator.
    pub fn new(client: GenerationClient, settings: GenerationConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client: client.with_max_questions(settings.max_questions),
            settings,
            phase: PipelinePhase::Idle,
            run: None,
            events,
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Current phase.
    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    /// Current run, if any.
    pub fn run(&self) -> Option<&PipelineRun> {
        self.run.as_ref()
    }

    /// The generation client runs are driven with.
    pub fn client(&self) -> &GenerationClient {
        &self.client
    }

    fn emit(&self, event: PipelineEvent) {
        event.log();
        // Sending only fails when nobody is subscribed
        let _ = self.events.send(event);
    }

    fn transition(&mut self, event: PhaseEvent) -> Result<(), PipelineError> {
        let next = self.phase.apply(event)?;
        if next != self.phase {
            self.emit(PipelineEvent::PhaseChanged { from: self.phase, to: next });
        }
        self.phase = next;
        Ok(())
    }

    fn require_phase(&self, expected: PipelinePhase) -> Result<(), PipelineError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(PipelineError::WrongPhase { expected, actual: self.phase })
        }
    }

    fn run_mut(&mut self) -> Result<&mut PipelineRun, PipelineError> {
        self.run.as_mut().ok_or(PipelineError::NoRun)
    }

    /// Validate requested types and drop duplicates, keeping selection order.
    fn resolve_types(
        &self,
        types: &[DocumentTypeId],
    ) -> Result<Vec<DocTypeProfile>, PipelineError> {
        let mut profiles: Vec<DocTypeProfile> = Vec::with_capacity(types.len());
        for doc_type in types {
            let profile = self
                .client
                .registry()
                .get(doc_type)
                .ok_or_else(|| PipelineError::UnknownDocumentType(doc_type.to_string()))?;
            if !profiles.iter().any(|p| p.id == profile.id) {
                profiles.push(profile.clone());
            }
        }

        if profiles.is_empty() {
            return Err(PipelineError::NoTypesSelected);
        }
        Ok(profiles)
    }

    /// Start a run.
    ///
    /// Returns the phase the run stopped in: `AwaitingAnswers` when there are
    /// clarifying questions, otherwise `Reviewing` with every document
    /// generated. A fatal analysis error discards the run and returns to
    /// `Idle`.
    pub async fn start(
        &mut self,
        source: SourceContent,
        types: &[DocumentTypeId],
    ) -> Result<PipelinePhase, PipelineError> {
        self.phase.apply(PhaseEvent::Start)?;
        if source.is_empty() {
            return Err(PipelineError::EmptySource);
        }
        let profiles = self.resolve_types(types)?;
        let selected: Vec<DocumentTypeId> = profiles.iter().map(|p| p.id.clone()).collect();

        let run = PipelineRun::new(source, selected.clone());
        tracing::info!(
            run_id = %run.id,
            source = %run.source.short_fingerprint(),
            types = selected.len(),
            "Starting pipeline run"
        );
        let source = run.source.clone();
        self.run = Some(run);
        self.transition(PhaseEvent::Start)?;

        let (source, questions) = match self.analyze(source, &selected).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::error!(error = %e, "Analysis failed, abandoning run");
                self.run = None;
                self.transition(PhaseEvent::Aborted)?;
                return Err(e.into());
            }
        };

        let run = self.run_mut()?;
        run.source = source;
        run.clarifying_questions = questions.into_iter().map(ClarifyingQuestion::new).collect();

        if run.clarifying_questions.is_empty() {
            self.transition(PhaseEvent::NoQuestions)?;
            self.generate_selected().await?;
        } else {
            let count = run.clarifying_questions.len();
            self.transition(PhaseEvent::QuestionsReady)?;
            self.emit(PipelineEvent::Progress {
                message: format!("{count} clarifying question(s) awaiting answers"),
            });
        }
        Ok(self.phase)
    }

    /// Categorize the source and collect clarifying questions.
    ///
    /// Only fatal errors propagate: a failed categorization keeps the
    /// original content and failed questions mean there are none.
    async fn analyze(
        &self,
        mut source: SourceContent,
        types: &[DocumentTypeId],
    ) -> Result<(SourceContent, Vec<String>), AIError> {
        if self.settings.categorize {
            self.emit(PipelineEvent::Progress { message: "Categorizing features".to_string() });
            match self.client.categorize(&source).await {
                Ok(c) if c.has_multiple_features && !c.organized_content.trim().is_empty() => {
                    tracing::info!("Multiple features detected, using reorganized content");
                    source = SourceContent::new(c.organized_content.trim());
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Categorization failed, using original content");
                }
            }
        }

        let mut questions = Vec::new();
        if self.settings.clarifying_questions {
            self.emit(PipelineEvent::Progress {
                message: "Checking for clarifying questions".to_string(),
            });
            match self.client.clarifying_questions(&source, types).await {
                Ok(found) => questions = found,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "Clarifying questions failed, continuing without");
                }
            }
        }

        Ok((source, questions))
    }

    /// Clarifying questions of the current run.
    pub fn questions(&self) -> &[ClarifyingQuestion] {
        self.run.as_ref().map_or(&[], |run| run.clarifying_questions.as_slice())
    }

    /// Record the answer to one clarifying question.
    pub fn answer(&mut self, index: usize, text: impl Into<String>) -> Result<(), PipelineError> {
        self.require_phase(PipelinePhase::AwaitingAnswers)?;
        let run = self.run_mut()?;
        let len = run.clarifying_questions.len();
        let question = run
            .clarifying_questions
            .get_mut(index)
            .ok_or(PipelineError::IndexOutOfRange { index, len })?;
        question.answer = text.into();
        Ok(())
    }

    /// Append the answers to the source and generate.
    pub async fn continue_with_answers(&mut self) -> Result<PipelinePhase, PipelineError> {
        self.phase.apply(PhaseEvent::AnswersSubmitted)?;
        let run = self.run_mut()?;
        let extended = run.source.with_answers(run.answered());
        let answered = run.answered().count();
        run.source = extended;

        tracing::info!(answered, "Continuing with clarifying answers");
        self.transition(PhaseEvent::AnswersSubmitted)?;
        self.generate_selected().await?;
        Ok(self.phase)
    }

    /// Generate from the unmodified source.
    pub async fn skip_questions(&mut self) -> Result<PipelinePhase, PipelineError> {
        self.phase.apply(PhaseEvent::AnswersSkipped)?;
        self.run_mut()?;
        self.transition(PhaseEvent::AnswersSkipped)?;
        self.generate_selected().await?;
        Ok(self.phase)
    }

    /// Generate every selected type and move to review.
    async fn generate_selected(&mut self) -> Result<(), PipelineError> {
        let selected = self.run_mut()?.selected_types.clone();
        let profiles = self.resolve_types(&selected)?;
        let docs = self.generate_batch(&profiles).await?;
        self.run_mut()?.results = docs;
        self.finish_batch()
    }

    fn finish_batch(&mut self) -> Result<(), PipelineError> {
        let run = self.run_mut()?;
        let failed = run.failed_count();
        let total = run.results.len();
        self.emit(PipelineEvent::Progress {
            message: format!("{} of {} document(s) generated", total - failed, total),
        });
        self.transition(PhaseEvent::BatchSettled)
    }

    /// Fire one call per profile concurrently and wait for all of them.
    ///
    /// Results come back in the order of `profiles`, whatever order the
    /// calls settle in. A failed call yields a document with `error` set.
    async fn generate_batch(
        &mut self,
        profiles: &[DocTypeProfile],
    ) -> Result<Vec<GeneratedDoc>, PipelineError> {
        let run = self.run_mut()?;
        for profile in profiles {
            run.statuses.insert(profile.id.clone(), DocStatus::Processing);
        }
        let source = run.source.clone();

        let client = &self.client;
        let events = &self.events;
        let results =
            join_all(profiles.iter().map(|p| generate_one(client, events, &p.id, &source))).await;

        let run = self.run_mut()?;
        let docs = results
            .into_iter()
            .zip(profiles)
            .map(|(result, profile)| {
                run.statuses.insert(profile.id.clone(), DocStatus::Complete);
                GeneratedDoc::from_result(result, profile)
            })
            .collect();
        Ok(docs)
    }

    /// Types from the registry without a document in the current run.
    pub fn available_types(&self) -> Vec<DocumentTypeId> {
        self.client
            .registry()
            .ids()
            .into_iter()
            .filter(|id| !self.run.as_ref().is_some_and(|run| run.has_generated(id)))
            .collect()
    }

    /// Generate additional types against the same source.
    ///
    /// Types that already have a document are rejected. New documents are
    /// appended after the existing ones.
    pub async fn generate_more(&mut self, types: &[DocumentTypeId]) -> Result<(), PipelineError> {
        self.phase.apply(PhaseEvent::GenerateMore)?;
        let profiles = self.resolve_types(types)?;

        let run = self.run_mut()?;
        if let Some(existing) = profiles.iter().find(|p| run.has_generated(&p.id)) {
            return Err(PipelineError::AlreadyGenerated(existing.id.clone()));
        }
        for profile in &profiles {
            run.selected_types.push(profile.id.clone());
            run.statuses.insert(profile.id.clone(), DocStatus::Pending);
        }

        self.transition(PhaseEvent::GenerateMore)?;
        let docs = self.generate_batch(&profiles).await?;
        self.run_mut()?.results.extend(docs);
        self.finish_batch()
    }

    /// Regenerate one document in place.
    ///
    /// Returns the index of the replaced document.
    pub async fn regenerate(&mut self, doc_type: &DocumentTypeId) -> Result<usize, PipelineError> {
        self.phase.apply(PhaseEvent::Regenerate)?;
        let profiles = self.resolve_types(std::slice::from_ref(doc_type))?;
        let index = self
            .run_mut()?
            .position(doc_type)
            .ok_or_else(|| PipelineError::NotGenerated(doc_type.clone()))?;

        let docs = self.generate_batch(&profiles).await?;
        if let Some(doc) = docs.into_iter().next() {
            self.run_mut()?.results[index] = doc;
        }
        self.transition(PhaseEvent::Regenerate)?;
        Ok(index)
    }

    fn document_mut(&mut self, index: usize) -> Result<&mut GeneratedDoc, PipelineError> {
        self.require_phase(PipelinePhase::Reviewing)?;
        let run = self.run_mut()?;
        let len = run.results.len();
        run.results.get_mut(index).ok_or(PipelineError::IndexOutOfRange { index, len })
    }

    /// Replace a document's content with a user edit.
    pub fn edit_document(
        &mut self,
        index: usize,
        content: impl Into<String>,
    ) -> Result<(), PipelineError> {
        let doc = self.document_mut(index)?;
        doc.content = content.into();
        doc.error = None;
        Ok(())
    }

    /// Tidy a document with the AI cleanup pass.
    ///
    /// A failed cleanup leaves the document unchanged. Documents that failed
    /// to generate hold only a placeholder and are rejected.
    pub async fn polish_document(&mut self, index: usize) -> Result<(), PipelineError> {
        let doc = self.document_mut(index)?;
        if doc.is_error() {
            return Err(PipelineError::FailedDocument { index });
        }
        let content = doc.content.clone();
        let polished = self.client.cleanup(&content).await?;
        self.document_mut(index)?.content = polished;
        tracing::debug!(index, "Document polished");
        Ok(())
    }

    /// Discard the run and return to `Idle`.
    pub fn reset(&mut self) {
        if let Some(run) = self.run.take() {
            tracing::info!(run_id = %run.id, "Pipeline run discarded");
        }
        // Reset is valid from every phase
        let _ = self.transition(PhaseEvent::Reset);
    }
}

/// Run one generation call, isolating its failure.
async fn generate_one(
    client: &GenerationClient,
    events: &broadcast::Sender<PipelineEvent>,
    doc_type: &DocumentTypeId,
    source: &SourceContent,
) -> GenerationResult {
    let notify = |event: PipelineEvent| {
        event.log();
        let _ = events.send(event);
    };

    notify(PipelineEvent::Started { doc_type: doc_type.clone() });
    let start = Instant::now();

    let result = match client.generate(doc_type, source).await {
        Ok(content) => {
            GenerationResult::success(doc_type.clone(), content, elapsed_ms(start))
        }
        Err(e) => GenerationResult::failure(doc_type.clone(), e.to_string(), elapsed_ms(start)),
    };

    notify(PipelineEvent::Settled {
        doc_type: doc_type.clone(),
        ok: result.is_success(),
        duration_ms: result.duration_ms,
    });
    result
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
