//! Shared test helpers: a scripted text generator standing in for the
//! real service.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use docforge::ai::{AIError, CallKind, CompletionRequest, GenerationClient, TextGenerator};
use docforge::core::{DocTypeRegistry, DocumentTypeId, GenerationConfig};
use docforge::pipeline::Orchestrator;

/// Provider that answers from a script and records every request.
///
/// Behaviour is keyed by the call kind's display name, e.g. `generate:faq`,
/// `categorize` or `clarifying-questions`.
#[derive(Default)]
pub struct ScriptedGenerator {
    delays: HashMap<String, Duration>,
    failures: HashMap<String, AIError>,
    questions: Vec<String>,
    categorization: Option<String>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, kind: &str, millis: u64) -> Self {
        self.delays.insert(kind.to_string(), Duration::from_millis(millis));
        self
    }

    pub fn with_failure(mut self, kind: &str, error: AIError) -> Self {
        self.failures.insert(kind.to_string(), error);
        self
    }

    pub fn with_questions(mut self, questions: &[&str]) -> Self {
        self.questions = questions.iter().map(|q| (*q).to_string()).collect();
        self
    }

    pub fn with_categorization(mut self, json: &str) -> Self {
        self.categorization = Some(json.to_string());
        self
    }

    /// All recorded requests, in the order they were sent.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded requests of one kind.
    pub fn calls_of(&self, kind: &str) -> Vec<CompletionRequest> {
        self.calls().into_iter().filter(|c| c.kind.to_string() == kind).collect()
    }

    /// Number of generation requests sent so far.
    pub fn generate_count(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c.kind, CallKind::Generate(_))).count()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AIError> {
        let key = request.kind.to_string();
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(request.clone());
            calls.iter().filter(|c| c.kind == request.kind).count()
        };

        if let Some(delay) = self.delays.get(&key) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.failures.get(&key) {
            return Err(error.clone());
        }

        let body = match &request.kind {
            CallKind::Generate(id) => format!("<h1>{id}</h1>\n<p>Draft {attempt}</p>"),
            CallKind::Enhance => "Enhanced notes".to_string(),
            CallKind::Cleanup => "<p>Polished</p>".to_string(),
            CallKind::Categorize => self.categorization.clone().unwrap_or_else(|| {
                r#"{"hasMultipleFeatures": false, "organizedContent": ""}"#.to_string()
            }),
            CallKind::ClarifyingQuestions => {
                serde_json::to_string(&self.questions).unwrap_or_else(|_| "[]".to_string())
            }
        };
        Ok(body)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Build a client over the built-in registry.
pub fn client(generator: &Arc<ScriptedGenerator>) -> GenerationClient {
    let registry = Arc::new(DocTypeRegistry::builtin().unwrap());
    GenerationClient::new(generator.clone(), registry)
}

/// Build an orchestrator with default settings.
pub fn orchestrator(generator: &Arc<ScriptedGenerator>) -> Orchestrator {
    Orchestrator::new(client(generator), GenerationConfig::default())
}

/// Shorthand for a list of type IDs.
pub fn types(ids: &[&str]) -> Vec<DocumentTypeId> {
    ids.iter().map(|id| DocumentTypeId::new(*id)).collect()
}
