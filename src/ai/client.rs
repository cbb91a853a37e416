//! Generation client.
//!
//! Stateless wrapper over a [`TextGenerator`] exposing the operations a
//! pipeline run needs. Each operation issues exactly one request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;

use super::prompts::{self, SYSTEM_CATEGORIZE, SYSTEM_CLEANUP, SYSTEM_ENHANCE, SYSTEM_QUESTIONS};
use super::{AIError, CallKind, CompletionRequest, TextGenerator};
use crate::core::{DocTypeRegistry, DocumentTypeId};
use crate::ingest::SourceContent;

/// Outcome of the feature categorization pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Categorization {
    /// Whether the source describes more than one distinct feature
    pub has_multiple_features: bool,
    /// Source reorganised by feature (empty when there is one feature)
    #[serde(default)]
    pub organized_content: String,
}

/// Client for the text-generation service.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn TextGenerator>,
    registry: Arc<DocTypeRegistry>,
    timeout: Option<Duration>,
    max_questions: usize,
}

impl GenerationClient {
    /// Create a client over a provider and a document type registry.
    pub fn new(provider: Arc<dyn TextGenerator>, registry: Arc<DocTypeRegistry>) -> Self {
        Self { provider, registry, timeout: None, max_questions: 5 }
    }

    /// Bound every call by a timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap the number of clarifying questions returned.
    pub fn with_max_questions(mut self, max: usize) -> Self {
        self.max_questions = max;
        self
    }

    /// The document type registry this client generates for.
    pub fn registry(&self) -> &DocTypeRegistry {
        &self.registry
    }

    /// Name of the underlying provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Send one request and normalize the response.
    async fn send(&self, request: CompletionRequest) -> Result<String, AIError> {
        let start = Instant::now();
        let kind = request.kind.to_string();

        tracing::debug!(
            provider = self.provider.name(),
            kind = %kind,
            temperature = request.temperature,
            max_tokens = request.max_tokens,
            "Sending completion request"
        );

        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.provider.complete(&request))
                .await
                .map_err(|_| AIError::Timeout(limit))
                .and_then(|r| r),
            None => self.provider.complete(&request).await,
        };

        let text = match result {
            Ok(text) => prompts::strip_code_fences(&text),
            Err(e) => {
                tracing::warn!(kind = %kind, error = %e, "Completion request failed");
                return Err(e);
            }
        };

        if text.is_empty() {
            tracing::warn!(kind = %kind, "Completion returned an empty body");
            return Err(AIError::EmptyResponse);
        }

        tracing::debug!(
            kind = %kind,
            chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Completion received"
        );
        Ok(text)
    }

    /// Draft one document of the given type from the source.
    pub async fn generate(
        &self,
        doc_type: &DocumentTypeId,
        source: &SourceContent,
    ) -> Result<String, AIError> {
        let profile = self
            .registry
            .get(doc_type)
            .ok_or_else(|| AIError::UnknownDocumentType(doc_type.to_string()))?;

        let request = CompletionRequest::new(
            CallKind::Generate(doc_type.clone()),
            profile.system_prompt.trim(),
            prompts::generate_instruction(profile, source),
        );
        self.send(request).await
    }

    /// Rewrite raw pasted notes into clearer source material.
    pub async fn enhance(&self, raw: &str) -> Result<String, AIError> {
        let request = CompletionRequest::new(
            CallKind::Enhance,
            SYSTEM_ENHANCE,
            prompts::enhance_instruction(raw),
        );
        self.send(request).await
    }

    /// Tidy an edited document fragment.
    pub async fn cleanup(&self, html: &str) -> Result<String, AIError> {
        let request = CompletionRequest::new(
            CallKind::Cleanup,
            SYSTEM_CLEANUP,
            prompts::cleanup_instruction(html),
        );
        self.send(request).await
    }

    /// Detect multiple features and reorganise the source by feature.
    pub async fn categorize(&self, source: &SourceContent) -> Result<Categorization, AIError> {
        let request = CompletionRequest::new(
            CallKind::Categorize,
            SYSTEM_CATEGORIZE,
            prompts::categorize_instruction(source),
        );
        let text = self.send(request).await?;
        prompts::parse_categorization(&text)
    }

    /// Ask what is missing before generating the selected types.
    pub async fn clarifying_questions(
        &self,
        source: &SourceContent,
        types: &[DocumentTypeId],
    ) -> Result<Vec<String>, AIError> {
        if self.max_questions == 0 {
            return Ok(Vec::new());
        }

        let labels: Vec<&str> = types
            .iter()
            .filter_map(|id| self.registry.get(id))
            .map(|profile| profile.label.as_str())
            .collect();

        let request = CompletionRequest::new(
            CallKind::ClarifyingQuestions,
            SYSTEM_QUESTIONS,
            prompts::questions_instruction(source, &labels, self.max_questions),
        );

        match self.send(request).await {
            Ok(text) => Ok(prompts::parse_questions(&text, self.max_questions)),
            // "[]" after fence stripping is a valid no-questions answer, but a
            // provider that returns nothing at all means the same thing here
            Err(AIError::EmptyResponse) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Provider that answers every request with a fixed body and records it.
    struct FixedProvider {
        body: String,
        delay: Option<Duration>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl FixedProvider {
        fn new(body: &str) -> Self {
            Self { body: body.to_string(), delay: None, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl TextGenerator for FixedProvider {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, AIError> {
            self.seen.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.body.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn client(provider: Arc<FixedProvider>) -> GenerationClient {
        GenerationClient::new(provider, Arc::new(DocTypeRegistry::builtin().unwrap()))
    }

    #[tokio::test]
    async fn test_generate_uses_type_profile() {
        let provider = Arc::new(FixedProvider::new("```html\n<h1>FAQ</h1>\n```"));
        let client = client(provider.clone());

        let text = client
            .generate(&DocumentTypeId::new("faq"), &SourceContent::new("Feature X launched"))
            .await
            .unwrap();
        assert_eq!(text, "<h1>FAQ</h1>");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].kind, CallKind::Generate(DocumentTypeId::new("faq")));
        assert!(seen[0].system.contains("frequently asked questions"));
        assert!(seen[0].user.contains("Feature X launched"));
    }

    #[tokio::test]
    async fn test_unknown_type_makes_no_call() {
        let provider = Arc::new(FixedProvider::new("ignored"));
        let client = client(provider.clone());

        let err = client
            .generate(&DocumentTypeId::new("sonnet"), &SourceContent::new("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, AIError::UnknownDocumentType(_)));
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_body_is_an_error() {
        let client = client(Arc::new(FixedProvider::new("   \n")));
        let err = client.cleanup("<p>x</p>").await.unwrap_err();
        assert!(matches!(err, AIError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_timeout() {
        let provider = Arc::new(FixedProvider {
            delay: Some(Duration::from_millis(200)),
            ..FixedProvider::new("late")
        });
        let client = client(provider).with_timeout(Some(Duration::from_millis(20)));

        let err = client.enhance("notes").await.unwrap_err();
        assert!(matches!(err, AIError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_clarifying_questions_capped() {
        let provider = Arc::new(FixedProvider::new(r#"["A?", "B?", "C?"]"#));
        let client = client(provider.clone()).with_max_questions(2);

        let questions = client
            .clarifying_questions(&SourceContent::new("x"), &[DocumentTypeId::new("faq")])
            .await
            .unwrap();
        assert_eq!(questions, vec!["A?", "B?"]);

        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].user.contains("The user wants to produce: FAQ."));
        assert_eq!(seen[0].max_tokens, 1024);
    }

    #[tokio::test]
    async fn test_zero_questions_skips_call() {
        let provider = Arc::new(FixedProvider::new("[\"A?\"]"));
        let client = client(provider.clone()).with_max_questions(0);

        let questions =
            client.clarifying_questions(&SourceContent::new("x"), &[]).await.unwrap();
        assert!(questions.is_empty());
        assert!(provider.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_categorize() {
        let client = client(Arc::new(FixedProvider::new(
            r#"{"hasMultipleFeatures": false, "organizedContent": ""}"#,
        )));
        let result = client.categorize(&SourceContent::new("one feature")).await.unwrap();
        assert_eq!(result, Categorization::default());
    }
}
