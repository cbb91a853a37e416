//! AI integration module.
//!
//! Turns source content into documents through an external text-generation
//! service.
//!
//! ## Layers
//!
//! - [`TextGenerator`] - one request in, one completion out (a provider)
//! - [`GenerationClient`] - the operations the pipeline needs (generate,
//!   enhance, cleanup, categorize, clarifying questions), built on a provider
//!
//! No call is ever retried; failures surface as [`AIError`] and the caller
//! decides whether to isolate or propagate them.

#[cfg(feature = "ai")]
mod azure;
mod client;
#[cfg(feature = "ai")]
mod openai;
mod prompts;

#[cfg(feature = "ai")]
pub use azure::AzureOpenAIProvider;
pub use client::{Categorization, GenerationClient};
#[cfg(feature = "ai")]
pub use openai::OpenAIProvider;
pub use prompts::{parse_categorization, parse_questions, strip_code_fences};

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::DocumentTypeId;

/// A text-generation backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run one completion request.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AIError>;

    /// Get the provider name.
    fn name(&self) -> &str;
}

/// AI error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AIError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("No response from AI")]
    EmptyResponse,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unknown document type: {0}")]
    UnknownDocumentType(String),
}

impl AIError {
    /// Configuration problems abort whatever triggered the call.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Rejected credentials (HTTP 401/403).
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api { status: 401 | 403, .. })
    }

    /// Errors that mean the service cannot be used at all right now.
    pub fn is_fatal(&self) -> bool {
        self.is_auth() || matches!(self, Self::Configuration(_) | Self::Transport(_))
    }
}

#[cfg(feature = "ai")]
impl From<reqwest::Error> for AIError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Kind of call, which fixes its sampling parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    /// Draft one document of the given type
    Generate(DocumentTypeId),
    /// Rewrite pasted notes into clearer source material
    Enhance,
    /// Tidy an edited document without changing its meaning
    Cleanup,
    /// Detect and group distinct features in the source
    Categorize,
    /// Ask what is missing before generating
    ClarifyingQuestions,
}

impl CallKind {
    /// Sampling temperature: low for precision work, higher for drafting.
    pub fn temperature(&self) -> f32 {
        match self {
            Self::Generate(_) => 0.7,
            Self::Enhance | Self::ClarifyingQuestions => 0.5,
            Self::Categorize => 0.3,
            Self::Cleanup => 0.2,
        }
    }

    /// Output token ceiling.
    pub fn max_tokens(&self) -> u32 {
        match self {
            Self::ClarifyingQuestions => 1024,
            _ => 4096,
        }
    }
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate(id) => write!(f, "generate:{id}"),
            Self::Enhance => f.write_str("enhance"),
            Self::Cleanup => f.write_str("cleanup"),
            Self::Categorize => f.write_str("categorize"),
            Self::ClarifyingQuestions => f.write_str("clarifying-questions"),
        }
    }
}

/// One request to a provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub kind: CallKind,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// Build a request with the sampling parameters of its kind.
    pub fn new(kind: CallKind, system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            temperature: kind.temperature(),
            max_tokens: kind.max_tokens(),
            kind,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Build the provider named in configuration.
///
/// Credentials come from the environment; a missing credential is a
/// configuration error and no request is attempted.
#[cfg(feature = "ai")]
pub fn build_provider(
    config: &crate::core::AiConfig,
) -> Result<std::sync::Arc<dyn TextGenerator>, AIError> {
    use std::sync::Arc;

    match config.provider.to_ascii_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAIProvider::from_config(config)?)),
        "azure" => Ok(Arc::new(AzureOpenAIProvider::from_config(config)?)),
        other => Err(AIError::Configuration(format!(
            "Unknown AI provider '{other}' (expected openai or azure)"
        ))),
    }
}
