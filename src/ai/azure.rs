//! Azure OpenAI API integration.
//!
//! Implements the TextGenerator trait for Azure OpenAI deployments.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AIError, CompletionRequest, TextGenerator};
use crate::core::AiConfig;

/// Azure OpenAI API provider.
pub struct AzureOpenAIProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AzureOpenAIProvider {
    /// Create from environment variables, falling back to configuration.
    ///
    /// Environment variables:
    /// - AZURE_OPENAI_ENDPOINT (or `ai.azure.endpoint`)
    /// - AZURE_OPENAI_API_KEY
    /// - AZURE_OPENAI_DEPLOYMENT (or `ai.azure.deployment`)
    pub fn from_config(config: &AiConfig) -> Result<Self, AIError> {
        let endpoint = env_value("AZURE_OPENAI_ENDPOINT")
            .or_else(|| config.azure.endpoint.clone())
            .ok_or_else(|| AIError::Configuration("AZURE_OPENAI_ENDPOINT not set".to_string()))?;
        let api_key = env_value("AZURE_OPENAI_API_KEY")
            .ok_or_else(|| AIError::Configuration("AZURE_OPENAI_API_KEY not set".to_string()))?;
        let deployment = env_value("AZURE_OPENAI_DEPLOYMENT")
            .or_else(|| config.azure.deployment.clone())
            .ok_or_else(|| {
                AIError::Configuration("AZURE_OPENAI_DEPLOYMENT not set".to_string())
            })?;

        Ok(Self::from_parts(endpoint, api_key, deployment)
            .with_api_version(&config.azure.api_version))
    }

    /// Create from explicit values.
    pub fn from_parts(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            deployment: deployment.into(),
            api_version: "2024-02-01".to_string(),
        }
    }

    /// Set the API version.
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    // {endpoint}/openai/deployments/{deployment}/chat/completions?api-version={api_version}
    fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            urlencoding::encode(&self.deployment),
            self.api_version
        )
    }
}

#[async_trait]
impl TextGenerator for AzureOpenAIProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, AIError> {
        let body = AzureOpenAIRequest {
            messages: vec![
                ChatMessage { role: "system".to_string(), content: Some(request.system.clone()) },
                ChatMessage { role: "user".to_string(), content: Some(request.user.clone()) },
            ],
            max_tokens: Some(request.max_tokens),
            temperature: Some(request.temperature),
        };

        let response = self
            .client
            .post(self.completions_url())
            .header("api-key", &self.api_key) // Azure uses api-key header, not Bearer
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(AIError::Api { status, message });
        }

        let response: AzureOpenAIResponse = response.json().await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AIError::EmptyResponse)
    }

    fn name(&self) -> &str {
        "azure"
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct AzureOpenAIRequest {
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AzureOpenAIResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}
