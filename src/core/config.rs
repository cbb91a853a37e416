//! Configuration management for Docforge.
//!
//! Handles loading and saving configuration from TOML files. Credentials
//! never live here; they are read from the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::doc_types::DocTypeRegistry;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text-generation service settings
    pub ai: AiConfig,

    /// Pipeline behaviour
    pub generation: GenerationConfig,

    /// Azure DevOps import settings
    pub devops: DevOpsConfig,

    /// Export settings
    pub export: ExportConfig,
}

/// Text-generation service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Provider to use (openai, azure)
    pub provider: String,

    /// Model name for OpenAI-compatible providers
    pub model: String,

    /// Base URL for OpenAI-compatible providers
    pub base_url: String,

    /// Azure OpenAI settings
    pub azure: AzureConfig,

    /// Per-call timeout in seconds (0 disables the timeout)
    pub timeout_secs: u64,
}

/// Azure OpenAI settings. Environment variables take precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// Resource endpoint (AZURE_OPENAI_ENDPOINT)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Deployment name (AZURE_OPENAI_DEPLOYMENT)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,

    /// REST API version
    pub api_version: String,
}

/// Pipeline behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Run the feature categorization pass before generating
    pub categorize: bool,

    /// Ask for clarifying questions before generating
    pub clarifying_questions: bool,

    /// Maximum number of clarifying questions to accept
    pub max_questions: usize,

    /// Replacement document type registry (TOML)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles_path: Option<PathBuf>,
}

/// Azure DevOps import settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevOpsConfig {
    /// Organization name (AZURE_DEVOPS_ORG takes precedence)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,

    /// Recency window applied when a search has no filters
    pub default_window_days: u32,

    /// Default result cap for searches
    pub max_results: u32,

    /// REST API version
    pub api_version: String,
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory generated documents are written to
    pub output_dir: PathBuf,

    /// Archive filename used when exporting a bundle
    pub archive_name: String,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Looks for config in:
    /// 1. `.docforge.toml` in current directory
    /// 2. `~/.config/docforge/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(".docforge.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::global_config_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Save configuration to the global config file.
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let config_path = Self::global_config_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        if let Some(dir) = config_path.parent() {
            std::fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(config_path)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("docforge"))
    }

    /// Get the global config file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("config.toml"))
    }

    /// Load the document type registry this configuration points at.
    pub fn registry(&self) -> anyhow::Result<DocTypeRegistry> {
        let registry = match &self.generation.profiles_path {
            Some(path) => DocTypeRegistry::load_from_file(path)?,
            None => DocTypeRegistry::builtin()?,
        };
        Ok(registry)
    }
}

impl AiConfig {
    /// Per-call timeout, if enabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ai: AiConfig::default(),
            generation: GenerationConfig::default(),
            devops: DevOpsConfig::default(),
            export: ExportConfig::default(),
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            azure: AzureConfig::default(),
            timeout_secs: 180,
        }
    }
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self { endpoint: None, deployment: None, api_version: "2024-02-01".to_string() }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { categorize: true, clarifying_questions: true, max_questions: 5, profiles_path: None }
    }
}

impl Default for DevOpsConfig {
    fn default() -> Self {
        Self {
            organization: None,
            default_window_days: 365,
            max_results: 200,
            api_version: "7.0".to_string(),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { output_dir: PathBuf::from("docs"), archive_name: "documents.zip".to_string() }
    }
}
