//! Document type registry.
//!
//! The set of document types is data, not code: each type is a record in a
//! TOML table carrying its display identity and the system prompt used to
//! generate it. The built-in table ships in `profiles/doc_types.toml`.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

const BUILTIN_PROFILES: &str = include_str!("../../profiles/doc_types.toml");

/// Identifier of a document type (e.g. `release-notes`).
///
/// Only meaningful when it names a record in a [`DocTypeRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentTypeId(String);

impl DocumentTypeId {
    /// Create an identifier from a raw string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentTypeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Output format of a generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocFormat {
    Html,
    Markdown,
    Text,
}

impl DocFormat {
    /// File extension (without the dot) used when exporting.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }

    /// MIME type used when exporting.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::Markdown => "text/markdown",
            Self::Text => "text/plain",
        }
    }
}

impl Default for DocFormat {
    fn default() -> Self {
        Self::Html
    }
}

/// One document type record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocTypeProfile {
    /// Identifier used on the command line and in results
    pub id: DocumentTypeId,

    /// Human readable label, also the base of export filenames
    pub label: String,

    /// Short description shown when listing types
    #[serde(default)]
    pub description: String,

    /// Display icon
    #[serde(default)]
    pub icon: String,

    /// Output format
    #[serde(default)]
    pub format: DocFormat,

    /// System instruction for generation calls of this type
    pub system_prompt: String,
}

/// Errors raised while loading or querying the registry.
#[derive(Debug, thiserror::Error)]
pub enum DocTypeError {
    #[error("Failed to read document type file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid document type file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Document type registry is empty")]
    Empty,

    #[error("Duplicate document type: {0}")]
    Duplicate(String),

    #[error("Document type {0} is missing a label or system prompt")]
    Incomplete(String),

    #[error("Unknown document type: {0}")]
    Unknown(String),
}

#[derive(Deserialize)]
struct RegistryFile {
    types: Vec<DocTypeProfile>,
}

/// Closed table of document types, in declaration order.
#[derive(Debug, Clone)]
pub struct DocTypeRegistry {
    types: Vec<DocTypeProfile>,
}

impl DocTypeRegistry {
    /// Load the built-in registry.
    pub fn builtin() -> Result<Self, DocTypeError> {
        Self::from_toml_str(BUILTIN_PROFILES)
    }

    /// Load a registry from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, DocTypeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a registry from TOML content.
    pub fn from_toml_str(content: &str) -> Result<Self, DocTypeError> {
        let file: RegistryFile = toml::from_str(content)?;
        Self::from_profiles(file.types)
    }

    /// Build a registry from profiles, validating uniqueness.
    pub fn from_profiles(types: Vec<DocTypeProfile>) -> Result<Self, DocTypeError> {
        if types.is_empty() {
            return Err(DocTypeError::Empty);
        }

        for (i, profile) in types.iter().enumerate() {
            if profile.label.trim().is_empty() || profile.system_prompt.trim().is_empty() {
                return Err(DocTypeError::Incomplete(profile.id.to_string()));
            }
            if types[..i].iter().any(|p| p.id == profile.id) {
                return Err(DocTypeError::Duplicate(profile.id.to_string()));
            }
        }

        Ok(Self { types })
    }

    /// Look up a profile.
    pub fn get(&self, id: &DocumentTypeId) -> Option<&DocTypeProfile> {
        self.types.iter().find(|p| &p.id == id)
    }

    /// Look up a profile, failing for unknown identifiers.
    pub fn require(&self, id: &DocumentTypeId) -> Result<&DocTypeProfile, DocTypeError> {
        self.get(id).ok_or_else(|| DocTypeError::Unknown(id.to_string()))
    }

    /// Parse a user-supplied identifier (case-insensitive).
    pub fn parse(&self, raw: &str) -> Result<DocumentTypeId, DocTypeError> {
        let wanted = raw.trim();
        self.types
            .iter()
            .find(|p| p.id.as_str().eq_ignore_ascii_case(wanted))
            .map(|p| p.id.clone())
            .ok_or_else(|| DocTypeError::Unknown(wanted.to_string()))
    }

    /// Check whether an identifier is registered.
    pub fn contains(&self, id: &DocumentTypeId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate over all profiles in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &DocTypeProfile> {
        self.types.iter()
    }

    /// All identifiers in declaration order.
    pub fn ids(&self) -> Vec<DocumentTypeId> {
        self.types.iter().map(|p| p.id.clone()).collect()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry has no types (never true for a loaded registry).
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
