//! Core types for Docforge.
//!
//! Configuration and the document type registry that every other module
//! is keyed on.

mod config;
mod doc_types;

pub use config::{AiConfig, AzureConfig, Config, DevOpsConfig, ExportConfig, GenerationConfig};
pub use doc_types::{DocFormat, DocTypeError, DocTypeProfile, DocTypeRegistry, DocumentTypeId};
