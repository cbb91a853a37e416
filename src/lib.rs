//! # Docforge
//!
//! Generate release notes, training guides, FAQs and more from source
//! material with a large language model.
//!
//! Docforge takes uploaded files, pasted notes or Azure DevOps work items,
//! normalizes them into one source text and drafts every requested document
//! type concurrently, keeping one failing document from affecting the rest.
//!
//! ## Features
//!
//! - **Ingestion**: text files, pasted notes and work items into one source
//! - **Analysis**: optional feature categorization and clarifying questions
//! - **Concurrent generation**: one call per document type, isolated failures
//! - **Review**: regenerate, edit, polish and generate more types in place
//! - **Export**: single files or a deterministic ZIP bundle
//!
//! ## Quick Start
//!
//! ```bash
//! # Install
//! cargo install docforge
//!
//! # Draft release notes and an FAQ from a text file
//! export OPENAI_API_KEY=...
//! docforge generate --file notes.txt --type release-notes --type faq
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::trivially_copy_pass_by_ref)]

pub mod ai;
pub mod core;
pub mod export;
pub mod ingest;
pub mod integrations;
pub mod pipeline;

pub use ai::{AIError, CallKind, Categorization, CompletionRequest, GenerationClient, TextGenerator};
#[cfg(feature = "ai")]
pub use ai::{build_provider, AzureOpenAIProvider, OpenAIProvider};

pub use export::{build_archive, sanitize_filename, single_file_download, Download, ExportError};

pub use ingest::{
    ingest_files, ingest_input, ingest_text, ingest_work_items, FileInput, FileKind, IngestError,
    SourceContent,
};

#[cfg(feature = "devops")]
pub use integrations::DevOpsClient;
pub use integrations::{DevOpsError, Project, SearchResults, WorkItem, WorkItemQuery};

pub use pipeline::{
    ClarifyingQuestion, DocStatus, GeneratedDoc, GenerationResult, Orchestrator, PhaseEvent,
    PipelineError, PipelineEvent, PipelinePhase, PipelineRun,
};

// Re-export commonly used types
pub use core::{Config, DocFormat, DocTypeProfile, DocTypeRegistry, DocumentTypeId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "docforge";
