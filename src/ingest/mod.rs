//! Content ingestion.
//!
//! Normalizes uploaded files, pasted text, or imported work items into the
//! single [`SourceContent`] blob a pipeline run works from.

mod files;
mod source;

pub use files::{expand_paths, Capability, FileData, FileInput, FileKind};
pub use source::{SourceContent, ADDITIONAL_CONTEXT_HEADER};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::integrations::devops::WorkItem;

/// Separator placed between serialized work items.
pub const WORK_ITEM_SEPARATOR: &str = "\n\n---\n\n";

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static BLOCK_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<\s*(br|/p|/div|/li|/h[1-6]|/tr)\s*/?>").unwrap());
static BLANK_LINES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n[ \t]*(\n[ \t]*)+").unwrap());

/// Ingestion errors. Per-file problems never surface here; they become stubs.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("No source content provided")]
    Empty,
}

/// Build source content from uploaded files.
///
/// Each file is framed as `=== name ===` so prompts can tell sources apart.
pub fn ingest_files(files: &[FileInput]) -> Result<SourceContent, IngestError> {
    if files.is_empty() {
        return Err(IngestError::Empty);
    }

    let sections: Vec<String> =
        files.iter().map(|file| format!("=== {} ===\n{}", file.name, file.extract())).collect();

    tracing::debug!(files = files.len(), "Ingested files");
    Ok(SourceContent::new(sections.join("\n\n")))
}

/// Build source content from pasted text.
pub fn ingest_text(text: &str) -> Result<SourceContent, IngestError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(IngestError::Empty);
    }
    Ok(SourceContent::new(text))
}

/// Build source content from files or text. Files win when both are given.
pub fn ingest_input(files: &[FileInput], text: Option<&str>) -> Result<SourceContent, IngestError> {
    if !files.is_empty() {
        return ingest_files(files);
    }
    ingest_text(text.unwrap_or_default())
}

/// Build source content from imported work items.
pub fn ingest_work_items(items: &[WorkItem]) -> Result<SourceContent, IngestError> {
    if items.is_empty() {
        return Err(IngestError::Empty);
    }

    let blocks: Vec<String> = items.iter().map(serialize_work_item).collect();
    Ok(SourceContent::new(blocks.join(WORK_ITEM_SEPARATOR)))
}

fn serialize_work_item(item: &WorkItem) -> String {
    let fields = &item.fields;
    let mut block = format!("Work Item #{}: {}", item.id, fields.title.trim());

    let mut meta = Vec::new();
    if let Some(kind) = &fields.work_item_type {
        meta.push(format!("Type: {kind}"));
    }
    if let Some(state) = &fields.state {
        meta.push(format!("State: {state}"));
    }
    if let Some(tags) = fields.tags.as_deref().filter(|t| !t.trim().is_empty()) {
        meta.push(format!("Tags: {tags}"));
    }
    if !meta.is_empty() {
        block.push('\n');
        block.push_str(&meta.join(" | "));
    }

    let description = fields.description.as_deref().map(strip_html).unwrap_or_default();
    if !description.is_empty() {
        block.push('\n');
        block.push_str(&description);
    }

    block
}

/// Reduce an HTML fragment to plain text.
pub fn strip_html(html: &str) -> String {
    let with_breaks = BLOCK_TAG_RE.replace_all(html, "\n");
    let without_tags = TAG_RE.replace_all(&with_breaks, "");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    BLANK_LINES_RE.replace_all(decoded.trim(), "\n").to_string()
}
