//! Export utilities.
//!
//! Pure transforms from generated documents to downloadable bytes: a ZIP
//! bundle of selected documents, or one document as a single file.

use std::collections::{BTreeSet, HashSet};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::pipeline::GeneratedDoc;

/// Export error types.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("No documents selected for export")]
    NothingSelected,

    #[error("Document index {index} out of range ({len} documents)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Document index {0} selected more than once")]
    DuplicateIndex(usize),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single document ready to save.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

/// Make a label safe to use as a filename stem.
///
/// Keeps ASCII alphanumerics, `-` and `_`; anything else becomes `_` and
/// runs of `_` collapse to one.
pub fn sanitize_filename(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    for c in label.trim().chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let out = out.trim_matches('_');
    if out.is_empty() {
        "document".to_string()
    } else {
        out.to_string()
    }
}

/// Filename for a document: sanitized label plus the format's extension.
fn document_filename(doc: &GeneratedDoc) -> String {
    format!("{}.{}", sanitize_filename(&doc.label), doc.format.extension())
}

/// Give repeated names a `-2`, `-3`, ... suffix before the extension.
fn unique_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }

    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (name.clone(), String::new()),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}-{n}{ext}");
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Bundle the selected documents into a ZIP archive.
///
/// Entries are written in ascending index order with a fixed timestamp, so
/// the same documents and selection always give the same bytes.
pub fn build_archive(docs: &[GeneratedDoc], selected: &[usize]) -> Result<Vec<u8>, ExportError> {
    if selected.is_empty() {
        return Err(ExportError::NothingSelected);
    }

    let mut indices = BTreeSet::new();
    for &index in selected {
        if index >= docs.len() {
            return Err(ExportError::IndexOutOfRange { index, len: docs.len() });
        }
        if !indices.insert(index) {
            return Err(ExportError::DuplicateIndex(index));
        }
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let mut used = HashSet::new();

    for index in indices {
        let doc = &docs[index];
        let name = unique_name(document_filename(doc), &mut used);
        zip.start_file(name.as_str(), options)?;
        zip.write_all(doc.content.as_bytes())?;
        tracing::debug!(index, name = %name, "Added document to archive");
    }

    Ok(zip.finish()?.into_inner())
}

/// Prepare one document as a downloadable file.
pub fn single_file_download(doc: &GeneratedDoc) -> Download {
    Download {
        bytes: doc.content.as_bytes().to_vec(),
        filename: document_filename(doc),
        mime_type: mime_guess::from_ext(doc.format.extension())
            .first_raw()
            .unwrap_or(doc.format.mime_type())
            .to_string(),
    }
}

/// Write each document to `dir` as its own file. Returns the written paths.
pub fn write_documents(dir: &Path, docs: &[GeneratedDoc]) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;

    let mut used = HashSet::new();
    let mut written = Vec::with_capacity(docs.len());
    for doc in docs {
        let download = single_file_download(doc);
        let path = dir.join(unique_name(download.filename, &mut used));
        std::fs::write(&path, &download.bytes)?;
        written.push(path);
    }

    tracing::info!(count = written.len(), dir = %dir.display(), "Documents written");
    Ok(written)
}

/// Write the selected documents as a ZIP archive at `path`.
pub fn write_archive(
    path: &Path,
    docs: &[GeneratedDoc],
    selected: &[usize],
) -> Result<(), ExportError> {
    let bytes = build_archive(docs, selected)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    tracing::info!(path = %path.display(), entries = selected.len(), "Archive written");
    Ok(())
}
