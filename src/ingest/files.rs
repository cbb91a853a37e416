//! File classification and best-effort text extraction.
//!
//! Only plain text is decoded. Every other format degrades to a labelled
//! stub so a batch of uploads never fails as a whole.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Broad category of an input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    PlainText,
    Pdf,
    Word,
    Excel,
    Image,
    Other,
}

/// What the ingestor can do with a file kind.
#[derive(Debug, Clone, Copy)]
pub struct Capability {
    /// Whether text is extracted from the file
    pub extractable: bool,
    /// Message placed in the stub when it is not
    pub stub_message: &'static str,
}

const CAPABILITIES: &[(FileKind, Capability)] = &[
    (FileKind::PlainText, Capability { extractable: true, stub_message: "" }),
    (
        FileKind::Pdf,
        Capability {
            extractable: false,
            stub_message: "PDF text extraction is not supported. \
                           Please paste the document text directly.",
        },
    ),
    (
        FileKind::Word,
        Capability {
            extractable: false,
            stub_message: "Word document extraction is not supported. \
                           Please paste the document text directly.",
        },
    ),
    (
        FileKind::Excel,
        Capability {
            extractable: false,
            stub_message: "Spreadsheet extraction is not supported. \
                           Please export the sheet as CSV or paste the relevant rows.",
        },
    ),
    (
        FileKind::Image,
        Capability {
            extractable: false,
            stub_message: "Image text recognition is not supported. \
                           Please describe the image contents as text.",
        },
    ),
    (
        FileKind::Other,
        Capability {
            extractable: false,
            stub_message: "This file type is not supported. \
                           Please provide the content as plain text.",
        },
    ),
];

const TEXT_EXTENSIONS: &[&str] =
    &["txt", "md", "markdown", "csv", "json", "xml", "yaml", "yml", "log", "html", "htm", "rst"];

impl FileKind {
    /// Classify a file by declared MIME type, falling back to its extension.
    pub fn classify(name: &str, mime_type: Option<&str>) -> Self {
        if let Some(kind) = mime_type.and_then(Self::from_mime) {
            return kind;
        }

        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if TEXT_EXTENSIONS.contains(&extension.as_str()) {
            return Self::PlainText;
        }

        mime_guess::from_path(name)
            .first()
            .and_then(|mime| Self::from_mime(mime.essence_str()))
            .unwrap_or(Self::Other)
    }

    /// Map a MIME type to a kind. Unknown or generic types return `None`.
    fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();

        let kind = match mime.as_str() {
            "" | "application/octet-stream" => return None,
            "application/pdf" => Self::Pdf,
            "application/msword"
            | "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            | "application/rtf" => Self::Word,
            "application/vnd.ms-excel"
            | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => Self::Excel,
            "application/json" | "application/xml" | "application/x-yaml" => Self::PlainText,
            m if m.starts_with("text/") => Self::PlainText,
            m if m.starts_with("image/") => Self::Image,
            _ => return None,
        };

        Some(kind)
    }

    /// Capability record for this kind.
    pub fn capability(&self) -> Capability {
        CAPABILITIES
            .iter()
            .find(|(kind, _)| kind == self)
            .map(|(_, capability)| *capability)
            .unwrap_or(Capability { extractable: false, stub_message: "" })
    }

    /// Display label used in stubs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::PlainText => "Text",
            Self::Pdf => "PDF",
            Self::Word => "Word",
            Self::Excel => "Excel",
            Self::Image => "Image",
            Self::Other => "Unsupported",
        }
    }
}

/// File payload, or the reason it could not be read.
#[derive(Debug, Clone)]
pub enum FileData {
    Bytes(Vec<u8>),
    Unreadable(String),
}

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct FileInput {
    /// Filename shown in the content framing
    pub name: String,
    /// Declared MIME type, if any
    pub mime_type: Option<String>,
    /// File contents
    pub data: FileData,
}

impl FileInput {
    /// Create from in-memory bytes.
    pub fn new(name: impl Into<String>, mime_type: Option<String>, bytes: Vec<u8>) -> Self {
        Self { name: name.into(), mime_type, data: FileData::Bytes(bytes) }
    }

    /// Read a file from disk. Read failures are kept, not raised.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let data = match std::fs::read(path) {
            Ok(bytes) => FileData::Bytes(bytes),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read input file");
                FileData::Unreadable(e.to_string())
            }
        };

        Self { name, mime_type: None, data }
    }

    /// Classify this file.
    pub fn kind(&self) -> FileKind {
        FileKind::classify(&self.name, self.mime_type.as_deref())
    }

    /// Extract text, or produce the stub for this file.
    pub fn extract(&self) -> String {
        let bytes = match &self.data {
            FileData::Bytes(bytes) => bytes,
            FileData::Unreadable(reason) => {
                return format!("[Could not read {}: {}]", self.name, reason);
            }
        };

        let kind = self.kind();
        let capability = kind.capability();

        if capability.extractable {
            String::from_utf8_lossy(bytes).trim().to_string()
        } else {
            tracing::debug!(file = %self.name, kind = ?kind, "No extractor for file kind, using stub");
            format!("[{} file: {}]\n{}", kind.label(), self.name, capability.stub_message)
        }
    }
}

/// Expand directories into the files they contain, sorted for stable output.
pub fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|entry| entry.file_type().is_file())
                .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
                .map(|entry| entry.into_path())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(path.clone());
        }
    }

    files
}
