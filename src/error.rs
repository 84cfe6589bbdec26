//! Error types for the edgequake-pdfclassify library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ClassifyError`]: **Fatal**. The batch cannot proceed at all (input
//!   folder missing, staging root not writable, provider not configured).
//!   Returned as `Err(ClassifyError)` from the top-level entry points.
//!
//! * [`StageError`]: **Non-fatal**. One document, page, or table row failed
//!   (render glitch, tesseract crash, malformed LLM answer) but everything
//!   else is fine. Logged where it happens and collected in
//!   [`crate::output::ClassificationOutput::issues`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfclassify library.
///
/// Document-, page- and row-level failures use [`StageError`] and never
/// propagate here.
#[derive(Debug, Error)]
pub enum ClassifyError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// A source document or record table was not found.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The PDF input folder is not a directory.
    #[error("Not a directory: '{path}'")]
    NotADirectory { path: PathBuf },

    /// Reading an input or cached artifact failed.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Staging errors ────────────────────────────────────────────────────
    /// The per-document staging directory could not be prepared.
    #[error("Failed to prepare workspace '{path}': {source}")]
    WorkspaceFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write a feature file or the results table.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Moving or copying a classified document failed.
    #[error("Failed to {action} '{from}' to '{to}': {source}")]
    FileActionFailed {
        action: &'static str,
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single document, page, or record.
///
/// The batch continues; the affected unit simply contributes nothing.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
pub enum StageError {
    /// The whole document could not be rasterised; it yields zero pages.
    #[error("{document}: rendering failed: {detail}")]
    RenderFailed { document: String, detail: String },

    /// OCR failed for one page image; the page is skipped.
    #[error("{document} page {page}: OCR failed: {detail}")]
    OcrFailed {
        document: String,
        page: usize,
        detail: String,
    },

    /// The feature extractor failed for one page; no candidate from it.
    #[error("{document} page {page}: feature extraction failed: {detail}")]
    ExtractionFailed {
        document: String,
        page: usize,
        detail: String,
    },

    /// The document could not be processed at all (workspace unusable,
    /// feature file unwritable, file vanished). The batch skips it.
    #[error("{document}: {detail}")]
    DocumentFailed { document: String, detail: String },

    /// No page of the document produced a candidate; no record is built.
    #[error("{document}: no extraction candidates")]
    NoCandidates { document: String },

    /// A record lacks one or more of the seven canonical fields.
    #[error("{id} is not complete (missing: {})", .missing.join(", "))]
    IncompleteRecord { id: String, missing: Vec<String> },

    /// A row of a record or feature table could not be interpreted.
    #[error("{source_file} line {line}: {detail}")]
    MalformedRow {
        source_file: String,
        line: usize,
        detail: String,
    },
}

/// A failure reported by an external collaborator (renderer, OCR engine,
/// feature extractor). The pipeline converts it into the matching
/// [`StageError`] once it knows which document and page were affected.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{collaborator}: {detail}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub detail: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, detail: impl Into<String>) -> Self {
        Self {
            collaborator,
            detail: detail.into(),
        }
    }
}

impl StageError {
    /// The document (or record identity) this issue belongs to, if any.
    pub fn subject(&self) -> Option<&str> {
        match self {
            StageError::RenderFailed { document, .. }
            | StageError::OcrFailed { document, .. }
            | StageError::ExtractionFailed { document, .. }
            | StageError::DocumentFailed { document, .. }
            | StageError::NoCandidates { document } => Some(document),
            StageError::IncompleteRecord { id, .. } => Some(id),
            StageError::MalformedRow { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_record_display_lists_fields() {
        let e = StageError::IncompleteRecord {
            id: "scan.pdf".into(),
            missing: vec!["receivername".into(), "extension".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("scan.pdf is not complete"), "got: {msg}");
        assert!(msg.contains("receivername, extension"), "got: {msg}");
    }

    #[test]
    fn ocr_failed_display() {
        let e = StageError::OcrFailed {
            document: "a.pdf".into(),
            page: 3,
            detail: "tesseract exited with 1".into(),
        };
        assert!(e.to_string().contains("page 3"));
        assert_eq!(e.subject(), Some("a.pdf"));
    }

    #[test]
    fn document_failed_names_document() {
        let e = StageError::DocumentFailed {
            document: "a.pdf".into(),
            detail: "Failed to prepare workspace 'work.d/a.pdf'".into(),
        };
        assert_eq!(e.subject(), Some("a.pdf"));
        assert!(e.to_string().starts_with("a.pdf: Failed to prepare"));
    }

    #[test]
    fn malformed_row_has_no_subject() {
        let e = StageError::MalformedRow {
            source_file: "results.csv".into(),
            line: 4,
            detail: "missing identity".into(),
        };
        assert_eq!(e.subject(), None);
        assert!(e.to_string().contains("line 4"));
    }

    #[test]
    fn provider_not_configured_display() {
        let e = ClassifyError::ProviderNotConfigured {
            provider: "gemini".into(),
            hint: "set GEMINI_API_KEY".into(),
        };
        assert!(e.to_string().contains("gemini"));
        assert!(e.to_string().contains("GEMINI_API_KEY"));
    }
}
