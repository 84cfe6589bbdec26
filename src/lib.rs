//! # edgequake-pdfclassify
//!
//! Give scanned PDF documents meaningful, sortable file names.
//!
//! Scanners name their output `scan_0042.pdf`. This crate renders every page,
//! runs tesseract over it, asks an LLM for the document date, type, sender
//! and number, keeps the page the model was most confident about, and turns
//! the result into a name such as
//! `2023-10-27_rechnung_ACME-GmbH_4711_unknown_.pdf`.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF folder
//!  │
//!  ├─ 1. Cache      reuse <pdf>-feature.csv when newer than the PDF
//!  ├─ 2. Workspace  work.d/<pdf>/, wiped when the PDF changed
//!  ├─ 3. Render     rasterise pages via pdfium (spawn_blocking)
//!  ├─ 4. OCR        page_<n>.png → page_<n>.tsv via tesseract
//!  ├─ 5. Extract    one throttled LLM call per page
//!  ├─ 6. Select     candidate with the highest mean quality
//!  └─ 7. Output     feature files, results.csv, canonical names
//! ```
//!
//! Every stage is cached on file timestamps, so re-running over a folder
//! only touches what changed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfclassify::{Classifier, ClassifyConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ClassifyConfig::builder().output_dir("out").build()?;
//!     let classifier = Classifier::new(config)?;
//!     let output = classifier.classify_folder(Path::new("scans")).await?;
//!     for c in &output.classifications {
//!         println!("{} -> {:?}", c.source.display(), c.target_name());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfclassify` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! ## External tools
//!
//! * **pdfium**: loaded from the working directory or the system library path.
//! * **tesseract**: must be on `PATH` with the configured language data installed.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod classify;
pub mod config;
pub mod dates;
pub mod error;
pub mod features;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod record;
pub mod sanitize;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use classify::{classify_records, find_pdfs, resolve_provider, Classifier};
pub use config::{ClassifyConfig, ClassifyConfigBuilder, DEFAULT_MODEL};
pub use dates::{is_date_string, sortable_date};
pub use error::{ClassifyError, CollaboratorError, StageError};
pub use features::{DocumentFeatures, ExtractionCandidate, Feature, FeatureKey};
pub use output::{
    apply_file_action, Classification, ClassificationOutput, ClassifyStats, DocumentReport,
    FileAction,
};
pub use pipeline::llm::{FeatureExtractor, LlmFeatureExtractor};
pub use pipeline::ocr::{OcrEngine, OcrTable, TesseractOcr};
pub use pipeline::render::{PageRenderer, PdfiumRenderer};
pub use progress::{ClassifyProgressCallback, NoopProgressCallback, ProgressCallback};
pub use record::{load_records, write_results, FileRecord, RecordSet};
pub use sanitize::FilenameSanitizer;
