//! Pipeline stages for PDF classification.
//!
//! Each submodule implements exactly one step. The external tools (pdfium,
//! tesseract, the LLM) sit behind the [`render::PageRenderer`],
//! [`ocr::OcrEngine`] and [`llm::FeatureExtractor`] traits so the stages can
//! be tested with in-process fakes.
//!
//! ## Data Flow
//!
//! ```text
//! workspace ──▶ render ──▶ ocr ──▶ llm ──▶ select
//! (staging)    (pdfium)  (tesseract) (LLM) (best page)
//! ```
//!
//! 1. [`workspace`]   per-document staging directory; drives render and OCR
//! 2. [`render`]      rasterise pages to PNG
//! 3. [`ocr`]         page image → tesseract TSV table
//! 4. [`llm`]         TSV text → four scored features; the only network stage
//! 5. [`select`]      pick the best page's candidate
//!
//! [`cache`] holds the staleness predicate every stage consults before
//! recomputing an artifact.

pub mod cache;
pub mod llm;
pub mod ocr;
pub mod render;
pub mod select;
pub mod workspace;
