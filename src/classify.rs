//! Batch classification entry points.
//!
//! [`Classifier`] drives one document through
//!
//! ```text
//! feature file fresh? ──yes──▶ reuse stored candidate
//!        │ no
//!        ▼
//! workspace ─▶ render ─▶ OCR ─▶ extract (per page) ─▶ select ─▶ feature file
//! ```
//!
//! and [`Classifier::classify_folder`] does so for every PDF in a folder,
//! then writes the aggregate feature file and the results table.

use crate::config::{ClassifyConfig, DEFAULT_MODEL};
use crate::error::{ClassifyError, CollaboratorError, StageError};
use crate::features::{read_feature_file, write_feature_file, DocumentFeatures};
use crate::output::{Classification, ClassificationOutput, DocumentReport};
use crate::pipeline::cache::StageCache;
use crate::pipeline::llm::{FeatureExtractor, LlmFeatureExtractor};
use crate::pipeline::ocr::{OcrEngine, TesseractOcr};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::select::select_best;
use crate::pipeline::workspace::{DocumentWorkspace, PageText, StageOutput};
use crate::record::{write_results, FileRecord, RecordSet};
use crate::sanitize::FilenameSanitizer;
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Classifies PDF documents.
///
/// Holds the three collaborators and the gate that keeps extractor calls
/// one at a time, even when several documents are in flight.
pub struct Classifier {
    config: ClassifyConfig,
    renderer: Arc<dyn PageRenderer>,
    ocr: Arc<dyn OcrEngine>,
    extractor: Arc<dyn FeatureExtractor>,
    gate: Mutex<()>,
}

impl Classifier {
    /// A classifier using pdfium, tesseract and the configured LLM provider.
    ///
    /// # Errors
    /// [`ClassifyError::ProviderNotConfigured`] when no provider can be
    /// resolved.
    pub fn new(config: ClassifyConfig) -> Result<Self, ClassifyError> {
        let provider = resolve_provider(&config)?;
        let renderer = Arc::new(PdfiumRenderer::new(config.dpi, config.max_rendered_pixels));
        let ocr = Arc::new(TesseractOcr::new(config.ocr_language.clone(), config.dpi));
        let extractor = Arc::new(LlmFeatureExtractor::from_config(provider, &config));
        Ok(Self::with_collaborators(config, renderer, ocr, extractor))
    }

    /// A classifier with caller-supplied collaborators.
    pub fn with_collaborators(
        config: ClassifyConfig,
        renderer: Arc<dyn PageRenderer>,
        ocr: Arc<dyn OcrEngine>,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        Self {
            config,
            renderer,
            ocr,
            extractor,
            gate: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ClassifyConfig {
        &self.config
    }

    /// Classify one document.
    ///
    /// Page- and document-level failures end up in
    /// [`DocumentReport::issues`]; only problems with the staging area or
    /// the output directory are returned as errors.
    pub async fn classify_document(&self, pdf: &Path) -> Result<DocumentReport, ClassifyError> {
        if !pdf.is_file() {
            return Err(ClassifyError::FileNotFound {
                path: pdf.to_path_buf(),
            });
        }
        let name = document_name(pdf);
        let source = std::path::absolute(pdf).map_err(|e| ClassifyError::ReadFailed {
            path: pdf.to_path_buf(),
            source: e,
        })?;
        let feature_path = self.config.feature_file_path(&name);
        let cache = StageCache::new(self.config.force);

        let mut report = DocumentReport {
            source: pdf.to_path_buf(),
            features: None,
            classification: None,
            reused: false,
            extractor_calls: 0,
            issues: Vec::new(),
        };

        if !cache.is_stale_against(&feature_path, pdf) {
            if let Some(features) = reuse_feature_file(&feature_path, &source) {
                info!("{name}: using existing features from {}", feature_path.display());
                report.reused = true;
                report.classification = Some(self.classification_for(pdf, &features));
                report.features = Some(features);
                return Ok(report);
            }
        }

        info!("{name}: extracting features");
        let staged = self.stage_pages(pdf).await?;
        report.issues.extend(staged.issues);

        let mut candidates = Vec::with_capacity(staged.artifacts.len());
        for page in &staged.artifacts {
            let result = {
                let _gate = self.gate.lock().await;
                report.extractor_calls += 1;
                AssertUnwindSafe(self.extractor.extract(&page.table))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(CollaboratorError::new("extractor", panic_message(&*panic)))
                    })
            };
            match result {
                Ok(candidate) if candidate.is_empty() => {
                    debug!("{name} page {}: no features", page.page);
                }
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    warn!("{name} page {}: feature extraction failed: {e}", page.page);
                    report.issues.push(StageError::ExtractionFailed {
                        document: name.clone(),
                        page: page.page,
                        detail: e.to_string(),
                    });
                }
            }
        }

        let Some(best) = select_best(&candidates) else {
            warn!("{name}: no extraction candidates");
            report.issues.push(StageError::NoCandidates { document: name });
            return Ok(report);
        };
        let features = DocumentFeatures::new(source, best.clone());

        if self.config.write_features {
            info!("{name}: writing features to {}", feature_path.display());
            ensure_parent(&feature_path)?;
            write_feature_file(&feature_path, std::slice::from_ref(&features))?;
        }

        report.classification = Some(self.classification_for(pdf, &features));
        report.features = Some(features);
        Ok(report)
    }

    /// Classify every PDF in `pdf_in`.
    ///
    /// Documents are processed in name order, at most
    /// [`ClassifyConfig::concurrency`] at a time. A document that fails
    /// outright is reported as [`StageError::DocumentFailed`] and skipped.
    /// Afterwards the aggregate feature file is refreshed (if anything was
    /// re-extracted, it is missing, or `force` is set) and the results table
    /// is written.
    ///
    /// # Errors
    /// Only an unreadable input folder or an unwritable output directory,
    /// aggregate feature file or results table fail the batch.
    pub async fn classify_folder(&self, pdf_in: &Path) -> Result<ClassificationOutput, ClassifyError> {
        let start = Instant::now();
        let pdfs = find_pdfs(pdf_in)?;
        let total = pdfs.len();
        info!("Found {} PDFs in {}", total, pdf_in.display());

        for dir in [self.config.output_dir.clone(), self.config.staging_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| ClassifyError::WorkspaceFailed { path: dir, source: e })?;
        }

        let cb = self.config.progress_callback.clone();
        if let Some(ref cb) = cb {
            cb.on_batch_start(total);
        }

        let results: Vec<DocumentReport> =
            stream::iter(pdfs.iter().enumerate().map(|(index, pdf)| {
                let cb = cb.clone();
                async move {
                    let name = document_name(pdf);
                    if let Some(ref cb) = cb {
                        cb.on_document_start(index, total, &name);
                    }
                    let report = match self.classify_document(pdf).await {
                        Ok(report) => report,
                        Err(e) => {
                            error!("{name}: {e}");
                            DocumentReport::failure(pdf, StageError::DocumentFailed {
                                document: name.clone(),
                                detail: e.to_string(),
                            })
                        }
                    };
                    if let Some(ref cb) = cb {
                        match &report.features {
                            Some(_) => cb.on_document_complete(index, total, &name, report.reused),
                            None => {
                                let reason = report
                                    .issues
                                    .first()
                                    .map(|e| e.to_string())
                                    .unwrap_or_else(|| "no features".to_string());
                                cb.on_document_skipped(index, total, &name, &reason);
                            }
                        }
                    }
                    report
                }
            }))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut output = ClassificationOutput::default();
        let mut documents = Vec::new();
        let mut features_changed = false;
        for report in results {
            output.stats.extractor_calls += report.extractor_calls;
            if report.reused {
                output.stats.reused += 1;
            } else if !report.is_failed() {
                output.stats.extracted += 1;
                features_changed = true;
            }
            output.issues.extend(report.issues);
            match (report.features, report.classification) {
                (Some(features), Some(classification)) => {
                    documents.push(features);
                    output.classifications.push(classification);
                }
                _ => output.stats.skipped += 1,
            }
        }

        if self.config.write_features {
            let all_path = self.config.all_features_path();
            if self.config.force || features_changed || !all_path.exists() {
                info!("Writing features compilation to {}", all_path.display());
                write_feature_file(&all_path, &documents)?;
            } else {
                info!("Keeping existing features from {}", all_path.display());
            }
        }

        if self.config.write_results {
            let results_path = self.config.results_path(pdf_in);
            info!("Writing results to {}", results_path.display());
            write_results(&results_path, output.records())?;
        }

        output.stats.total_documents = total;
        output.stats.classified = output.classifications.len();
        output.stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Classification complete: {}/{} documents, {} reused, {}ms total",
            output.stats.classified, total, output.stats.reused, output.stats.duration_ms
        );

        if let Some(ref cb) = cb {
            cb.on_batch_complete(total, output.stats.classified);
        }
        Ok(output)
    }

    /// Render and OCR one document inside its workspace.
    async fn stage_pages(&self, pdf: &Path) -> Result<StageOutput<PageText>, ClassifyError> {
        let pdf = pdf.to_path_buf();
        let staging = self.config.staging_dir();
        let force = self.config.force;
        let renderer = Arc::clone(&self.renderer);
        let ocr = Arc::clone(&self.ocr);

        let name = document_name(&pdf);
        let staged = tokio::task::spawn_blocking(move || -> Result<StageOutput<PageText>, ClassifyError> {
            let workspace = DocumentWorkspace::open(&pdf, &staging, force)?;
            let rendered = workspace.render_pages(renderer.as_ref());
            let text = workspace.extract_page_text(&rendered.artifacts, ocr.as_ref());
            let mut issues = rendered.issues;
            issues.extend(text.issues);
            Ok(StageOutput {
                artifacts: text.artifacts,
                issues,
            })
        })
        .await;
        match staged {
            Ok(staged) => staged,
            Err(e) => {
                warn!("{name}: staging task failed: {e}");
                Ok(StageOutput {
                    artifacts: Vec::new(),
                    issues: vec![StageError::RenderFailed {
                        document: name,
                        detail: format!("staging task panicked: {e}"),
                    }],
                })
            }
        }
    }

    fn classification_for(&self, pdf: &Path, features: &DocumentFeatures) -> Classification {
        let sanitizer = self.config.sanitizer();
        let record = FileRecord::from_features(features).sanitized(&sanitizer);
        let target = record.target_path(Some(&self.config.output_dir), &sanitizer);
        Classification {
            source: pdf.to_path_buf(),
            record,
            target,
        }
    }
}

/// Classifications for reloaded records, without any extraction.
///
/// The source of each classification is the record's identity.
pub fn classify_records(
    records: &RecordSet,
    out_dir: Option<&Path>,
    sanitizer: &FilenameSanitizer,
) -> Vec<Classification> {
    records
        .records
        .values()
        .map(|record| {
            let record = record.sanitized(sanitizer);
            Classification {
                source: PathBuf::from(record.id()),
                target: record.target_path(out_dir, sanitizer),
                record,
            }
        })
        .collect()
}

/// All `*.pdf` files directly inside `dir`, sorted by name.
///
/// The extension match ignores case.
pub fn find_pdfs(dir: &Path) -> Result<Vec<PathBuf>, ClassifyError> {
    if !dir.exists() {
        return Err(ClassifyError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    if !dir.is_dir() {
        return Err(ClassifyError::NotADirectory {
            path: dir.to_path_buf(),
        });
    }
    let read_failed = |e: std::io::Error| ClassifyError::ReadFailed {
        path: dir.to_path_buf(),
        source: e,
    };

    let mut pdfs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_failed)? {
        let path = entry.map_err(read_failed)?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if is_pdf && path.is_file() {
            pdfs.push(path);
        }
    }
    pdfs.sort();
    Ok(pdfs)
}

/// The message carried by a caught panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

fn document_name(pdf: &Path) -> String {
    pdf.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.display().to_string())
}

/// Stored features for `source`, if the feature file holds any.
fn reuse_feature_file(path: &Path, source: &Path) -> Option<DocumentFeatures> {
    match read_feature_file(path) {
        Ok((documents, issues)) => {
            for issue in &issues {
                warn!("{issue}");
            }
            let stored = documents.into_iter().next()?;
            Some(DocumentFeatures::new(source, stored.candidate))
        }
        Err(e) => {
            debug!("Cannot reuse {}: {e}", path.display());
            None
        }
    }
}

fn ensure_parent(path: &Path) -> Result<(), ClassifyError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => std::fs::create_dir_all(parent).map_err(|e| ClassifyError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        }),
        None => Ok(()),
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, ClassifyError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ClassifyError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model` or
///    [`DEFAULT_MODEL`]; the factory reads the matching API key.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured only when both are set.
/// 4. **Gemini key** (`GEMINI_API_KEY` or `GOOGLE_API_KEY`) selects Gemini,
///    the provider the prompt is tuned for.
/// 5. **Full auto-detection** (`ProviderFactory::from_env`).
pub fn resolve_provider(config: &ClassifyConfig) -> Result<Arc<dyn LLMProvider>, ClassifyError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);

    if let Some(ref name) = config.provider_name {
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(env_model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !env_model.is_empty() {
            return create_provider(&prov, &env_model);
        }
    }

    let has_gemini_key = ["GEMINI_API_KEY", "GOOGLE_API_KEY"]
        .iter()
        .any(|var| std::env::var(var).is_ok_and(|v| !v.is_empty()));
    if has_gemini_key {
        return create_provider("gemini", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ClassifyError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
