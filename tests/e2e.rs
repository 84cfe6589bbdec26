//! End-to-end integration tests for edgequake-pdfclassify.
//!
//! These tests use real scanned PDFs in `./test_cases/`, the pdfium library,
//! the `tesseract` binary and live LLM API calls. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 LD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_render -- --nocapture

use edgequake_pdfclassify::{
    classify_records, load_records, Classifier, ClassifyConfig, OcrEngine, PageRenderer,
    PdfiumRenderer, TesseractOcr,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

/// Copy the sample scans into a scratch input folder.
fn scratch_input(src: &std::path::Path) -> (tempfile::TempDir, PathBuf) {
    let root = tempfile::tempdir().expect("tempdir");
    let pdf_in = root.path().join("scans");
    std::fs::create_dir_all(&pdf_in).unwrap();
    for entry in std::fs::read_dir(src).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("pdf")) {
            std::fs::copy(&path, pdf_in.join(path.file_name().unwrap())).unwrap();
        }
    }
    (root, pdf_in)
}

// ── Tool tests (no LLM) ──────────────────────────────────────────────────────

#[test]
fn test_render_sample_scan() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));
    let renderer = PdfiumRenderer::new(150, 2000);

    let count = renderer.page_count(&path).expect("pdfium should open the scan");
    assert!(count >= 1);

    let pages = renderer.render_pages(&path, &[0]).expect("page 1 renders");
    assert_eq!(pages.len(), 1);
    let (_, image) = &pages[0];
    assert!(image.width() > 100 && image.height() > 100);
}

#[test]
fn test_ocr_sample_scan() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("invoice.pdf"));
    let ocr = TesseractOcr::new("deu+eng", 200);
    if !ocr.is_available() {
        println!("SKIP — tesseract not installed");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let (_, image) = PdfiumRenderer::new(200, 3000)
        .render_pages(&path, &[0])
        .expect("page 1 renders")
        .remove(0);
    let png = dir.path().join("page_1.png");
    image.save(&png).unwrap();

    let table = ocr.recognize(&png).expect("tesseract should read the page");
    assert!(!table.is_empty());
    assert!(table.text().len() > 20, "OCR text suspiciously short");
    println!("{}", table.text());
}

// ── Classification tests (need LLM API) ──────────────────────────────────────

#[tokio::test]
async fn test_classify_sample_folder() {
    let src = e2e_skip_unless_ready!(test_cases_dir());
    let (root, pdf_in) = scratch_input(&src);
    let out = root.path().join("out");

    let config = ClassifyConfig::builder()
        .output_dir(&out)
        .ocr_language("deu+eng")
        .build()
        .expect("valid config");
    let classifier = Classifier::new(config).expect("provider configured");

    let output = classifier
        .classify_folder(&pdf_in)
        .await
        .expect("classification should succeed");

    assert!(output.stats.total_documents > 0, "no sample PDFs found");
    assert!(output.stats.classified > 0, "no document was classified");
    for c in &output.classifications {
        let name = c.target_name().expect("fresh records are complete");
        assert!(name.ends_with(".pdf"), "{name}");
        println!("{} -> {}", c.source.display(), name);
    }
    assert!(out.join("all-features.csv").is_file());
    assert!(pdf_in.join("results.csv").is_file());

    // Every classified document is cached now.
    let again = classifier.classify_folder(&pdf_in).await.unwrap();
    assert_eq!(again.stats.reused, output.stats.classified);
    if output.stats.skipped == 0 {
        assert_eq!(again.stats.extractor_calls, 0);
    }

    // And the results table alone reproduces the targets.
    let records = load_records(&pdf_in.join("results.csv")).unwrap();
    let reloaded = classify_records(&records, Some(&out), &classifier.config().sanitizer());
    assert_eq!(reloaded.len(), output.classifications.len());
}
