//! Per-document staging directory.
//!
//! Each PDF owns `<staging_root>/<pdf file name>/`, holding one `page_<n>.png`
//! image and one `page_<n>.tsv` OCR table per page. The directory is wiped
//! when the PDF is newer than it (or on `force`); otherwise its artifacts are
//! reused page by page.
//!
//! ```text
//! work.d/
//! └── 2023-04-scan.pdf/
//!     ├── page_1.png
//!     ├── page_1.tsv
//!     ├── page_2.png
//!     └── page_2.tsv
//! ```
//!
//! Every method here blocks on file IO or on the collaborator; the
//! classifier calls them from `spawn_blocking`.

use crate::error::{ClassifyError, StageError};
use crate::pipeline::cache::StageCache;
use crate::pipeline::ocr::{OcrEngine, OcrTable};
use crate::pipeline::render::PageRenderer;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

/// Artifacts a stage produced plus the non-fatal issues it hit.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub artifacts: Vec<T>,
    pub issues: Vec<StageError>,
}

impl<T> Default for StageOutput<T> {
    fn default() -> Self {
        Self {
            artifacts: Vec::new(),
            issues: Vec::new(),
        }
    }
}

/// A rendered page image. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub page: usize,
    pub path: PathBuf,
}

/// The OCR table of one page. `page` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    pub page: usize,
    pub table: OcrTable,
}

/// The staging directory of one document.
#[derive(Debug, Clone)]
pub struct DocumentWorkspace {
    document: PathBuf,
    dir: PathBuf,
    cache: StageCache,
}

impl DocumentWorkspace {
    /// Prepare the workspace of `document` under `staging_root`.
    ///
    /// A directory older than the document (or any directory when `force` is
    /// set) is deleted first. The directory exists afterwards.
    pub fn open(document: &Path, staging_root: &Path, force: bool) -> Result<Self, ClassifyError> {
        if !document.is_file() {
            return Err(ClassifyError::FileNotFound {
                path: document.to_path_buf(),
            });
        }
        // The full name keeps `a.pdf` and `a.PDF` apart.
        let file_name = document
            .file_name()
            .ok_or_else(|| ClassifyError::Internal(format!("no file name: {}", document.display())))?;
        let dir = staging_root.join(file_name);
        let cache = StageCache::new(force);

        if dir.exists() && cache.is_stale_against(&dir, document) {
            debug!("Discarding stale workspace {}", dir.display());
            std::fs::remove_dir_all(&dir).map_err(|e| ClassifyError::WorkspaceFailed {
                path: dir.clone(),
                source: e,
            })?;
        }
        std::fs::create_dir_all(&dir).map_err(|e| ClassifyError::WorkspaceFailed {
            path: dir.clone(),
            source: e,
        })?;

        Ok(Self {
            document: document.to_path_buf(),
            dir,
            cache,
        })
    }

    pub fn document(&self) -> &Path {
        &self.document
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn page_image_path(&self, page: usize) -> PathBuf {
        self.dir.join(format!("page_{page}.png"))
    }

    pub fn page_table_path(&self, page: usize) -> PathBuf {
        self.dir.join(format!("page_{page}.tsv"))
    }

    fn name(&self) -> String {
        self.document
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.document.display().to_string())
    }

    /// Make sure every page has an up-to-date image; render only the stale ones.
    ///
    /// A document-level render failure is logged and yields no pages.
    pub fn render_pages(&self, renderer: &dyn PageRenderer) -> StageOutput<PageImage> {
        let name = self.name();
        let render_failed = |detail: String| {
            error!("{name}: rendering failed: {detail}");
            StageOutput {
                artifacts: Vec::new(),
                issues: vec![StageError::RenderFailed {
                    document: name.clone(),
                    detail,
                }],
            }
        };

        let count = match renderer.page_count(&self.document) {
            Ok(n) => n,
            Err(e) => return render_failed(e.to_string()),
        };

        let stale: Vec<usize> = (0..count)
            .filter(|&i| {
                self.cache
                    .is_stale_against(&self.page_image_path(i + 1), &self.document)
            })
            .collect();
        debug!("{name}: {count} pages, {} to render", stale.len());

        let mut issues = Vec::new();
        if !stale.is_empty() {
            let images = match renderer.render_pages(&self.document, &stale) {
                Ok(images) => images,
                Err(e) => return render_failed(e.to_string()),
            };
            for (idx, image) in images {
                let path = self.page_image_path(idx + 1);
                if let Err(e) = image.save_with_format(&path, ImageFormat::Png) {
                    warn!("{name}: could not save {}: {e}", path.display());
                    issues.push(StageError::RenderFailed {
                        document: name.clone(),
                        detail: format!("page {}: {e}", idx + 1),
                    });
                }
            }
        }

        let artifacts = (1..=count)
            .map(|page| PageImage {
                page,
                path: self.page_image_path(page),
            })
            .filter(|p| p.path.is_file())
            .collect();
        StageOutput { artifacts, issues }
    }

    /// OCR every page image, reusing tables that are newer than their image.
    ///
    /// Per-page failures are logged and the page is skipped.
    pub fn extract_page_text(&self, pages: &[PageImage], ocr: &dyn OcrEngine) -> StageOutput<PageText> {
        let name = self.name();
        let mut out = StageOutput::default();
        if pages.is_empty() {
            warn!("{name}: no page images to OCR");
            return out;
        }

        for image in pages {
            let table_path = self.page_table_path(image.page);
            if !self.cache.is_stale_against(&table_path, &image.path) {
                match OcrTable::read(&table_path) {
                    Ok(table) => {
                        debug!("{name}: reusing {}", table_path.display());
                        out.artifacts.push(PageText {
                            page: image.page,
                            table,
                        });
                        continue;
                    }
                    Err(e) => debug!("{name}: unreadable {}: {e}", table_path.display()),
                }
            }

            match ocr.recognize(&image.path) {
                Ok(table) => {
                    if let Err(e) = table.write(&table_path) {
                        warn!("{name}: could not save {}: {e}", table_path.display());
                    }
                    out.artifacts.push(PageText {
                        page: image.page,
                        table,
                    });
                }
                Err(e) => {
                    warn!("{name} page {}: OCR failed: {e}", image.page);
                    out.issues.push(StageError::OcrFailed {
                        document: name.clone(),
                        page: image.page,
                        detail: e.to_string(),
                    });
                }
            }
        }
        out
    }

    /// Remove the workspace directory and everything in it.
    pub fn cleanup(self) -> Result<(), ClassifyError> {
        std::fs::remove_dir_all(&self.dir).map_err(|e| ClassifyError::WorkspaceFailed {
            path: self.dir.clone(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollaboratorError;
    use image::{DynamicImage, RgbImage};
    use std::fs::File;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    struct FakeRenderer {
        pages: usize,
        rendered: AtomicUsize,
        fail: bool,
    }

    impl FakeRenderer {
        fn new(pages: usize) -> Self {
            Self {
                pages,
                rendered: AtomicUsize::new(0),
                fail: false,
            }
        }
    }

    impl PageRenderer for FakeRenderer {
        fn page_count(&self, _pdf: &Path) -> Result<usize, CollaboratorError> {
            Ok(self.pages)
        }

        fn render_pages(
            &self,
            _pdf: &Path,
            indices: &[usize],
        ) -> Result<Vec<(usize, DynamicImage)>, CollaboratorError> {
            if self.fail {
                return Err(CollaboratorError::new("fake", "broken document"));
            }
            self.rendered.fetch_add(indices.len(), Ordering::SeqCst);
            Ok(indices
                .iter()
                .map(|&i| (i, DynamicImage::ImageRgb8(RgbImage::new(4, 4))))
                .collect())
        }
    }

    struct FakeOcr {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    impl OcrEngine for FakeOcr {
        fn recognize(&self, image: &Path) -> Result<OcrTable, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = image.file_name().unwrap().to_string_lossy().into_owned();
            if self.fail_on == Some(name.as_str()) {
                return Err(CollaboratorError::new("fake", "unreadable"));
            }
            Ok(OcrTable::from_text_lines(&[name]))
        }
    }

    fn pdf_in(dir: &Path, at: SystemTime) -> PathBuf {
        let pdf = dir.join("scan.pdf");
        let f = File::create(&pdf).unwrap();
        f.set_modified(at).unwrap();
        pdf
    }

    #[test]
    fn open_creates_directory_named_after_file() {
        let root = tempfile::tempdir().unwrap();
        let pdf = pdf_in(root.path(), SystemTime::now() - Duration::from_secs(60));
        let ws = DocumentWorkspace::open(&pdf, &root.path().join("work.d"), false).unwrap();
        assert!(ws.dir().is_dir());
        assert!(ws.dir().ends_with("work.d/scan.pdf"));
    }

    #[test]
    fn stage_output_default_needs_no_default_artifact() {
        let out: StageOutput<PageText> = StageOutput::default();
        assert!(out.artifacts.is_empty());
        assert!(out.issues.is_empty());
    }

    #[test]
    fn open_missing_document_fails() {
        let root = tempfile::tempdir().unwrap();
        let err = DocumentWorkspace::open(&root.path().join("nope.pdf"), root.path(), false).unwrap_err();
        assert!(matches!(err, ClassifyError::FileNotFound { .. }));
    }

    #[test]
    fn stale_workspace_is_wiped() {
        let root = tempfile::tempdir().unwrap();
        let staging = root.path().join("work.d");
        let pdf = pdf_in(root.path(), SystemTime::now() - Duration::from_secs(60));
        let ws = DocumentWorkspace::open(&pdf, &staging, false).unwrap();
        std::fs::write(ws.dir().join("leftover"), "x").unwrap();

        // Document edited after the workspace was made.
        File::options()
            .write(true)
            .open(&pdf)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(60))
            .unwrap();
        let ws = DocumentWorkspace::open(&pdf, &staging, false).unwrap();
        assert!(!ws.dir().join("leftover").exists());
    }

    #[test]
    fn render_skips_fresh_pages() {
        let root = tempfile::tempdir().unwrap();
        let pdf = pdf_in(root.path(), SystemTime::now() - Duration::from_secs(60));
        let ws = DocumentWorkspace::open(&pdf, &root.path().join("work.d"), false).unwrap();
        let renderer = FakeRenderer::new(3);

        let first = ws.render_pages(&renderer);
        assert_eq!(first.artifacts.len(), 3);
        assert_eq!(first.artifacts[2].path, ws.page_image_path(3));
        assert_eq!(renderer.rendered.load(Ordering::SeqCst), 3);

        std::fs::remove_file(ws.page_image_path(2)).unwrap();
        let second = ws.render_pages(&renderer);
        assert_eq!(second.artifacts.len(), 3);
        assert_eq!(renderer.rendered.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn render_failure_yields_no_pages() {
        let root = tempfile::tempdir().unwrap();
        let pdf = pdf_in(root.path(), SystemTime::now() - Duration::from_secs(60));
        let ws = DocumentWorkspace::open(&pdf, &root.path().join("work.d"), false).unwrap();
        let renderer = FakeRenderer {
            fail: true,
            ..FakeRenderer::new(2)
        };

        let out = ws.render_pages(&renderer);
        assert!(out.artifacts.is_empty());
        assert!(matches!(out.issues[0], StageError::RenderFailed { .. }));
    }

    #[test]
    fn ocr_reuses_fresh_tables_and_skips_failed_pages() {
        let root = tempfile::tempdir().unwrap();
        let pdf = pdf_in(root.path(), SystemTime::now() - Duration::from_secs(60));
        let ws = DocumentWorkspace::open(&pdf, &root.path().join("work.d"), false).unwrap();
        let pages = ws.render_pages(&FakeRenderer::new(2)).artifacts;

        let ocr = FakeOcr {
            calls: AtomicUsize::new(0),
            fail_on: Some("page_2.png"),
        };
        let out = ws.extract_page_text(&pages, &ocr);
        assert_eq!(out.artifacts.len(), 1);
        assert_eq!(out.artifacts[0].table.text(), "page_1.png");
        assert!(matches!(out.issues[0], StageError::OcrFailed { page: 2, .. }));
        assert!(ws.page_table_path(1).is_file());

        let again = ws.extract_page_text(&pages, &ocr);
        assert_eq!(again.artifacts.len(), 1);
        // page 1 reused, page 2 retried
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn ocr_without_images_is_a_no_op() {
        let root = tempfile::tempdir().unwrap();
        let pdf = pdf_in(root.path(), SystemTime::now());
        let ws = DocumentWorkspace::open(&pdf, &root.path().join("work.d"), false).unwrap();
        let ocr = FakeOcr {
            calls: AtomicUsize::new(0),
            fail_on: None,
        };
        let out = ws.extract_page_text(&[], &ocr);
        assert!(out.artifacts.is_empty() && out.issues.is_empty());
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn cleanup_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let pdf = pdf_in(root.path(), SystemTime::now());
        let ws = DocumentWorkspace::open(&pdf, &root.path().join("work.d"), false).unwrap();
        let dir = ws.dir().to_path_buf();
        ws.cleanup().unwrap();
        assert!(!dir.exists());
    }
}
