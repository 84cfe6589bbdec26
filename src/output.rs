//! Batch results and the file actions applied to them.

use crate::error::{ClassifyError, StageError};
use crate::features::DocumentFeatures;
use crate::record::FileRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The classification of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// The source PDF.
    pub source: PathBuf,
    /// The sanitized record.
    pub record: FileRecord,
    /// Canonical destination; `None` when the record is incomplete.
    pub target: Option<PathBuf>,
}

impl Classification {
    /// The destination's file name, if any.
    pub fn target_name(&self) -> Option<String> {
        self.target
            .as_ref()
            .and_then(|t| t.file_name())
            .map(|n| n.to_string_lossy().into_owned())
    }
}

/// What happened to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub source: PathBuf,
    /// The selected features; `None` when no page produced a candidate.
    pub features: Option<DocumentFeatures>,
    pub classification: Option<Classification>,
    /// True when a fresh feature file was reused instead of extracting.
    pub reused: bool,
    /// Extraction calls made for this document.
    pub extractor_calls: usize,
    pub issues: Vec<StageError>,
}

impl DocumentReport {
    /// A document that could not be processed at all.
    pub fn failure(source: &Path, issue: StageError) -> Self {
        Self {
            source: source.to_path_buf(),
            features: None,
            classification: None,
            reused: false,
            extractor_calls: 0,
            issues: vec![issue],
        }
    }

    pub fn is_failed(&self) -> bool {
        self.issues
            .iter()
            .any(|e| matches!(e, StageError::DocumentFailed { .. }))
    }
}

/// Counters for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifyStats {
    /// PDFs found in the input folder.
    pub total_documents: usize,
    /// Documents that produced a record.
    pub classified: usize,
    /// Documents whose feature file was reused.
    pub reused: usize,
    /// Documents sent through render, OCR and extraction.
    pub extracted: usize,
    /// Documents that produced no record.
    pub skipped: usize,
    /// Extraction calls made across the batch.
    pub extractor_calls: usize,
    pub duration_ms: u64,
}

/// Everything a batch produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationOutput {
    /// One entry per classified document, in input order.
    pub classifications: Vec<Classification>,
    /// Non-fatal problems met along the way.
    pub issues: Vec<StageError>,
    pub stats: ClassifyStats,
}

impl ClassificationOutput {
    pub fn records(&self) -> impl Iterator<Item = &FileRecord> {
        self.classifications.iter().map(|c| &c.record)
    }

    /// The classification of `source`, if it produced one.
    pub fn get(&self, source: &Path) -> Option<&Classification> {
        self.classifications.iter().find(|c| c.source == source)
    }
}

/// What to do with a classified document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileAction {
    /// Leave the source where it is. (default)
    #[default]
    None,
    /// Move the source to its target.
    Move,
    /// Copy the source to its target.
    Copy,
}

impl fmt::Display for FileAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileAction::None => "keep",
            FileAction::Move => "move",
            FileAction::Copy => "copy",
        })
    }
}

/// Apply `action` to one classification.
///
/// Returns the destination that was (or, with `dry_run`, would have been)
/// written. `Ok(None)` when there is nothing to do: no target, or
/// [`FileAction::None`]. Missing parent directories are created. A move
/// across filesystems falls back to copy and remove.
pub fn apply_file_action(
    classification: &Classification,
    action: FileAction,
    dry_run: bool,
) -> Result<Option<PathBuf>, ClassifyError> {
    let Some(target) = classification.target.as_ref() else {
        return Ok(None);
    };
    if action == FileAction::None {
        return Ok(None);
    }
    let source = &classification.source;

    if dry_run {
        info!("dry run: {action} {} -> {}", source.display(), target.display());
        return Ok(Some(target.clone()));
    }

    let failed = |e: std::io::Error| ClassifyError::FileActionFailed {
        action: if action == FileAction::Move { "move" } else { "copy" },
        from: source.clone(),
        to: target.clone(),
        source: e,
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(failed)?;
    }

    match action {
        FileAction::Copy => {
            std::fs::copy(source, target).map_err(failed)?;
        }
        FileAction::Move => {
            if let Err(e) = std::fs::rename(source, target) {
                debug!("rename failed ({e}), copying instead");
                std::fs::copy(source, target).map_err(failed)?;
                std::fs::remove_file(source).map_err(failed)?;
            }
        }
        FileAction::None => {}
    }
    info!("{action} {} -> {}", source.display(), target.display());
    Ok(Some(target.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification(dir: &Path, target: Option<&str>) -> Classification {
        let source = dir.join("scan.pdf");
        std::fs::write(&source, b"%PDF-1.4").unwrap();
        let fields = ["2023-01-01", "rechnung", "ACME", "1", "", "", "pdf"].map(|v| Some(v.to_string()));
        Classification {
            record: FileRecord::from_fields(source.to_string_lossy(), fields),
            source,
            target: target.map(|t| dir.join(t)),
        }
    }

    #[test]
    fn copy_keeps_source() {
        let dir = tempfile::tempdir().unwrap();
        let c = classification(dir.path(), Some("sorted/a.pdf"));
        let dest = apply_file_action(&c, FileAction::Copy, false).unwrap().unwrap();
        assert!(dest.is_file());
        assert!(c.source.is_file());
    }

    #[test]
    fn move_removes_source() {
        let dir = tempfile::tempdir().unwrap();
        let c = classification(dir.path(), Some("a.pdf"));
        let dest = apply_file_action(&c, FileAction::Move, false).unwrap().unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4");
        assert!(!c.source.exists());
    }

    #[test]
    fn dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let c = classification(dir.path(), Some("a.pdf"));
        let dest = apply_file_action(&c, FileAction::Move, true).unwrap().unwrap();
        assert!(!dest.exists());
        assert!(c.source.exists());
    }

    #[test]
    fn nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let no_target = classification(dir.path(), None);
        assert_eq!(apply_file_action(&no_target, FileAction::Copy, false).unwrap(), None);
        let keep = classification(dir.path(), Some("a.pdf"));
        assert_eq!(apply_file_action(&keep, FileAction::None, false).unwrap(), None);
    }

    #[test]
    fn missing_source_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let c = classification(dir.path(), Some("a.pdf"));
        std::fs::remove_file(&c.source).unwrap();
        let err = apply_file_action(&c, FileAction::Copy, false).unwrap_err();
        assert!(matches!(err, ClassifyError::FileActionFailed { action: "copy", .. }));
    }

    #[test]
    fn target_name() {
        let dir = tempfile::tempdir().unwrap();
        let c = classification(dir.path(), Some("x/b.pdf"));
        assert_eq!(c.target_name().as_deref(), Some("b.pdf"));
    }
}
