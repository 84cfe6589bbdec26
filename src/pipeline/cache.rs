//! Staleness checks shared by every pipeline stage.
//!
//! Every cached artifact (workspace directory, page image, OCR table,
//! feature file) is recomputed only when it is provably older than the
//! input it was derived from, or when the caller forces a recompute. Keeping
//! the rule in one predicate is what makes an interrupted batch resumable:
//! re-running it redoes exactly the stages whose outputs are missing or old.

use std::io;
use std::path::Path;
use std::time::SystemTime;

/// True iff `artifact` is missing, `force` is set, or its mtime precedes
/// `source_mtime`. Pure apart from the metadata lookup.
pub fn is_stale(artifact: &Path, source_mtime: SystemTime, force: bool) -> bool {
    if force {
        return true;
    }
    match mtime(artifact) {
        Ok(artifact_mtime) => artifact_mtime < source_mtime,
        Err(_) => true,
    }
}

/// Modification time of `path`.
pub fn mtime(path: &Path) -> io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

/// The staleness predicate with the run's `force` flag bound.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageCache {
    force: bool,
}

impl StageCache {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    pub fn force(&self) -> bool {
        self.force
    }

    pub fn is_stale(&self, artifact: &Path, source_mtime: SystemTime) -> bool {
        is_stale(artifact, source_mtime, self.force)
    }

    /// Like [`Self::is_stale`], reading the source timestamp from `source`.
    /// An unreadable source makes every artifact stale.
    pub fn is_stale_against(&self, artifact: &Path, source: &Path) -> bool {
        match mtime(source) {
            Ok(source_mtime) => self.is_stale(artifact, source_mtime),
            Err(_) => true,
        }
    }
}
