//! Progress-callback trait for per-document classification events.
//!
//! Inject an [`Arc<dyn ClassifyProgressCallback>`] via
//! [`crate::config::ClassifyConfigBuilder::progress_callback`] to receive
//! events as the batch moves from document to document.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfclassify::{ClassifyConfig, ClassifyProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     classified: AtomicUsize,
//! }
//!
//! impl ClassifyProgressCallback for CountingCallback {
//!     fn on_document_complete(&self, index: usize, total: usize, name: &str, reused: bool) {
//!         self.classified.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} {}", index + 1, total, name, if reused { "(cached)" } else { "" });
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { classified: AtomicUsize::new(0) });
//!
//! let config = ClassifyConfig::builder()
//!     .output_dir("/tmp/out")
//!     .progress_callback(counter as Arc<dyn ClassifyProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the classifier as it processes each document.
///
/// All methods have default no-op implementations. With `concurrency > 1`
/// the per-document methods may be called from several tasks at once.
pub trait ClassifyProgressCallback: Send + Sync {
    /// Called once before the first document.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when work on a document begins. `index` is 0-based.
    fn on_document_start(&self, index: usize, total: usize, name: &str) {
        let _ = (index, total, name);
    }

    /// Called when a document produced features.
    ///
    /// `reused` is true when a fresh feature file made extraction unnecessary.
    fn on_document_complete(&self, index: usize, total: usize, name: &str, reused: bool) {
        let _ = (index, total, name, reused);
    }

    /// Called when a document produced no features.
    fn on_document_skipped(&self, index: usize, total: usize, name: &str, reason: &str) {
        let _ = (index, total, name, reason);
    }

    /// Called once after every document has been attempted.
    fn on_batch_complete(&self, total: usize, classified: usize) {
        let _ = (total, classified);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl ClassifyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ClassifyConfig`].
pub type ProgressCallback = Arc<dyn ClassifyProgressCallback>;
