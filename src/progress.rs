//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the controller drives each queued image through the pipeline.
//! Callers that prefer whole-queue snapshots can subscribe to
//! [`crate::controller::BatchController::snapshot_stream`] instead; both are
//! fed after every item.
//!
//! # Example
//!
//! ```rust
//! use notes2anki::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_complete(&self, position: usize, total: usize, _front: &str) {
//!         let n = self.finished.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{position}/{total} done ({n} so far)");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//! let config = BatchConfig::builder()
//!     .progress_callback(cb as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::controller::RunSummary;
use crate::model::ItemId;
use std::sync::Arc;

/// Called by the batch controller as it processes each item.
///
/// Items are processed one at a time, so calls never overlap within a run.
/// All methods default to no-ops; implement only what you need.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before the first item is visited.
    ///
    /// # Arguments
    /// * `total` — queue length, including items already `done`
    fn on_run_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when an item enters `processing`.
    ///
    /// # Arguments
    /// * `position` — 1-based position in the queue
    /// * `total`    — queue length
    /// * `id`       — the item's id
    fn on_item_start(&self, position: usize, total: usize, id: ItemId) {
        let _ = (position, total, id);
    }

    /// Called when an item reaches `done`.
    ///
    /// # Arguments
    /// * `front` — the card's question side, handy for log lines
    fn on_item_complete(&self, position: usize, total: usize, front: &str) {
        let _ = (position, total, front);
    }

    /// Called when an item reaches `error`.
    fn on_item_error(&self, position: usize, total: usize, error: &str) {
        let _ = (position, total, error);
    }

    /// Called once after every item has been visited.
    fn on_run_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_run_start(5);
        cb.on_item_start(1, 5, ItemId::new());
        cb.on_item_complete(1, 5, "Q");
        cb.on_item_error(2, 5, "some error");
        cb.on_run_complete(&RunSummary::default());
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_run_start(10);
        cb.on_item_complete(1, 10, "front");
    }
}
