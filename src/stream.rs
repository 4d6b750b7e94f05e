//! Streaming observation of a batch: queue snapshots as items change.
//!
//! A run takes as long as its slowest provider calls, one item after
//! another. Rather than polling [`BatchController::snapshot`], a UI can hold
//! a [`SnapshotStream`] and redraw whenever it yields. The stream is backed
//! by a `watch` channel, so a slow consumer skips intermediate snapshots and
//! always sees the latest one; it never buffers the history of a run.

use crate::controller::{BatchController, QueueSnapshot};
use crate::model::QueueStats;
use futures::StreamExt;
use std::pin::Pin;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::Stream;

/// A boxed stream of queue snapshots.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = QueueSnapshot> + Send>>;

/// A boxed stream of queue counts.
pub type StatsStream = Pin<Box<dyn Stream<Item = QueueStats> + Send>>;

impl BatchController {
    /// Stream of queue snapshots.
    ///
    /// Yields the current snapshot immediately, then a new one after every
    /// enqueue, removal, clear, and item transition. The stream ends when
    /// the controller is dropped.
    ///
    /// # Example
    /// ```rust,no_run
    /// use futures::StreamExt;
    /// use notes2anki::{BatchConfig, BatchController};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let controller = BatchController::from_config(&BatchConfig::default())?;
    /// let mut snapshots = controller.snapshot_stream();
    /// while let Some(items) = snapshots.next().await {
    ///     println!("{} item(s) queued", items.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn snapshot_stream(&self) -> SnapshotStream {
        WatchStream::new(self.subscribe()).boxed()
    }

    /// Like [`snapshot_stream`](Self::snapshot_stream), reduced to counts.
    pub fn stats_stream(&self) -> StatsStream {
        self.snapshot_stream()
            .map(|items| QueueStats::from_items(items.iter()))
            .boxed()
    }
}
