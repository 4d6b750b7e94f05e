//! Batch pipeline controller.
//!
//! [`BatchController`] owns the queue and the run state. A run visits every
//! item in queue order, one at a time, and drives each non-`done` item
//! through extraction and then synthesis. A stage failure is recorded on
//! that item and the run moves on; nothing a stage does can abort the batch.
//!
//! ## Observing a run
//!
//! The controller is shared by reference (`&self`), so callers can read
//! [`BatchController::snapshot`] or [`BatchController::stats`] while a run is
//! in flight. After every item transition a fresh immutable snapshot is also
//! published on a `tokio::sync::watch` channel ([`BatchController::subscribe`]).
//!
//! ## Re-entrancy
//!
//! A second `run` while one is in progress returns
//! [`RunOutcome::AlreadyRunning`] without touching the queue. There is no
//! cancellation: once started, a run visits the whole queue. Dropping the
//! run future releases the guard, and any item left in `processing` is picked
//! up again by the next run.

use crate::config::{BatchConfig, ModelSelection, SanitizePolicy};
use crate::error::{AnkiBatchError, StageError};
use crate::export;
use crate::model::{BatchRunState, Card, ImagePayload, ItemId, ItemStatus, Queue, QueueStats, QueuedItem, RunStep};
use crate::pipeline::extract::{Extractor, LlmExtractor};
use crate::pipeline::synthesize::{LlmSynthesizer, Synthesizer};
use crate::pipeline::Stage;
use crate::progress::ProgressCallback;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Immutable view of the queue at one point in time.
pub type QueueSnapshot = Arc<Vec<QueuedItem>>;

/// What one pass over the queue did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Items driven through the stages in this run.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items already `done` and left untouched.
    pub skipped: usize,
    pub duration_ms: u64,
    /// Queue counts after the run.
    pub stats: QueueStats,
}

/// Result of a [`BatchController::run`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every item was visited.
    Completed(RunSummary),
    /// Another run was in progress; nothing happened.
    AlreadyRunning,
    /// The queue was empty; nothing happened.
    Empty,
}

/// Owns the queue and drives it through the two pipeline stages.
pub struct BatchController {
    extractor: Arc<dyn Extractor>,
    synthesizer: Arc<dyn Synthesizer>,
    models: ModelSelection,
    stage_timeout: Option<Duration>,
    sanitize: SanitizePolicy,
    progress: Option<ProgressCallback>,
    queue: Mutex<Queue>,
    state: Mutex<BatchRunState>,
    running: AtomicBool,
    snapshots: watch::Sender<QueueSnapshot>,
}

impl BatchController {
    /// Create a controller around the given stage services.
    pub fn new(
        extractor: Arc<dyn Extractor>,
        synthesizer: Arc<dyn Synthesizer>,
        config: &BatchConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            extractor,
            synthesizer,
            models: config.models,
            stage_timeout: (config.stage_timeout_secs > 0)
                .then(|| Duration::from_secs(config.stage_timeout_secs)),
            sanitize: config.sanitize.clone(),
            progress: config.progress_callback.clone(),
            queue: Mutex::new(Queue::with_capacity(config.max_items)),
            state: Mutex::new(BatchRunState::idle()),
            running: AtomicBool::new(false),
            snapshots,
        }
    }

    /// Create a controller backed by `edgequake_llm` providers.
    ///
    /// Providers for the configured default models are created up front so
    /// a missing API key fails here rather than on every queued item.
    pub fn from_config(config: &BatchConfig) -> Result<Self, AnkiBatchError> {
        let extractor = LlmExtractor::from_config(config);
        extractor.providers().resolve(config.models.extraction)?;
        let synthesizer = LlmSynthesizer::from_config(config);
        synthesizer.providers().resolve(config.models.synthesis)?;
        Ok(Self::new(Arc::new(extractor), Arc::new(synthesizer), config))
    }

    // ── Queue management (between runs) ──────────────────────────────────

    /// Append items until the queue is full. Returns how many were accepted;
    /// the rest are dropped without error.
    pub fn enqueue(
        &self,
        items: impl IntoIterator<Item = QueuedItem>,
    ) -> Result<usize, AnkiBatchError> {
        let accepted = {
            let mut queue = self.lock_queue();
            if self.is_running() {
                return Err(AnkiBatchError::RunInProgress);
            }
            let accepted = queue.extend(items);
            debug!("Enqueued {} item(s); queue holds {}", accepted, queue.len());
            accepted
        };
        self.set_message(format!("Added {accepted} image(s)"));
        self.publish_snapshot();
        Ok(accepted)
    }

    /// Remove one item by id.
    pub fn remove(&self, id: ItemId) -> Result<Option<QueuedItem>, AnkiBatchError> {
        let removed = {
            let mut queue = self.lock_queue();
            if self.is_running() {
                return Err(AnkiBatchError::RunInProgress);
            }
            queue.remove(id)
        };
        self.publish_snapshot();
        Ok(removed)
    }

    /// Empty the queue and reset the run state to idle.
    pub fn clear(&self) -> Result<(), AnkiBatchError> {
        {
            let mut queue = self.lock_queue();
            if self.is_running() {
                return Err(AnkiBatchError::RunInProgress);
            }
            queue.clear();
        }
        *self.lock_state() = BatchRunState::idle();
        self.publish_snapshot();
        Ok(())
    }

    // ── Observation ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> QueueSnapshot {
        Arc::new(self.lock_queue().items().to_vec())
    }

    pub fn stats(&self) -> QueueStats {
        self.lock_queue().stats()
    }

    /// Free slots left in the queue.
    pub fn remaining_capacity(&self) -> usize {
        self.lock_queue().remaining()
    }

    pub fn run_state(&self) -> BatchRunState {
        self.lock_state().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Receive a new snapshot after every queue change.
    pub fn subscribe(&self) -> watch::Receiver<QueueSnapshot> {
        self.snapshots.subscribe()
    }

    // ── Running ──────────────────────────────────────────────────────────

    /// Run the pipeline with the configured models.
    pub async fn run(&self) -> RunOutcome {
        self.run_with(self.models).await
    }

    /// Run the pipeline over every item not yet `done`.
    ///
    /// Items in `error` (or left in `processing` by an abandoned run) are
    /// processed again, so calling `run` a second time retries failures
    /// while leaving finished cards untouched.
    pub async fn run_with(&self, models: ModelSelection) -> RunOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Run requested while another run is in progress; ignoring");
            return RunOutcome::AlreadyRunning;
        }
        let mut guard = RunGuard {
            controller: self,
            started: false,
            finished: false,
        };

        let total = self.lock_queue().len();
        if total == 0 {
            debug!("Run requested on an empty queue; ignoring");
            return RunOutcome::Empty;
        }

        let start = Instant::now();
        info!(
            "Starting batch run: {} item(s), {} → {}",
            total, models.extraction, models.synthesis
        );
        self.set_state(true, RunStep::Processing, "Starting batch pipeline…".into());
        guard.started = true;
        if let Some(ref cb) = self.progress {
            cb.on_run_start(total);
        }

        let mut summary = RunSummary::default();

        for index in 0..total {
            let position = index + 1;
            let Some((id, payload)) = self.begin_item(index) else {
                summary.skipped += 1;
                continue;
            };
            summary.attempted += 1;
            self.publish_snapshot();
            self.set_message(format!("Processing image {position}/{total}…"));
            if let Some(ref cb) = self.progress {
                cb.on_item_start(position, total, id);
            }

            match self.process_item(&payload, models).await {
                Ok(card) => {
                    debug!("Item #{}/{} done", position, total);
                    let front = card.front.clone();
                    self.finish_item(index, Ok(card));
                    summary.succeeded += 1;
                    if let Some(ref cb) = self.progress {
                        cb.on_item_complete(position, total, &front);
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("Item #{}/{} failed: {}", position, total, message);
                    self.finish_item(index, Err(message.clone()));
                    summary.failed += 1;
                    if let Some(ref cb) = self.progress {
                        cb.on_item_error(position, total, &message);
                    }
                }
            }
            self.publish_snapshot();
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        summary.stats = self.stats();
        guard.finished = true;
        self.set_state(
            false,
            RunStep::Completed,
            format!(
                "Batch complete: {} done, {} failed",
                summary.stats.done, summary.stats.error
            ),
        );
        info!(
            "Batch run complete: {} attempted, {} succeeded, {} failed, {} skipped in {}ms",
            summary.attempted, summary.succeeded, summary.failed, summary.skipped, summary.duration_ms
        );
        if let Some(ref cb) = self.progress {
            cb.on_run_complete(&summary);
        }

        RunOutcome::Completed(summary)
    }

    // ── Export ───────────────────────────────────────────────────────────

    /// Tab-separated export of every `done` card, in queue order.
    pub fn export(&self) -> String {
        export::export_cards(self.lock_queue().items(), &self.sanitize)
    }

    /// Write the export atomically to `path`. Returns the number of cards.
    pub async fn export_to_file(&self, path: impl AsRef<Path>) -> Result<usize, AnkiBatchError> {
        let snapshot = self.snapshot();
        export::export_to_file(&snapshot, &self.sanitize, path).await
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    /// Mark item `index` as processing unless it is already done.
    fn begin_item(&self, index: usize) -> Option<(ItemId, Arc<ImagePayload>)> {
        let mut queue = self.lock_queue();
        let item = queue.get_mut_at(index)?;
        if item.status() == ItemStatus::Done {
            return None;
        }
        item.begin();
        Some((item.id(), item.payload_handle()))
    }

    fn finish_item(&self, index: usize, result: Result<Card, String>) {
        let mut queue = self.lock_queue();
        if let Some(item) = queue.get_mut_at(index) {
            match result {
                Ok(card) => item.complete(card),
                Err(message) => item.fail(message),
            }
        }
    }

    /// Extraction then synthesis; any failure ends the item.
    async fn process_item(
        &self,
        payload: &ImagePayload,
        models: ModelSelection,
    ) -> Result<Card, StageError> {
        let text = self
            .with_timeout(
                Stage::Extraction,
                self.extractor.extract(payload, models.extraction),
            )
            .await?;
        if text.trim().is_empty() {
            return Err(StageError::EmptyExtraction);
        }

        self.with_timeout(
            Stage::Synthesis,
            self.synthesizer.synthesize(text.trim(), models.synthesis),
        )
        .await
    }

    async fn with_timeout<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T, StageError>>,
    ) -> Result<T, StageError> {
        match self.stage_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| StageError::Timeout {
                    stage,
                    secs: limit.as_secs(),
                })?,
            None => fut.await,
        }
    }

    fn publish_snapshot(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn set_state(&self, is_running: bool, step: RunStep, message: String) {
        let mut state = self.lock_state();
        state.is_running = is_running;
        state.step = step;
        state.current_message = message;
    }

    fn set_message(&self, message: String) {
        self.lock_state().current_message = message;
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, BatchRunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the running flag when a run ends, however it ends.
///
/// A run dropped mid-batch (its future cancelled or its task aborted) also
/// leaves the status line idle instead of frozen on "Processing…".
struct RunGuard<'a> {
    controller: &'a BatchController,
    started: bool,
    finished: bool,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.controller.lock_state();
        state.is_running = false;
        if self.started && !self.finished {
            warn!("Batch run interrupted before completion");
            state.step = RunStep::Idle;
            state.current_message = "Run interrupted".to_string();
        }
        drop(state);
        self.controller.running.store(false, Ordering::Release);
    }
}
