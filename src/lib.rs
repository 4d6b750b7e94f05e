//! # notes2anki
//!
//! Turn photographed study notes into Anki flashcards using two chained
//! language-model calls.
//!
//! ## Why two stages?
//!
//! Reading a handwritten page and writing a good flashcard are different
//! jobs. A vision model transcribes the photo into plain text, then a
//! (cheaper, text-only) model turns that transcript into a single
//! question/answer pair. Each stage can use a different provider and either
//! can fail on its own; a failure marks only that photo as `error` and the
//! batch carries on.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photos / dirs / URLs
//!  │
//!  ├─ 1. Intake      resolve inputs, stop at the queue bound (100)
//!  ├─ 2. Encode      sniff format, downscale, base64 (spawn_blocking)
//!  ├─ 3. Extract     vision model → transcript
//!  ├─ 4. Synthesize  text model → {front, back}
//!  └─ 5. Export      done cards → front<TAB>back lines
//! ```
//!
//! Items are processed one at a time in queue order. Running again retries
//! only the items that ended in `error`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use notes2anki::pipeline::intake::load_inputs;
//! use notes2anki::{BatchConfig, BatchController, RunOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Providers read GEMINI_API_KEY / OPENAI_API_KEY / DEEPSEEK_API_KEY
//!     let config = BatchConfig::default();
//!     let controller = BatchController::from_config(&config)?;
//!
//!     let items = load_inputs(&["notes/".to_string()], &config).await?;
//!     controller.enqueue(items)?;
//!
//!     if let RunOutcome::Completed(summary) = controller.run().await {
//!         eprintln!("{} of {} cards made", summary.succeeded, summary.attempted);
//!     }
//!     controller.export_to_file("cards.txt").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `notes2anki` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## Choosing Models
//!
//! | Model | Vision | Used by default for |
//! |-------|--------|---------------------|
//! | `gemini-3-flash-preview` | yes | extraction |
//! | `gemini-2.5-flash` / `gemini-2.5-pro` | yes | |
//! | `gpt-4.1-nano` / `gpt-4.1-mini` | yes | |
//! | `deepseek-chat` | no | synthesis |
//! | `deepseek-reasoner` | no | |
//!
//! Text-only models are rejected for extraction when the config is built.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod error;
pub mod export;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    BatchConfig, BatchConfigBuilder, ModelSelection, ModelSelector, SanitizePolicy,
    MAX_QUEUE_CAPACITY,
};
pub use controller::{BatchController, QueueSnapshot, RunOutcome, RunSummary};
pub use error::{AnkiBatchError, StageError};
pub use export::{default_export_file_name, export_cards, sanitize_field};
pub use model::{
    BatchRunState, Card, ImagePayload, ItemId, ItemStatus, Queue, QueueStats, QueuedItem, RunStep,
};
pub use pipeline::extract::{Extractor, LlmExtractor};
pub use pipeline::synthesize::{parse_card, LlmSynthesizer, Synthesizer};
pub use pipeline::Stage;
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{SnapshotStream, StatsStream};
