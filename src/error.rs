//! Error types for the notes2anki library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`AnkiBatchError`] — **Fatal**: the operation cannot proceed at all
//!   (input missing, unknown model, provider not configured, export file
//!   not writable). Returned as `Err(AnkiBatchError)` from library entry
//!   points.
//!
//! * [`StageError`] — **Non-fatal**: one queued image failed in the
//!   extraction or synthesis stage. It is rendered into the item's
//!   `error_message` and never escapes the batch run, so one bad photo
//!   cannot cost the rest of the queue.

use crate::pipeline::Stage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the notes2anki library.
///
/// Per-item failures use [`StageError`] and are stored on the
/// [`crate::model::QueuedItem`] rather than propagated here.
#[derive(Debug, Error)]
pub enum AnkiBatchError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file or directory was not found at the given path.
    #[error("Input not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// The input was read but is not an image format we can send to a model.
    #[error("'{source_name}' is not a supported image (png, jpeg, webp, gif, bmp)")]
    NotAnImage { source_name: String },

    // ── Model / provider errors ───────────────────────────────────────────
    /// A model selector string did not match any known model.
    #[error("Unknown model '{name}'. Known models: {known}")]
    UnknownModel { name: String, known: String },

    /// The provider behind a model selector could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Queue errors ──────────────────────────────────────────────────────
    /// The queue cannot be modified while a batch run is in progress.
    #[error("A batch run is in progress; the queue is locked until it completes")]
    RunInProgress,

    // ── Export errors ─────────────────────────────────────────────────────
    /// No item has reached `done`, so there is nothing to write.
    #[error("No finished cards to export")]
    NothingToExport,

    /// Could not create or write the export file.
    #[error("Failed to write export file '{path}': {source}")]
    ExportWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single queued image.
///
/// Its `Display` text becomes the item's `error_message`. The batch carries
/// on with the next item.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageError {
    /// The payload is empty or not valid image data.
    #[error("image payload is unreadable: {detail}")]
    Unreadable { detail: String },

    /// The extraction model cannot take image input.
    #[error("model '{model}' does not accept image input")]
    VisionUnsupported { model: String },

    /// The provider rejected the call or the transport failed.
    #[error("{stage} call to '{model}' failed: {detail}")]
    ProviderFailed {
        stage: Stage,
        model: String,
        detail: String,
    },

    /// Extraction produced blank text.
    #[error("extraction returned no text; make sure the photo is sharp and contains writing")]
    EmptyExtraction,

    /// The synthesis response is not a `{front, back}` object, even after
    /// stripping formatting wrappers.
    #[error("synthesis response could not be parsed as a front/back card: {detail}")]
    ParseFailed { detail: String },

    /// The stage call did not resolve within the configured timeout.
    #[error("{stage} stage timed out after {secs}s")]
    Timeout { stage: Stage, secs: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_failed_display_names_stage_and_model() {
        let e = StageError::ProviderFailed {
            stage: Stage::Synthesis,
            model: "deepseek-chat".into(),
            detail: "401 Unauthorized".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("synthesis"), "got: {msg}");
        assert!(msg.contains("deepseek-chat"), "got: {msg}");
        assert!(msg.contains("401"), "got: {msg}");
    }

    #[test]
    fn timeout_display() {
        let e = StageError::Timeout {
            stage: Stage::Extraction,
            secs: 30,
        };
        assert_eq!(e.to_string(), "extraction stage timed out after 30s");
    }

    #[test]
    fn empty_extraction_is_non_empty_message() {
        assert!(!StageError::EmptyExtraction.to_string().is_empty());
    }

    #[test]
    fn unknown_model_lists_known() {
        let e = AnkiBatchError::UnknownModel {
            name: "gpt-9".into(),
            known: "a, b".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("gpt-9"));
        assert!(msg.contains("a, b"));
    }
}
