//! Pipeline stages for photo-to-flashcard conversion.
//!
//! Each submodule implements exactly one step. The two model-backed stages
//! sit behind traits ([`extract::Extractor`], [`synthesize::Synthesizer`]) so
//! the batch controller can be driven by any backend, including test doubles.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ encode ──▶ extract ──▶ postprocess ──▶ synthesize
//! (path/URL)  (base64)   (vision)    (cleanup)       (text LLM → Card)
//! ```
//!
//! 1. [`intake`]  — resolve files, directories, and URLs into image bytes
//! 2. [`encode`]  — sniff the format, downscale oversized photos, base64-wrap
//! 3. [`extract`] — vision model transcribes the photo into plain text
//! 4. [`postprocess`] — deterministic cleanup of transcripts and recovery of
//!    JSON wrapped in formatting the prompt asked the model not to add
//! 5. [`synthesize`] — text model turns the transcript into a front/back card
//!
//! [`provider`] resolves `edgequake_llm` providers for a [`ModelSelector`].
//!
//! [`ModelSelector`]: crate::config::ModelSelector

pub mod encode;
pub mod extract;
pub mod intake;
pub mod postprocess;
pub mod provider;
pub mod synthesize;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two model-backed stages every item passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Synthesis,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Extraction => "extraction",
            Stage::Synthesis => "synthesis",
        })
    }
}
