//! Configuration types for batch flashcard generation.
//!
//! All pipeline behaviour is controlled through [`BatchConfig`], built via
//! its [`BatchConfigBuilder`]. Model choice is a closed [`ModelSelector`]
//! enumeration validated at the boundary: a typo in a model name fails when
//! the config is built, not halfway through a 100-image batch.

use crate::error::AnkiBatchError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Hard upper bound on the number of images in one queue.
pub const MAX_QUEUE_CAPACITY: usize = 100;

/// Configuration for a batch run.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use notes2anki::{BatchConfig, ModelSelector, SanitizePolicy};
///
/// let config = BatchConfig::builder()
///     .extraction_model(ModelSelector::Gemini25Flash)
///     .synthesis_model(ModelSelector::DeepSeekChat)
///     .sanitize(SanitizePolicy::Space)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Models used by the two stages when `run` is called without an
    /// explicit selection. Default: gemini-3-flash-preview → deepseek-chat.
    pub models: ModelSelection,

    /// Pre-constructed provider for the extraction stage. Takes precedence
    /// over the provider implied by the model selector.
    pub extraction_provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed provider for the synthesis stage.
    pub synthesis_provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for both stages. Default: 0.1.
    ///
    /// Transcription and question extraction want faithful, repeatable
    /// output rather than creative rewording.
    pub temperature: f32,

    /// Maximum tokens either stage may generate per call. Default: 4096.
    pub max_tokens: usize,

    /// Per-stage timeout in seconds. `0` disables the timeout. Default: 120.
    ///
    /// A stage that does not answer in time fails only its own item.
    pub stage_timeout_secs: u64,

    /// Queue capacity. Range: 1–100. Default: 100.
    ///
    /// Intake beyond this bound is silently dropped.
    pub max_items: usize,

    /// How line breaks inside card fields are flattened on export.
    /// Default: [`SanitizePolicy::HtmlBreak`].
    pub sanitize: SanitizePolicy,

    /// Custom extraction prompt. If None, uses the built-in default.
    pub extraction_prompt: Option<String>,

    /// Custom synthesis prompt. If None, uses the built-in default.
    pub synthesis_prompt: Option<String>,

    /// Longest image edge in pixels before intake downscales a photo.
    /// Default: 2000.
    ///
    /// Phone photos are often 4000+ px on the long edge; vision APIs
    /// downsample them anyway, so sending them full size only costs upload
    /// time and tokens.
    pub max_image_edge: u32,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives per-item progress events during a run.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            models: ModelSelection::default(),
            extraction_provider: None,
            synthesis_provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            stage_timeout_secs: 120,
            max_items: MAX_QUEUE_CAPACITY,
            sanitize: SanitizePolicy::default(),
            extraction_prompt: None,
            synthesis_prompt: None,
            max_image_edge: 2000,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("models", &self.models)
            .field(
                "extraction_provider",
                &self.extraction_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field(
                "synthesis_provider",
                &self.synthesis_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("stage_timeout_secs", &self.stage_timeout_secs)
            .field("max_items", &self.max_items)
            .field("sanitize", &self.sanitize)
            .field("max_image_edge", &self.max_image_edge)
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn extraction_model(mut self, model: ModelSelector) -> Self {
        self.config.models.extraction = model;
        self
    }

    pub fn synthesis_model(mut self, model: ModelSelector) -> Self {
        self.config.models.synthesis = model;
        self
    }

    pub fn extraction_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.extraction_provider = Some(provider);
        self
    }

    pub fn synthesis_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.synthesis_provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn stage_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stage_timeout_secs = secs;
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.config.max_items = n;
        self
    }

    pub fn sanitize(mut self, policy: SanitizePolicy) -> Self {
        self.config.sanitize = policy;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn synthesis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.synthesis_prompt = Some(prompt.into());
        self
    }

    pub fn max_image_edge(mut self, px: u32) -> Self {
        self.config.max_image_edge = px.max(256);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, AnkiBatchError> {
        let c = &self.config;
        if c.max_items == 0 || c.max_items > MAX_QUEUE_CAPACITY {
            return Err(AnkiBatchError::InvalidConfig(format!(
                "max_items must be 1–{MAX_QUEUE_CAPACITY}, got {}",
                c.max_items
            )));
        }
        if c.max_tokens == 0 {
            return Err(AnkiBatchError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.sanitize.is_multi_line() {
            return Err(AnkiBatchError::InvalidConfig(
                "sanitize separator must not contain tabs or line breaks".into(),
            ));
        }
        if !c.models.extraction.supports_vision() {
            return Err(AnkiBatchError::InvalidConfig(format!(
                "extraction model '{}' does not accept image input",
                c.models.extraction
            )));
        }
        Ok(self.config)
    }
}

// ── Model selection ──────────────────────────────────────────────────────

/// Closed set of models the pipeline knows how to drive.
///
/// Capability is declared per variant rather than guessed from the model
/// name, so adding a model means stating whether it can read images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModelSelector {
    Gemini3Flash,
    Gemini25Flash,
    Gemini25Pro,
    Gpt41Nano,
    Gpt41Mini,
    DeepSeekChat,
    DeepSeekReasoner,
}

impl ModelSelector {
    pub const ALL: [ModelSelector; 7] = [
        ModelSelector::Gemini3Flash,
        ModelSelector::Gemini25Flash,
        ModelSelector::Gemini25Pro,
        ModelSelector::Gpt41Nano,
        ModelSelector::Gpt41Mini,
        ModelSelector::DeepSeekChat,
        ModelSelector::DeepSeekReasoner,
    ];

    /// Identifier sent to the provider API.
    pub fn model_id(self) -> &'static str {
        match self {
            ModelSelector::Gemini3Flash => "gemini-3-flash-preview",
            ModelSelector::Gemini25Flash => "gemini-2.5-flash",
            ModelSelector::Gemini25Pro => "gemini-2.5-pro",
            ModelSelector::Gpt41Nano => "gpt-4.1-nano",
            ModelSelector::Gpt41Mini => "gpt-4.1-mini",
            ModelSelector::DeepSeekChat => "deepseek-chat",
            ModelSelector::DeepSeekReasoner => "deepseek-reasoner",
        }
    }

    /// Provider name understood by `edgequake_llm::ProviderFactory`.
    pub fn provider(self) -> &'static str {
        match self {
            ModelSelector::Gemini3Flash
            | ModelSelector::Gemini25Flash
            | ModelSelector::Gemini25Pro => "gemini",
            ModelSelector::Gpt41Nano | ModelSelector::Gpt41Mini => "openai",
            ModelSelector::DeepSeekChat | ModelSelector::DeepSeekReasoner => "deepseek",
        }
    }

    /// Whether the model accepts image input (required for extraction).
    pub fn supports_vision(self) -> bool {
        !matches!(
            self,
            ModelSelector::DeepSeekChat | ModelSelector::DeepSeekReasoner
        )
    }

    fn known_ids() -> String {
        Self::ALL
            .iter()
            .map(|m| m.model_id())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_id())
    }
}

impl FromStr for ModelSelector {
    type Err = AnkiBatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.model_id() == wanted)
            .ok_or_else(|| AnkiBatchError::UnknownModel {
                name: s.to_string(),
                known: Self::known_ids(),
            })
    }
}

impl TryFrom<String> for ModelSelector {
    type Error = AnkiBatchError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModelSelector> for String {
    fn from(m: ModelSelector) -> Self {
        m.model_id().to_string()
    }
}

/// The model used by each of the two stages during one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub extraction: ModelSelector,
    pub synthesis: ModelSelector,
}

impl Default for ModelSelection {
    fn default() -> Self {
        Self {
            extraction: ModelSelector::Gemini3Flash,
            synthesis: ModelSelector::DeepSeekChat,
        }
    }
}

// ── Export sanitisation ──────────────────────────────────────────────────

/// How line breaks inside a card field are flattened on export.
///
/// The export format is one card per line, so fields cannot keep raw
/// newlines. Tabs always become a single space; this policy only decides
/// what a line break turns into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SanitizePolicy {
    /// `<br><br>`: Anki renders it as a visible paragraph break. (default)
    #[default]
    HtmlBreak,
    /// A single space.
    Space,
    /// Custom replacement string. Tabs in it become spaces and line breaks
    /// are dropped, so it can never split a field or a row.
    Custom(String),
}

impl SanitizePolicy {
    /// The string that replaces each line break. Never contains a tab,
    /// `\r` or `\n`.
    pub fn line_break(&self) -> Cow<'_, str> {
        match self {
            SanitizePolicy::HtmlBreak => Cow::Borrowed("<br><br>"),
            SanitizePolicy::Space => Cow::Borrowed(" "),
            SanitizePolicy::Custom(s) if !s.contains(['\t', '\n', '\r']) => Cow::Borrowed(s),
            SanitizePolicy::Custom(s) => Cow::Owned(
                s.chars()
                    .filter(|c| !matches!(c, '\n' | '\r'))
                    .map(|c| if c == '\t' { ' ' } else { c })
                    .collect(),
            ),
        }
    }

    /// True for a custom separator containing a tab or line break.
    pub fn is_multi_line(&self) -> bool {
        matches!(self, SanitizePolicy::Custom(s) if s.contains(['\t', '\n', '\r']))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds() {
        let config = BatchConfig::builder().build().expect("default config is valid");
        assert_eq!(config.max_items, 100);
        assert_eq!(config.models.extraction, ModelSelector::Gemini3Flash);
        assert_eq!(config.models.synthesis, ModelSelector::DeepSeekChat);
        assert_eq!(config.sanitize, SanitizePolicy::HtmlBreak);
    }

    #[test]
    fn text_only_extraction_model_is_rejected() {
        let err = BatchConfig::builder()
            .extraction_model(ModelSelector::DeepSeekChat)
            .build()
            .unwrap_err();
        assert!(matches!(err, AnkiBatchError::InvalidConfig(_)));
    }

    #[test]
    fn max_items_out_of_range_is_rejected() {
        assert!(BatchConfig::builder().max_items(0).build().is_err());
        assert!(BatchConfig::builder().max_items(101).build().is_err());
        assert!(BatchConfig::builder().max_items(5).build().is_ok());
    }

    #[test]
    fn custom_separator_with_newline_is_rejected() {
        let err = BatchConfig::builder()
            .sanitize(SanitizePolicy::Custom("\n".into()))
            .build()
            .unwrap_err();
        assert!(matches!(err, AnkiBatchError::InvalidConfig(_)));
    }

    #[test]
    fn temperature_is_clamped() {
        let config = BatchConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(config.temperature, 2.0);
    }

    #[test]
    fn model_selector_parses_ids_case_insensitively() {
        for m in ModelSelector::ALL {
            assert_eq!(m.model_id().parse::<ModelSelector>().unwrap(), m);
        }
        assert_eq!(
            " GPT-4.1-Mini ".parse::<ModelSelector>().unwrap(),
            ModelSelector::Gpt41Mini
        );
    }

    #[test]
    fn unknown_model_is_rejected_at_boundary() {
        let err = "gemini-flash-latest".parse::<ModelSelector>().unwrap_err();
        match err {
            AnkiBatchError::UnknownModel { name, known } => {
                assert_eq!(name, "gemini-flash-latest");
                assert!(known.contains("deepseek-chat"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn vision_capability_is_declared() {
        assert!(ModelSelector::Gemini3Flash.supports_vision());
        assert!(ModelSelector::Gpt41Nano.supports_vision());
        assert!(!ModelSelector::DeepSeekChat.supports_vision());
        assert!(!ModelSelector::DeepSeekReasoner.supports_vision());
    }

    #[test]
    fn model_selector_serde_uses_model_id() {
        let json = serde_json::to_string(&ModelSelector::Gemini25Pro).unwrap();
        assert_eq!(json, "\"gemini-2.5-pro\"");
        let back: ModelSelector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ModelSelector::Gemini25Pro);
        assert!(serde_json::from_str::<ModelSelector>("\"nope\"").is_err());
    }

    #[test]
    fn sanitize_policy_line_breaks() {
        assert_eq!(SanitizePolicy::HtmlBreak.line_break(), "<br><br>");
        assert_eq!(SanitizePolicy::Space.line_break(), " ");
        assert_eq!(SanitizePolicy::Custom(" / ".into()).line_break(), " / ");
    }

    #[test]
    fn custom_line_break_is_flattened() {
        let policy = SanitizePolicy::Custom("a\tb\r\nc".into());
        assert!(policy.is_multi_line());
        assert_eq!(policy.line_break(), "a bc");
        assert!(!SanitizePolicy::Custom("<hr>".into()).is_multi_line());
    }
}
