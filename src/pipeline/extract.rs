//! Extraction stage: photo → transcribed text via a vision model.
//!
//! The stage is a trait so the batch controller does not care whether text
//! comes from a hosted VLM, a local OCR engine, or a test double.
//! [`LlmExtractor`] is the `edgequake_llm`-backed implementation.

use crate::config::{BatchConfig, ModelSelector};
use crate::error::StageError;
use crate::model::ImagePayload;
use crate::pipeline::postprocess::clean_transcript;
use crate::pipeline::provider::{completion_options, ProviderPool};
use crate::pipeline::Stage;
use crate::prompts::{DEFAULT_EXTRACTION_PROMPT, EXTRACTION_USER_TEXT};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData};
use tracing::debug;

/// Turns an image payload into plain text.
///
/// Implementations must fail with a descriptive [`StageError`] when the
/// payload is unreadable, the backend rejects the call, or the resulting
/// text is blank. Returned text is trimmed.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        payload: &ImagePayload,
        model: ModelSelector,
    ) -> Result<String, StageError>;
}

/// Vision-LLM extractor.
///
/// ## Message Layout
///
/// 1. **System message** — the transcription rules (or a configured override)
/// 2. **User message** — a one-line instruction plus the photo as a base64
///    attachment with `detail: "high"` so small handwriting stays legible
pub struct LlmExtractor {
    providers: ProviderPool,
    system_prompt: String,
    options: CompletionOptions,
}

impl LlmExtractor {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            providers: ProviderPool::new(config.extraction_provider.clone()),
            system_prompt: config
                .extraction_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_EXTRACTION_PROMPT.to_string()),
            options: completion_options(config),
        }
    }

    pub(crate) fn providers(&self) -> &ProviderPool {
        &self.providers
    }
}

#[async_trait]
impl Extractor for LlmExtractor {
    async fn extract(
        &self,
        payload: &ImagePayload,
        model: ModelSelector,
    ) -> Result<String, StageError> {
        if !model.supports_vision() {
            return Err(StageError::VisionUnsupported {
                model: model.to_string(),
            });
        }
        check_payload(payload)?;

        let provider = self
            .providers
            .resolve(model)
            .map_err(|e| StageError::ProviderFailed {
                stage: Stage::Extraction,
                model: model.to_string(),
                detail: e.to_string(),
            })?;

        let image =
            ImageData::new(payload.data.clone(), payload.mime_type.as_str()).with_detail("high");
        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user_with_images(EXTRACTION_USER_TEXT, vec![image]),
        ];

        let response = provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| StageError::ProviderFailed {
                stage: Stage::Extraction,
                model: model.to_string(),
                detail: e.to_string(),
            })?;

        debug!(
            "Extraction via {}: {} input tokens, {} output tokens",
            model, response.prompt_tokens, response.completion_tokens
        );

        let text = clean_transcript(&response.content);
        if text.is_empty() {
            return Err(StageError::EmptyExtraction);
        }
        Ok(text)
    }
}

/// Reject payloads a provider could never read before paying for a call.
fn check_payload(payload: &ImagePayload) -> Result<(), StageError> {
    if payload.is_empty() {
        return Err(StageError::Unreadable {
            detail: "payload is empty".into(),
        });
    }
    if !payload.mime_type.starts_with("image/") {
        return Err(StageError::Unreadable {
            detail: format!("unsupported media type '{}'", payload.mime_type),
        });
    }
    STANDARD
        .decode(payload.data.trim())
        .map_err(|e| StageError::Unreadable {
            detail: format!("invalid base64: {e}"),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::MockProvider;
    use std::sync::Arc;

    fn extractor() -> LlmExtractor {
        LlmExtractor::from_config(&BatchConfig::default())
    }

    fn mocked(mock: &MockProvider) -> LlmExtractor {
        LlmExtractor::from_config(
            &BatchConfig::builder()
                .extraction_provider(Arc::new(mock.clone()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn transcription_is_free_form() {
        assert!(extractor().options.response_format.is_none());
    }

    #[tokio::test]
    async fn fenced_transcript_is_cleaned() {
        let mock = MockProvider::new();
        mock.add_response("```markdown\n# Cell biology\n\nMitochondria make ATP.   \n```")
            .await;

        let text = mocked(&mock)
            .extract(
                &ImagePayload::new("aGVsbG8=", "image/png"),
                ModelSelector::Gemini3Flash,
            )
            .await
            .unwrap();
        assert_eq!(text, "# Cell biology\n\nMitochondria make ATP.");
    }

    #[tokio::test]
    async fn whitespace_reply_is_empty_extraction() {
        let mock = MockProvider::new();
        mock.add_response(" \n\t\n ").await;

        let err = mocked(&mock)
            .extract(
                &ImagePayload::new("aGVsbG8=", "image/png"),
                ModelSelector::Gemini3Flash,
            )
            .await
            .unwrap_err();
        assert_eq!(err, StageError::EmptyExtraction);
    }

    #[tokio::test]
    async fn text_only_model_is_refused() {
        let payload = ImagePayload::new("aGVsbG8=", "image/png");
        let err = extractor()
            .extract(&payload, ModelSelector::DeepSeekChat)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StageError::VisionUnsupported {
                model: "deepseek-chat".into()
            }
        );
    }

    #[tokio::test]
    async fn empty_payload_is_unreadable() {
        let payload = ImagePayload::new("  ", "image/png");
        let err = extractor()
            .extract(&payload, ModelSelector::Gemini3Flash)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Unreadable { .. }));
    }

    #[test]
    fn invalid_base64_is_unreadable() {
        let err = check_payload(&ImagePayload::new("not base64!!", "image/jpeg")).unwrap_err();
        assert!(matches!(err, StageError::Unreadable { ref detail } if detail.contains("base64")));
    }

    #[test]
    fn non_image_mime_is_unreadable() {
        let err = check_payload(&ImagePayload::new("aGVsbG8=", "application/pdf")).unwrap_err();
        assert!(matches!(err, StageError::Unreadable { .. }));
    }

    #[test]
    fn valid_payload_passes() {
        assert!(check_payload(&ImagePayload::new("aGVsbG8=", "image/jpeg")).is_ok());
    }

    #[test]
    fn default_prompt_is_used_without_override() {
        assert_eq!(extractor().system_prompt, DEFAULT_EXTRACTION_PROMPT);
        let custom = LlmExtractor::from_config(
            &BatchConfig::builder()
                .extraction_prompt("just read it")
                .build()
                .unwrap(),
        );
        assert_eq!(custom.system_prompt, "just read it");
    }
}
