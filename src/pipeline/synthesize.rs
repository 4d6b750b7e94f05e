//! Synthesis stage: transcript → `{front, back}` card via a text model.

use crate::config::{BatchConfig, ModelSelector};
use crate::error::StageError;
use crate::model::Card;
use crate::pipeline::postprocess::recover_json_object;
use crate::pipeline::provider::{completion_options, ProviderPool};
use crate::pipeline::Stage;
use crate::prompts::DEFAULT_SYNTHESIS_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions};
use tracing::{debug, warn};

/// Turns extracted text into one flashcard.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, model: ModelSelector) -> Result<Card, StageError>;
}

/// Text-LLM synthesizer: the transcript goes in as the user turn, a JSON
/// object with `front` and `back` comes back.
///
/// Calls are made in JSON mode (`response_format: json_object`); providers
/// that ignore the flag are still covered by the wrapper recovery in
/// [`parse_card`].
pub struct LlmSynthesizer {
    providers: ProviderPool,
    system_prompt: String,
    options: CompletionOptions,
}

impl LlmSynthesizer {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            providers: ProviderPool::new(config.synthesis_provider.clone()),
            system_prompt: config
                .synthesis_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYNTHESIS_PROMPT.to_string()),
            options: CompletionOptions {
                response_format: Some("json_object".to_string()),
                ..completion_options(config)
            },
        }
    }

    pub(crate) fn providers(&self) -> &ProviderPool {
        &self.providers
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(&self, text: &str, model: ModelSelector) -> Result<Card, StageError> {
        let provider = self
            .providers
            .resolve(model)
            .map_err(|e| StageError::ProviderFailed {
                stage: Stage::Synthesis,
                model: model.to_string(),
                detail: e.to_string(),
            })?;

        let messages = vec![
            ChatMessage::system(self.system_prompt.as_str()),
            ChatMessage::user(text),
        ];

        let response = provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| StageError::ProviderFailed {
                stage: Stage::Synthesis,
                model: model.to_string(),
                detail: e.to_string(),
            })?;

        debug!(
            "Synthesis via {}: {} input tokens, {} output tokens",
            model, response.prompt_tokens, response.completion_tokens
        );

        parse_card(&response.content)
    }
}

/// Parse a synthesis response into a [`Card`].
///
/// The first attempt parses the trimmed response as-is. If that fails, code
/// fences and surrounding prose are stripped and the outermost `{ … }` is
/// parsed once more. Both `front` and `back` must be present as strings.
pub fn parse_card(raw: &str) -> Result<Card, StageError> {
    let trimmed = raw.trim();
    let first_err = match serde_json::from_str::<Card>(trimmed) {
        Ok(card) => return Ok(card),
        Err(e) => e,
    };

    let Some(recovered) = recover_json_object(trimmed) else {
        warn!("Synthesis response has no JSON object: {}", preview(trimmed));
        return Err(StageError::ParseFailed {
            detail: first_err.to_string(),
        });
    };

    debug!("Retrying card parse after stripping wrappers");
    serde_json::from_str::<Card>(&recovered).map_err(|e| {
        warn!("Synthesis response is not a card: {}", preview(trimmed));
        StageError::ParseFailed {
            detail: e.to_string(),
        }
    })
}

fn preview(s: &str) -> String {
    const MAX: usize = 120;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}\u{2026}", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgequake_llm::MockProvider;
    use std::sync::Arc;

    fn mocked(mock: &MockProvider) -> LlmSynthesizer {
        LlmSynthesizer::from_config(
            &BatchConfig::builder()
                .synthesis_provider(Arc::new(mock.clone()))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn requests_json_mode() {
        let synth = LlmSynthesizer::from_config(&BatchConfig::default());
        assert_eq!(synth.options.response_format.as_deref(), Some("json_object"));
        assert_eq!(synth.options.max_tokens, Some(4096));
        assert_eq!(synth.options.temperature, Some(0.1));
    }

    #[tokio::test]
    async fn fenced_reply_becomes_a_card() {
        let mock = MockProvider::new();
        mock.add_response("```json\n{\"front\": \"What makes ATP?\", \"back\": \"Mitochondria\"}\n```")
            .await;

        let card = mocked(&mock)
            .synthesize("mitochondria make ATP", ModelSelector::DeepSeekChat)
            .await
            .unwrap();
        assert_eq!(card, Card::new("What makes ATP?", "Mitochondria"));
    }

    #[tokio::test]
    async fn prose_reply_is_a_parse_failure() {
        let mock = MockProvider::new();
        mock.add_response("Sorry, I cannot help with that.").await;

        let err = mocked(&mock)
            .synthesize("mitochondria make ATP", ModelSelector::DeepSeekChat)
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::ParseFailed { .. }));
    }

    #[test]
    fn parses_plain_json() {
        let card = parse_card(r#"{"front":"Q1","back":"A1"}"#).unwrap();
        assert_eq!(card, Card::new("Q1", "A1"));
    }

    #[test]
    fn recovers_from_code_fence() {
        let raw = "```json\n{\n  \"front\": \"What is **ATP**?\",\n  \"back\": \"Energy currency\"\n}\n```";
        let card = parse_card(raw).unwrap();
        assert_eq!(card.front, "What is **ATP**?");
        assert_eq!(card.back, "Energy currency");
    }

    #[test]
    fn recovers_from_surrounding_prose() {
        let raw = "Here is the card you asked for:\n{\"front\":\"Q\",\"back\":\"A\"}\nLet me know!";
        assert_eq!(parse_card(raw).unwrap(), Card::new("Q", "A"));
    }

    #[test]
    fn extra_fields_are_ignored() {
        let raw = r#"{"front":"Q","back":"A","explanation":"long"}"#;
        assert_eq!(parse_card(raw).unwrap(), Card::new("Q", "A"));
    }

    #[test]
    fn missing_back_fails() {
        let err = parse_card(r#"{"front":"Q"}"#).unwrap_err();
        assert!(matches!(err, StageError::ParseFailed { ref detail } if detail.contains("back")));
    }

    #[test]
    fn non_json_fails() {
        let err = parse_card("I could not read the question.").unwrap_err();
        assert!(matches!(err, StageError::ParseFailed { .. }));
    }

    #[test]
    fn fenced_garbage_fails_after_recovery() {
        let err = parse_card("```json\n{front: Q, back: A}\n```").unwrap_err();
        assert!(matches!(err, StageError::ParseFailed { .. }));
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let p = preview(&long);
        assert!(p.ends_with('\u{2026}'));
        assert_eq!(p.chars().count(), 121);
    }
}
