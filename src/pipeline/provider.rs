//! Provider resolution: map a [`ModelSelector`] to an `edgequake_llm` provider.
//!
//! A run may switch models between invocations, so providers are created
//! lazily per selector and cached for the life of the stage service. A
//! pre-built provider, when configured, short-circuits the lookup and is used
//! for every selector; that is how tests and callers with custom middleware
//! plug in.

use crate::config::{BatchConfig, ModelSelector};
use crate::error::AnkiBatchError;
use edgequake_llm::{CompletionOptions, LLMProvider, ProviderFactory};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Lazily-populated cache of providers keyed by model selector.
pub struct ProviderPool {
    fixed: Option<Arc<dyn LLMProvider>>,
    cache: Mutex<HashMap<ModelSelector, Arc<dyn LLMProvider>>>,
}

impl ProviderPool {
    /// `fixed`, when set, is returned for every selector.
    pub fn new(fixed: Option<Arc<dyn LLMProvider>>) -> Self {
        Self {
            fixed,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Return the provider for `model`, creating it on first use.
    ///
    /// `ProviderFactory` reads the matching API key (`GEMINI_API_KEY`,
    /// `OPENAI_API_KEY`, `DEEPSEEK_API_KEY`, …) from the environment.
    pub fn resolve(&self, model: ModelSelector) -> Result<Arc<dyn LLMProvider>, AnkiBatchError> {
        if let Some(ref provider) = self.fixed {
            return Ok(Arc::clone(provider));
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(provider) = cache.get(&model) {
            return Ok(Arc::clone(provider));
        }

        debug!("Creating {} provider for {}", model.provider(), model);
        let provider = ProviderFactory::create_llm_provider(model.provider(), model.model_id())
            .map_err(|e| AnkiBatchError::ProviderNotConfigured {
                provider: model.provider().to_string(),
                hint: format!("Could not create a provider for '{model}': {e}"),
            })?;
        cache.insert(model, Arc::clone(&provider));
        Ok(provider)
    }
}

/// Build `CompletionOptions` from the batch config.
pub(crate) fn completion_options(config: &BatchConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
