/*!
 * Model capability and provider implementations.
 *
 * The translation engine only needs three things from a model: generate text
 * at a given temperature, estimate token counts, and report its output
 * ceiling. Every vendor client implements [`ModelCapability`] and is picked at
 * construction time by [`build_model`]:
 * - Anthropic: Messages API
 * - OpenAI: Chat Completions (also LM Studio and other compatible servers)
 * - Gemini: generateContent API
 * - Ollama: Local LLM server
 * - Mock: scripted model for tests
 */

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use log::debug;
use parking_lot::RwLock;

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::errors::ProviderError;

pub use self::usage::{TokenUsageStats, UsageTracker};

/// Output of a single generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// Generated text
    pub text: String,
    /// Output tokens reported by the provider
    pub output_tokens: usize,
}

impl Generation {
    /// Create a new generation result
    pub fn new(text: impl Into<String>, output_tokens: usize) -> Self {
        Self {
            text: text.into(),
            output_tokens,
        }
    }
}

/// Text generation capability consumed by the translation engine
///
/// Implementations own their HTTP clients, their token accounting and any
/// request deadline; the engine never times out a call on its own.
#[async_trait]
pub trait ModelCapability: Send + Sync + Debug {
    /// Generate a completion for `prompt`.
    ///
    /// A provider-side content-policy block is reported as
    /// `ProviderError::ContentRefused`, distinct from an empty response.
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation, ProviderError>;

    /// Estimate the token count of `text`
    fn estimate_tokens(&self, text: &str) -> usize;

    /// Output ceiling of the configured model
    fn max_output_tokens(&self) -> usize;

    /// Tune `estimate_tokens` once against the whole document.
    /// The default keeps the local approximation.
    async fn calibrate(&self, _document: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Token usage so far
    fn usage(&self) -> TokenUsageStats;
}

/// Default characters-per-token approximation (about 4 characters per token)
pub const DEFAULT_TOKENS_PER_CHAR: f64 = 0.25;

/// Local token estimator, optionally calibrated with one authoritative count
#[derive(Debug)]
pub struct TokenEstimator {
    tokens_per_char: RwLock<f64>,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_TOKENS_PER_CHAR)
    }
}

impl TokenEstimator {
    /// Create an estimator with a fixed ratio
    pub fn new(tokens_per_char: f64) -> Self {
        Self {
            tokens_per_char: RwLock::new(tokens_per_char),
        }
    }

    /// Estimated tokens for `text`
    pub fn estimate(&self, text: &str) -> usize {
        let chars = text.chars().count();
        (chars as f64 * *self.tokens_per_char.read()).ceil() as usize
    }

    /// Derive the ratio from a measured token count for `text`
    pub fn calibrate(&self, text: &str, measured_tokens: usize) {
        let chars = text.chars().count();
        if chars == 0 || measured_tokens == 0 {
            return;
        }
        let ratio = measured_tokens as f64 / chars as f64;
        debug!("Calibrated token estimate: {:.4} tokens per character", ratio);
        *self.tokens_per_char.write() = ratio;
    }

    /// Current ratio
    pub fn tokens_per_char(&self) -> f64 {
        *self.tokens_per_char.read()
    }
}

/// Build the model selected in the configuration
pub fn build_model(config: &TranslationConfig) -> Result<Arc<dyn ModelCapability>> {
    build_model_with_key(config, config.get_api_key())
}

/// Build the selected model with an already resolved API key
pub fn build_model_with_key(config: &TranslationConfig, api_key: String) -> Result<Arc<dyn ModelCapability>> {
    let model = config.get_model();
    let endpoint = config.get_endpoint();
    let max_output_tokens = config.get_max_output_tokens();
    let policy = http::RetryPolicy {
        max_retries: config.common.transport_retries,
        backoff_base_ms: config.common.retry_backoff_ms,
    };
    let client = http::build_client(config.get_timeout_secs())?;

    let built: Arc<dyn ModelCapability> = match config.provider {
        TranslationProvider::Anthropic => {
            if api_key.is_empty() {
                return Err(anyhow!("Translation API key is required for Anthropic provider"));
            }
            Arc::new(anthropic::Anthropic::new(client, api_key, endpoint, model, max_output_tokens, policy))
        }
        TranslationProvider::OpenAI | TranslationProvider::LMStudio => {
            if api_key.is_empty() && config.provider == TranslationProvider::OpenAI {
                return Err(anyhow!("Translation API key is required for OpenAI provider"));
            }
            Arc::new(openai::OpenAI::new(
                client,
                config.provider.display_name(),
                api_key,
                endpoint,
                model,
                max_output_tokens,
                policy,
            ))
        }
        TranslationProvider::Gemini => {
            if api_key.is_empty() {
                return Err(anyhow!("Translation API key is required for Gemini provider"));
            }
            Arc::new(gemini::Gemini::new(client, api_key, endpoint, model, max_output_tokens, policy))
        }
        TranslationProvider::Ollama => {
            Arc::new(ollama::Ollama::new(client, endpoint, model, max_output_tokens, policy))
        }
    };

    Ok(built)
}

pub mod anthropic;
pub mod gemini;
pub mod http;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod usage;
