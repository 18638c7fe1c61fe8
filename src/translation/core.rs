/*!
 * Core translation service.
 *
 * Turns a subtitle document into a translated one: tag the entries, plan
 * chunks against the model's token estimate, hand the chunks to the batch
 * translator, then restore timestamps on whatever came back.
 */

use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};

use crate::app_config::Config;
use crate::errors::TranslationError;
use crate::language_utils;
use crate::providers::{self, ModelCapability};
use crate::subtitle_processor::SubtitleCollection;

use super::batch::BatchTranslator;
use super::chunking::ChunkPlanner;
use super::prompts::PromptTemplate;

/// Default token budget per chunk
pub const DEFAULT_TOKENS_PER_CHUNK: usize = 2500;

/// Default retry bound per chunk
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Options for the translation engine
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOptions {
    /// Target language name substituted into the prompt
    pub target_language: String,

    /// Maximum number of chunks in flight
    pub worker_count: usize,

    /// Token budget per chunk
    pub tokens_per_chunk: usize,

    /// Retries allowed after the first attempt of a chunk
    pub max_retries: usize,

    /// Sampling temperature
    pub temperature: f32,

    /// Whether a refusal is retried like a partial loss
    pub retry_on_refusal: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            target_language: "English".to_string(),
            worker_count: 1,
            tokens_per_chunk: DEFAULT_TOKENS_PER_CHUNK,
            max_retries: DEFAULT_MAX_RETRIES,
            temperature: DEFAULT_TEMPERATURE,
            retry_on_refusal: false,
        }
    }
}

impl TranslationOptions {
    /// Build options from the application configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let common = &config.translation.common;
        Ok(Self {
            target_language: language_utils::resolve_language_name(&config.target_language)?,
            worker_count: common.worker_count,
            tokens_per_chunk: common.tokens_per_chunk,
            max_retries: common.max_retries,
            temperature: common.temperature,
            retry_on_refusal: common.retry_on_refusal,
        })
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), TranslationError> {
        if self.target_language.trim().is_empty() {
            return Err(TranslationError::Configuration("target language is empty".to_string()));
        }
        if self.worker_count == 0 {
            return Err(TranslationError::Configuration("worker count must be at least 1".to_string()));
        }
        if self.tokens_per_chunk == 0 {
            return Err(TranslationError::Configuration("tokens per chunk must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Main translation service for subtitle translation
pub struct TranslationService {
    /// Model implementation
    model: Arc<dyn ModelCapability>,

    /// Translation options
    pub options: TranslationOptions,

    /// Prompt sent with every chunk
    prompt: PromptTemplate,
}

impl TranslationService {
    /// Create a service around an existing model
    pub fn new(model: Arc<dyn ModelCapability>, options: TranslationOptions) -> Self {
        Self {
            model,
            options,
            prompt: PromptTemplate::default(),
        }
    }

    /// Use a custom prompt template
    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    /// Create a service with the provider, options and prompt from the configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let model = providers::build_model(&config.translation)?;
        let options = TranslationOptions::from_config(config)?;
        let prompt = match &config.translation.common.prompt_file {
            Some(path) => PromptTemplate::from_file(path)?,
            None => PromptTemplate::default(),
        };
        Ok(Self::new(model, options).with_prompt(prompt))
    }

    /// The model used by this service
    pub fn model(&self) -> &Arc<dyn ModelCapability> {
        &self.model
    }

    /// Translate a raw SRT document.
    ///
    /// Returns the full translated document, or an aggregate error that
    /// carries the restored text of every chunk that completed.
    pub async fn translate_subtitles<F>(&self, raw: &str, progress: F) -> Result<String, TranslationError>
    where
        F: Fn(f64),
    {
        let collection = SubtitleCollection::parse_srt_string(raw)?;
        self.translate_collection(&collection, progress).await
    }

    /// Translate an already parsed document
    pub async fn translate_collection<F>(
        &self,
        collection: &SubtitleCollection,
        progress: F,
    ) -> Result<String, TranslationError>
    where
        F: Fn(f64),
    {
        self.options.validate()?;

        let tagged = collection.to_tagged_text();
        if let Err(e) = self.model.calibrate(&tagged).await {
            warn!("Token calibration failed, using the default estimate: {}", e);
        }

        let planner = ChunkPlanner::new(self.options.tokens_per_chunk);
        let chunks = planner.plan_text(&tagged, |text| self.model.estimate_tokens(text));
        info!("Split into {} chunks.", chunks.len());

        let batch = BatchTranslator::new(Arc::clone(&self.model), self.prompt.clone(), self.options.clone());
        let outcome = batch.translate_chunks(&chunks, progress).await;

        let assembled = outcome.completed().collect::<Vec<_>>().join("\n\n");
        let restored = collection.restore_from_tagged(&assembled);

        if let Some(source) = outcome.failure {
            return Err(TranslationError::Aggregate {
                source,
                partial_translation: restored,
            });
        }

        info!(
            "Translated {} entries in {} chunk(s), {} retr{} used",
            collection.len(),
            chunks.len(),
            outcome.retries_used(),
            if outcome.retries_used() == 1 { "y" } else { "ies" }
        );
        Ok(restored)
    }
}
