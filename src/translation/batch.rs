/*!
 * Batch translation processing.
 *
 * Runs one task per chunk on a bounded pool. Each task drives an explicit
 * retry loop with escalating id obfuscation. The first terminal failure sets
 * a shared cancellation flag: tasks that have not reached the model yet stop,
 * tasks already waiting on the model finish but their output is discarded.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};

use crate::errors::{ChunkError, FailureKind, ProviderError};
use crate::providers::ModelCapability;

use super::chunking::Chunk;
use super::core::TranslationOptions;
use super::obfuscation::{IdObfuscator, ObfuscationStrategy};
use super::prompts::PromptTemplate;
use super::validation::{ResponseCheck, ResponseValidator};

/// Sampling temperature for the attempt that follows a degenerate response
pub const DEGENERATE_RETRY_TEMPERATURE: f32 = 1.0;

/// Final state of one chunk task
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutcome {
    /// Translated text with original ids, sorted by id
    Succeeded { text: String, attempts: usize },
    /// Terminal failure
    Failed(ChunkError),
    /// Abandoned because another chunk failed
    Cancelled,
}

/// Collected results of a batch, in chunk order
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// One slot per chunk; `None` for failed, cancelled or discarded chunks
    pub translations: Vec<Option<String>>,
    /// Attempts used by each chunk that succeeded
    pub attempts: Vec<usize>,
    /// First terminal failure, if any
    pub failure: Option<ChunkError>,
}

impl BatchOutcome {
    /// Completed chunk texts in chunk order
    pub fn completed(&self) -> impl Iterator<Item = &str> {
        self.translations.iter().filter_map(|t| t.as_deref())
    }

    /// Retries spent across successful chunks
    pub fn retries_used(&self) -> usize {
        self.attempts.iter().map(|a| a.saturating_sub(1)).sum()
    }
}

/// Failure of a single attempt
struct AttemptFailure {
    kind: FailureKind,
    detail: String,
    raw_output: String,
}

/// Batch translator for processing chunks concurrently
pub struct BatchTranslator {
    /// Model used for every chunk
    model: Arc<dyn ModelCapability>,

    /// Prompt rendered for each attempt
    prompt: PromptTemplate,

    /// Engine settings
    options: TranslationOptions,

    validator: ResponseValidator,
}

impl BatchTranslator {
    /// Create a new batch translator
    pub fn new(model: Arc<dyn ModelCapability>, prompt: PromptTemplate, options: TranslationOptions) -> Self {
        Self {
            model,
            prompt,
            options,
            validator: ResponseValidator::default(),
        }
    }

    /// Translate all chunks with a fresh cancellation flag
    pub async fn translate_chunks<F>(&self, chunks: &[Chunk], progress: F) -> BatchOutcome
    where
        F: Fn(f64),
    {
        self.translate_chunks_with_cancellation(chunks, Arc::new(AtomicBool::new(false)), progress)
            .await
    }

    /// Translate all chunks; setting `cancelled` stops work that has not started.
    ///
    /// Results land in a slot array indexed by chunk position, so the output
    /// order never depends on completion order. `progress` receives the
    /// fraction of chunks that finished (success or terminal failure) and is
    /// only called from this task, after the slot is written.
    pub async fn translate_chunks_with_cancellation<F>(
        &self,
        chunks: &[Chunk],
        cancelled: Arc<AtomicBool>,
        progress: F,
    ) -> BatchOutcome
    where
        F: Fn(f64),
    {
        let total = chunks.len();
        let mut outcome = BatchOutcome {
            translations: vec![None; total],
            attempts: Vec::new(),
            failure: None,
        };
        if total == 0 {
            return outcome;
        }

        let worker_count = self.options.worker_count.max(1);
        debug!("Dispatching {} chunk(s) on {} worker(s)", total, worker_count);

        let mut results = stream::iter(chunks.iter().enumerate())
            .map(|(slot, chunk)| {
                let cancelled = Arc::clone(&cancelled);
                async move { (slot, self.translate_chunk(slot, chunk, &cancelled).await) }
            })
            .buffer_unordered(worker_count);

        let mut finished = 0;
        while let Some((slot, result)) = results.next().await {
            match result {
                ChunkOutcome::Succeeded { text, attempts } => {
                    if outcome.failure.is_some() {
                        debug!("Discarding chunk {} completed after cancellation", slot + 1);
                        continue;
                    }
                    outcome.translations[slot] = Some(text);
                    outcome.attempts.push(attempts);
                }
                ChunkOutcome::Failed(chunk_error) => {
                    cancelled.store(true, Ordering::SeqCst);
                    if outcome.failure.is_some() {
                        debug!("Ignoring later failure of chunk {}: {}", slot + 1, chunk_error);
                        continue;
                    }
                    outcome.failure = Some(chunk_error);
                }
                ChunkOutcome::Cancelled => continue,
            }

            finished += 1;
            progress(finished as f64 / total as f64);
        }

        outcome
    }

    /// Retry loop for one chunk
    async fn translate_chunk(&self, slot: usize, chunk: &Chunk, cancelled: &AtomicBool) -> ChunkOutcome {
        let mut attempt = 0;
        let mut temperature = self.options.temperature;

        loop {
            if cancelled.load(Ordering::SeqCst) {
                debug!("Chunk {} cancelled before attempt {}", slot + 1, attempt + 1);
                return ChunkOutcome::Cancelled;
            }

            match self.attempt_chunk(slot, chunk, attempt, temperature).await {
                Ok(text) => {
                    return ChunkOutcome::Succeeded {
                        text,
                        attempts: attempt + 1,
                    };
                }
                Err(failure) => {
                    if !self.is_retryable(failure.kind) || attempt >= self.options.max_retries {
                        error!(
                            "Chunk {} failed after {} attempt(s) ({}): {}",
                            slot + 1,
                            attempt + 1,
                            failure.kind,
                            failure.detail
                        );
                        cancelled.store(true, Ordering::SeqCst);
                        return ChunkOutcome::Failed(ChunkError {
                            chunk_index: chunk.index,
                            kind: failure.kind,
                            detail: failure.detail,
                            raw_output: failure.raw_output,
                            attempts: attempt + 1,
                        });
                    }

                    warn!(
                        "Chunk {} attempt {} failed ({}): {}. Retrying...",
                        slot + 1,
                        attempt + 1,
                        failure.kind,
                        failure.detail
                    );
                    temperature = if failure.kind == FailureKind::RepetitiveDegenerate {
                        DEGENERATE_RETRY_TEMPERATURE
                    } else {
                        self.options.temperature
                    };
                    attempt += 1;
                }
            }
        }
    }

    /// One request/validate cycle
    async fn attempt_chunk(
        &self,
        slot: usize,
        chunk: &Chunk,
        attempt: usize,
        temperature: f32,
    ) -> Result<String, AttemptFailure> {
        let strategy = if attempt == 0 {
            ObfuscationStrategy::Reindex
        } else {
            ObfuscationStrategy::Randomize
        };
        let (mut sent_text, mapping) = IdObfuscator::obfuscate(&chunk.text, strategy);
        if attempt >= 2 {
            info!("Shuffling subtitle order for chunk {} (attempt {})", slot + 1, attempt + 1);
            sent_text = IdObfuscator::shuffle(&sent_text);
        }

        info!(
            "Processing chunk {} with {} tokens (attempt {}, temperature {})",
            slot + 1,
            chunk.num_tokens,
            attempt + 1,
            temperature
        );

        let prompt = self.prompt.render(&self.options.target_language, &sent_text);
        let started = Instant::now();
        let generation = self.model.generate(&prompt, temperature).await.map_err(|e| AttemptFailure {
            kind: classify_provider_error(&e),
            detail: e.to_string(),
            raw_output: String::new(),
        })?;

        let restored = IdObfuscator::reconcile(&generation.text, &mapping);
        let check = ResponseCheck {
            restored_response: &restored,
            raw_response: &generation.text,
            source_chunk: &chunk.text,
            output_tokens: generation.output_tokens,
            max_output_tokens: self.model.max_output_tokens(),
        };

        match self.validator.validate(&check) {
            Ok(()) => {
                info!(
                    "Chunk {} translated: {} output tokens in {:.1}s",
                    slot + 1,
                    generation.output_tokens,
                    started.elapsed().as_secs_f64()
                );
                Ok(restored)
            }
            Err(failure) => Err(AttemptFailure {
                kind: failure.kind(),
                detail: failure.to_string(),
                raw_output: generation.text,
            }),
        }
    }

    fn is_retryable(&self, kind: FailureKind) -> bool {
        match kind {
            FailureKind::PartialLoss | FailureKind::RepetitiveDegenerate => true,
            FailureKind::Refusal => self.options.retry_on_refusal,
            FailureKind::TooLong | FailureKind::Provider => false,
        }
    }
}

/// Map a provider error to the engine's failure classes
fn classify_provider_error(error: &ProviderError) -> FailureKind {
    match error {
        ProviderError::ContentRefused(_) => FailureKind::Refusal,
        ProviderError::OutputTruncated(_) => FailureKind::TooLong,
        _ => FailureKind::Provider,
    }
}
