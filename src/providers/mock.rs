/*!
 * Mock model for testing.
 *
 * The mock reads the tagged blocks out of the rendered prompt and answers
 * according to its behavior:
 * - `MockModel::echo()` - Returns every block unchanged
 * - `MockModel::translating(prefix)` - Prefixes every block's text
 * - `MockModel::dropping_first(n)` - Omits the first block for the first `n` calls
 * - `MockModel::refusing()` - Answers with prose and no blocks
 * - `MockModel::failing()` - Always fails with an API error
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::ProviderError;
use crate::providers::{Generation, ModelCapability, TokenEstimator, TokenUsageStats, UsageTracker};
use crate::translation::tags::{self, TaggedBlock};

/// Custom responder: (prompt, zero-based call number) -> result
pub type MockScript = fn(&str, usize) -> Result<Generation, ProviderError>;

/// Behavior mode for the mock model
#[derive(Debug, Clone, Copy)]
pub enum MockBehavior {
    /// Returns every block unchanged
    Echo,
    /// Prefixes the text of every block
    Translate { prefix: &'static str },
    /// Omits the first block for the first `times` calls, then echoes
    DropFirst { times: usize },
    /// Answers with prose that contains no blocks
    Refuse,
    /// Fails with a provider content-policy error
    ContentPolicy,
    /// Returns a repeating pattern at the output ceiling for the first `times` calls, then echoes
    Repeat { times: usize },
    /// Echoes but reports the output ceiling as the token count
    Truncated,
    /// Always fails with an API error
    Failing,
    /// Delegates to a function
    Script(MockScript),
}

/// Mock model for testing translation behavior
#[derive(Debug)]
pub struct MockModel {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter shared between clones
    request_count: Arc<AtomicUsize>,
    /// Prompts and temperatures seen, in call order
    calls: Arc<Mutex<Vec<(String, f32)>>>,
    /// Simulated latency in milliseconds, computed from the prompt
    latency: Option<fn(&str) -> u64>,
    max_output_tokens: usize,
    estimator: Arc<TokenEstimator>,
    usage: Arc<UsageTracker>,
}

impl MockModel {
    /// Create a new mock model with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(Mutex::new(Vec::new())),
            latency: None,
            max_output_tokens: 4096,
            estimator: Arc::new(TokenEstimator::default()),
            usage: Arc::new(UsageTracker::new("mock", "mock-model")),
        }
    }

    /// Model that returns its input blocks unchanged
    pub fn echo() -> Self {
        Self::new(MockBehavior::Echo)
    }

    /// Model that prefixes every block's text
    pub fn translating(prefix: &'static str) -> Self {
        Self::new(MockBehavior::Translate { prefix })
    }

    /// Model that loses the first block for the first `times` calls
    pub fn dropping_first(times: usize) -> Self {
        Self::new(MockBehavior::DropFirst { times })
    }

    /// Model that answers without any block
    pub fn refusing() -> Self {
        Self::new(MockBehavior::Refuse)
    }

    /// Model that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Model driven by a custom function
    pub fn scripted(script: MockScript) -> Self {
        Self::new(MockBehavior::Script(script))
    }

    /// Sleep before answering, for a duration derived from the prompt
    pub fn with_latency(mut self, latency_ms: fn(&str) -> u64) -> Self {
        self.latency = Some(latency_ms);
        self
    }

    /// Override the output ceiling
    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Number of `generate` calls so far
    pub fn call_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(prompt, _)| prompt.clone()).collect()
    }

    /// Temperatures received, in call order
    pub fn temperatures(&self) -> Vec<f32> {
        self.calls.lock().iter().map(|(_, t)| *t).collect()
    }

    fn reply(&self, blocks: &[TaggedBlock]) -> Generation {
        let text = tags::render_blocks(blocks);
        let output_tokens = self.estimator.estimate(&text);
        Generation::new(text, output_tokens)
    }

    fn respond(&self, prompt: &str, call: usize) -> Result<Generation, ProviderError> {
        let blocks = tags::find_blocks(prompt);

        match self.behavior {
            MockBehavior::Echo => Ok(self.reply(&blocks)),

            MockBehavior::Translate { prefix } => {
                let translated: Vec<TaggedBlock> = blocks
                    .iter()
                    .map(|b| TaggedBlock::new(b.id, format!("{}{}", prefix, b.text)))
                    .collect();
                Ok(self.reply(&translated))
            }

            MockBehavior::DropFirst { times } => {
                if call < times {
                    Ok(self.reply(blocks.get(1..).unwrap_or_default()))
                } else {
                    Ok(self.reply(&blocks))
                }
            }

            MockBehavior::Refuse => Ok(Generation::new("I'm sorry, but I can't help with that request.", 12)),

            MockBehavior::ContentPolicy => Err(ProviderError::ContentRefused(
                "Output blocked by content filtering policy".to_string(),
            )),

            MockBehavior::Repeat { times } => {
                if call < times {
                    let first = blocks.first().map(|b| b.id).unwrap_or(1);
                    Ok(Generation::new(format!("<{}>{}", first, "ha ".repeat(500)), self.max_output_tokens))
                } else {
                    Ok(self.reply(&blocks))
                }
            }

            MockBehavior::Truncated => {
                let text = tags::render_blocks(&blocks);
                Ok(Generation::new(text, self.max_output_tokens))
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Script(script) => script(prompt, call),
        }
    }
}

impl Clone for MockModel {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            calls: Arc::clone(&self.calls),
            latency: self.latency,
            max_output_tokens: self.max_output_tokens,
            estimator: Arc::clone(&self.estimator),
            usage: Arc::clone(&self.usage),
        }
    }
}

#[async_trait]
impl ModelCapability for MockModel {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation, ProviderError> {
        let call = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push((prompt.to_string(), temperature));

        if let Some(latency_ms) = self.latency {
            tokio::time::sleep(Duration::from_millis(latency_ms(prompt))).await;
        }

        let result = self.respond(prompt, call);
        if let Ok(generation) = &result {
            self.usage.record(
                Some(self.estimator.estimate(prompt) as u64),
                Some(generation.output_tokens as u64),
                Duration::ZERO,
            );
        }
        result
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    fn max_output_tokens(&self) -> usize {
        self.max_output_tokens
    }

    fn usage(&self) -> TokenUsageStats {
        self.usage.snapshot()
    }
}
