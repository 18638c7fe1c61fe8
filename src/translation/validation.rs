/*!
 * Response validation.
 *
 * Classifies a model response against its source chunk. The checks run in a
 * fixed precedence: the token-ceiling checks first (degenerate before plain
 * truncation), then a whole-chunk miss, then a partial miss.
 */

use std::collections::HashSet;
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use log::{debug, warn};
use thiserror::Error;

use crate::errors::FailureKind;

use super::tags;

/// Compression ratio above which output at the token ceiling counts as degenerate
pub const COMPRESSION_RATIO_THRESHOLD: f64 = 2.5;

/// Why a response was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationFailure {
    /// Output reached the model's ceiling and may be truncated
    #[error("response reached the output ceiling ({output_tokens} >= {max_output_tokens} tokens); reduce the chunk size")]
    TooLong {
        output_tokens: usize,
        max_output_tokens: usize,
    },

    /// Output reached the ceiling while repeating itself
    #[error("response reached the output ceiling with repetitive content (compression ratio {compression_ratio:.2})")]
    RepetitiveDegenerate { compression_ratio: f64 },

    /// Non-empty output without any requested entry
    #[error("model returned text but none of the {expected} requested subtitles")]
    Refusal { expected: usize },

    /// Some requested entries are missing
    #[error("{} subtitle(s) missing from the response: {:?}", .missing_ids.len(), .missing_ids)]
    PartialLoss { missing_ids: Vec<u64> },
}

impl ValidationFailure {
    /// Failure classification used by the retry policy
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::TooLong { .. } => FailureKind::TooLong,
            Self::RepetitiveDegenerate { .. } => FailureKind::RepetitiveDegenerate,
            Self::Refusal { .. } => FailureKind::Refusal,
            Self::PartialLoss { .. } => FailureKind::PartialLoss,
        }
    }
}

/// Everything the validator looks at for one attempt
#[derive(Debug, Clone, Copy)]
pub struct ResponseCheck<'a> {
    /// Response after reconciliation, carrying original ids
    pub restored_response: &'a str,
    /// Response exactly as returned by the model
    pub raw_response: &'a str,
    /// Source chunk with original ids
    pub source_chunk: &'a str,
    /// Output tokens reported by the provider
    pub output_tokens: usize,
    /// Output ceiling of the model
    pub max_output_tokens: usize,
}

/// Classifies model responses
#[derive(Debug, Clone, Copy)]
pub struct ResponseValidator {
    compression_ratio_threshold: f64,
}

impl Default for ResponseValidator {
    fn default() -> Self {
        Self::new(COMPRESSION_RATIO_THRESHOLD)
    }
}

impl ResponseValidator {
    /// Create a validator with a custom degenerate threshold
    pub fn new(compression_ratio_threshold: f64) -> Self {
        Self { compression_ratio_threshold }
    }

    /// Validate one response
    pub fn validate(&self, check: &ResponseCheck<'_>) -> Result<(), ValidationFailure> {
        if check.max_output_tokens > 0 && check.output_tokens >= check.max_output_tokens {
            let compression_ratio = compression_ratio(check.raw_response);
            debug!(
                "Response at output ceiling ({} tokens), compression ratio {:.2}",
                check.output_tokens, compression_ratio
            );
            if compression_ratio > self.compression_ratio_threshold {
                return Err(ValidationFailure::RepetitiveDegenerate { compression_ratio });
            }
            return Err(ValidationFailure::TooLong {
                output_tokens: check.output_tokens,
                max_output_tokens: check.max_output_tokens,
            });
        }

        let source_ids = tags::block_ids(check.source_chunk);
        let found: HashSet<u64> = tags::block_ids(check.restored_response).into_iter().collect();
        let missing_ids: Vec<u64> = source_ids.iter().copied().filter(|id| !found.contains(id)).collect();

        if missing_ids.is_empty() {
            return Ok(());
        }

        // An empty response is a structural miss, not a refusal
        if missing_ids.len() == source_ids.len() && !check.raw_response.trim().is_empty() {
            return Err(ValidationFailure::Refusal { expected: source_ids.len() });
        }

        Err(ValidationFailure::PartialLoss { missing_ids })
    }
}

/// Ratio of raw size to zlib-compressed size.
/// Repetitive text compresses well and yields a high ratio.
pub fn compression_ratio(text: &str) -> f64 {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return 0.0;
    }

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let compressed = match encoder.write_all(bytes).and_then(|_| encoder.finish()) {
        Ok(compressed) => compressed,
        Err(e) => {
            warn!("Failed to compress response for repetition check: {}", e);
            return 0.0;
        }
    };

    bytes.len() as f64 / compressed.len().max(1) as f64
}
