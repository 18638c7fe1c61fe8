/*!
 * Error types for the subtrans application.
 *
 * This module contains custom error types for different parts of the application,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::fmt;

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The provider's own content policy blocked generation
    #[error("Output blocked by content filtering policy: {0}")]
    ContentRefused(String),

    /// The provider stopped at its output ceiling without returning usable text
    #[error("Response too long, provider stopped at its output limit: {0}")]
    OutputTruncated(String),
}

impl ProviderError {
    /// Whether a transport-level retry can help
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_) | Self::RateLimitExceeded(_) | Self::RequestFailed(_)
        ) || matches!(self, Self::ApiError { status_code, .. } if *status_code >= 500)
    }
}

/// Errors that can occur during subtitle processing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubtitleError {
    /// Structurally malformed subtitle document
    #[error("Invalid subtitle document at line {line}: {reason}")]
    InvalidDocument {
        /// 1-based line number where parsing failed
        line: usize,
        /// What was wrong
        reason: String,
    },

    /// The same subtitle id appears twice
    #[error("Invalid subtitle document: duplicate subtitle id {0}")]
    DuplicateId(u64),

    /// Nothing to translate
    #[error("Invalid subtitle document: no subtitle entries found")]
    Empty,
}

/// Classification of a failed chunk attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Output hit the model's token ceiling and may be truncated
    TooLong,
    /// Output hit the ceiling while stuck repeating a pattern
    RepetitiveDegenerate,
    /// Some, but not all, source entries are missing from the output
    PartialLoss,
    /// The model declined to translate the chunk
    Refusal,
    /// The provider call itself failed
    Provider,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TooLong => "ResponseTooLong",
            Self::RepetitiveDegenerate => "RepetitiveDegenerate",
            Self::PartialLoss => "MissingSubtitles",
            Self::Refusal => "RefuseToTranslate",
            Self::Provider => "ProviderFailure",
        };
        f.write_str(name)
    }
}

/// Terminal failure of a single chunk
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Chunk {} failed after {attempts} attempt(s) ({kind}): {detail}", .chunk_index + 1)]
pub struct ChunkError {
    /// Zero-based chunk sequence index
    pub chunk_index: usize,
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable detail
    pub detail: String,
    /// Last raw model output, for diagnostics
    pub raw_output: String,
    /// Attempts made before giving up
    pub attempts: usize,
}

impl ChunkError {
    /// Short excerpt of the raw model output for log lines
    pub fn raw_output_excerpt(&self, max_chars: usize) -> String {
        if self.raw_output.chars().count() > max_chars {
            let head: String = self.raw_output.chars().take(max_chars).collect();
            format!("{}...", head)
        } else {
            self.raw_output.clone()
        }
    }
}

/// Errors that can occur during translation
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Error with subtitle processing
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// A chunk failed terminally; carries whatever completed before cancellation
    #[error("An error occurred ({}): {source}{}", .source.kind, format_partial(.partial_translation))]
    Aggregate {
        /// First terminal chunk failure
        source: ChunkError,
        /// Restored output of the chunks that completed
        partial_translation: String,
    },

    /// Invalid translation settings
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl TranslationError {
    /// Partial output attached to an aggregate failure
    pub fn partial_translation(&self) -> Option<&str> {
        match self {
            Self::Aggregate { partial_translation, .. } if !partial_translation.is_empty() => {
                Some(partial_translation)
            }
            _ => None,
        }
    }

    /// Chunk failure behind an aggregate error
    pub fn chunk_error(&self) -> Option<&ChunkError> {
        match self {
            Self::Aggregate { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn format_partial(partial: &str) -> String {
    if partial.is_empty() {
        String::new()
    } else {
        format!("\nPartial translation:\n{}", partial)
    }
}
