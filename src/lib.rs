/*!
 * # subtrans - chunked subtitle translation with AI
 *
 * A Rust library for translating SRT subtitle documents with large language
 * models while keeping every subtitle and timestamp intact.
 *
 * ## Features
 *
 * - Token-budgeted chunking of the document
 * - Bounded concurrent translation with deterministic result ordering
 * - Per-attempt id obfuscation to catch models that invent or drop subtitles
 * - Classification of bad responses (too long, degenerate, refusal, missing subtitles)
 *   with targeted retries
 * - Partial results when a chunk fails terminally
 * - Anthropic, OpenAI, Gemini, Ollama and LM Studio providers
 *
 * ## Architecture
 *
 * - `app_config`: Configuration management
 * - `subtitle_processor`: SRT parsing, tagging and restoration
 * - `translation`: The translation engine:
 *   - `translation::chunking`: Chunk planning
 *   - `translation::obfuscation`: Id rewriting and reconciliation
 *   - `translation::validation`: Response checks
 *   - `translation::batch`: Retry loop and concurrent dispatch
 *   - `translation::core`: Document-level service
 * - `providers`: Model capability and its clients
 * - `file_utils`: File system operations
 * - `app_controller`: Main application controller
 * - `language_utils`: ISO language code utilities
 * - `errors`: Custom error types for the application
 */

// Global lints configuration
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod language_utils;
pub mod providers;
pub mod subtitle_processor;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::Config;
pub use errors::{ChunkError, FailureKind, ProviderError, SubtitleError, TranslationError};
pub use language_utils::{get_language_name, resolve_language_name};
pub use providers::{Generation, ModelCapability};
pub use subtitle_processor::{SubtitleCollection, SubtitleEntry};
pub use translation::{TranslationOptions, TranslationService};
