/*!
 * Translation engine for subtitle translation using AI models.
 *
 * This module contains the chunked, integrity-checked translation engine.
 * It is split into several submodules:
 *
 * - `tags`: `<id>text</id>` wire format shared by every stage
 * - `chunking`: Token-budgeted chunk planning
 * - `obfuscation`: Per-attempt id rewriting and reconciliation
 * - `validation`: Classification of model responses
 * - `prompts`: Prompt template
 * - `batch`: Per-chunk retry loop and bounded concurrent dispatch
 * - `core`: Document-level service and result assembly
 */

// Re-export main types for easier usage
pub use self::batch::{BatchOutcome, BatchTranslator, ChunkOutcome};
pub use self::chunking::{Chunk, ChunkPlanner};
pub use self::core::{TranslationOptions, TranslationService};
pub use self::obfuscation::{IdMapping, IdObfuscator, ObfuscationStrategy};
pub use self::prompts::PromptTemplate;
pub use self::tags::TaggedBlock;
pub use self::validation::{ResponseValidator, ValidationFailure};

// Submodules
pub mod batch;
pub mod chunking;
pub mod core;
pub mod obfuscation;
pub mod prompts;
pub mod tags;
pub mod validation;
