/*!
 * Common test utilities for the subtrans test suite
 */

use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

use subtrans::providers::mock::MockModel;
use subtrans::translation::{TranslationOptions, TranslationService};

/// Three-entry document used across the suite
pub const SAMPLE_SRT: &str = "1
00:00:01,000 --> 00:00:04,000
alpha line

2
00:00:05,000 --> 00:00:09,000
bravo line

3
00:00:10,000 --> 00:00:14,000
charlie line
";

/// Route log output through the test harness once
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Creates the sample subtitle file in the specified directory
pub fn create_test_subtitle(dir: &Path, filename: &str) -> Result<PathBuf> {
    create_test_file(dir, filename, SAMPLE_SRT)
}

/// Options that put every subtitle in its own chunk
pub fn one_block_per_chunk(worker_count: usize) -> TranslationOptions {
    TranslationOptions {
        target_language: "French".to_string(),
        worker_count,
        tokens_per_chunk: 1,
        ..TranslationOptions::default()
    }
}

/// Service around a mock model; the mock is returned for inspection
pub fn service_with(model: MockModel, options: TranslationOptions) -> (TranslationService, MockModel) {
    let service = TranslationService::new(Arc::new(model.clone()), options);
    (service, model)
}
