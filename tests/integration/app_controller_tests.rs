/*!
 * File-level runs through the application controller
 */

use anyhow::Result;
use std::fs;
use std::path::Path;
use subtrans::app_config::{Config, TranslationProvider};
use subtrans::app_controller::{Controller, FileOutcome, RunSummary};
use subtrans::providers::Generation;
use subtrans::providers::mock::MockModel;
use subtrans::translation::tags;
use subtrans::errors::ProviderError;

use crate::common;

fn french_config() -> Config {
    let mut config = Config::default();
    config.target_language = "French".to_string();
    config.translation.provider = TranslationProvider::Ollama;
    config
}

fn controller_with(model: MockModel, worker_count: usize) -> Controller {
    let (service, _) = common::service_with(model, common::one_block_per_chunk(worker_count));
    Controller::with_service(french_config(), service)
}

/// Translates everything but the last subtitle
fn fail_on_charlie(prompt: &str, _call: usize) -> Result<Generation, ProviderError> {
    if prompt.contains("charlie") {
        return Err(ProviderError::ContentRefused("blocked".to_string()));
    }
    let blocks: Vec<_> = tags::find_blocks(prompt)
        .into_iter()
        .map(|b| tags::TaggedBlock::new(b.id, format!("FR: {}", b.text)))
        .collect();
    Ok(Generation::new(tags::render_blocks(&blocks), 10))
}

#[tokio::test]
async fn test_runFile_withTranslatingModel_shouldWriteOutputNextToInput() -> Result<()> {
    common::init_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_subtitle(temp_dir.path(), "episode.srt")?;
    let controller = controller_with(MockModel::translating("FR: "), 2);

    let outcome = controller.run_file(&input, false).await?;

    let expected_path = temp_dir.path().join("episode.fr.srt");
    assert_eq!(outcome, FileOutcome::Translated(expected_path.clone()));
    let written = fs::read_to_string(&expected_path)?;
    assert!(written.starts_with("1\n00:00:01,000 --> 00:00:04,000\nFR: alpha line\n\n2\n"));
    assert!(written.ends_with("FR: charlie line\n"));
    Ok(())
}

#[tokio::test]
async fn test_runFile_withExistingOutput_shouldSkipUnlessForced() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_subtitle(temp_dir.path(), "episode.srt")?;
    let existing = common::create_test_file(temp_dir.path(), "episode.fr.srt", "old")?;
    let model = MockModel::echo();
    let controller = controller_with(model.clone(), 1);

    let skipped = controller.run_file(&input, false).await?;
    assert_eq!(skipped, FileOutcome::Skipped(existing.clone()));
    assert_eq!(model.call_count(), 0);
    assert_eq!(fs::read_to_string(&existing)?, "old");

    let forced = controller.run_file(&input, true).await?;
    assert_eq!(forced, FileOutcome::Translated(existing.clone()));
    assert_ne!(fs::read_to_string(&existing)?, "old");
    Ok(())
}

#[tokio::test]
async fn test_runFile_withFailingChunk_shouldWritePartialOutputAndErrorLog() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_subtitle(temp_dir.path(), "episode.srt")?;
    let controller = controller_with(MockModel::scripted(fail_on_charlie), 1);

    let outcome = controller.run_file(&input, false).await?;

    let partial_path = temp_dir.path().join("episode.fr.partial.srt");
    let log_path = temp_dir.path().join("episode.fr.errors.log");
    assert_eq!(
        outcome,
        FileOutcome::Failed {
            partial_path: Some(partial_path.clone()),
            log_path: log_path.clone(),
        }
    );
    assert!(!temp_dir.path().join("episode.fr.srt").exists());

    let partial = fs::read_to_string(&partial_path)?;
    assert!(partial.contains("FR: alpha line"));
    assert!(partial.contains("FR: bravo line"));
    assert!(!partial.contains("charlie"));

    let log = fs::read_to_string(&log_path)?;
    assert!(log.contains("Kind: RefuseToTranslate"));
    assert!(log.contains("Chunk: 3"));
    Ok(())
}

#[tokio::test]
async fn test_run_withDirectory_shouldTranslateEachSourceOnce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let nested = temp_dir.path().join("season1");
    fs::create_dir_all(&nested)?;
    common::create_test_subtitle(temp_dir.path(), "pilot.srt")?;
    common::create_test_subtitle(&nested, "finale.srt")?;
    common::create_test_file(temp_dir.path(), "broken.srt", "not a subtitle\n")?;
    let model = MockModel::echo();
    let controller = controller_with(model.clone(), 2);

    let summary = controller.run(temp_dir.path(), false).await?;

    assert_eq!(
        summary,
        RunSummary {
            translated: 2,
            skipped: 0,
            failed: 1,
        }
    );
    assert!(!summary.is_success());
    assert!(temp_dir.path().join("pilot.fr.srt").exists());
    assert!(nested.join("finale.fr.srt").exists());

    // Outputs of the first run are neither retranslated nor treated as sources
    let calls_after_first_run = model.call_count();
    let second = controller.run(temp_dir.path(), false).await?;
    assert_eq!(second.skipped, 2);
    assert_eq!(model.call_count(), calls_after_first_run);
    assert!(!temp_dir.path().join("pilot.fr.fr.srt").exists());
    Ok(())
}

#[test]
fn test_run_withMissingPath_shouldFail() {
    let controller = controller_with(MockModel::echo(), 1);
    let result = tokio_test::block_on(controller.run(Path::new("definitely/missing/input.srt"), false));
    assert!(result.is_err());
}
