/*!
 * Engine-level tests: ordering, retries, cancellation and partial results
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use subtrans::errors::{FailureKind, ProviderError, TranslationError};
use subtrans::providers::Generation;
use subtrans::providers::mock::{MockBehavior, MockModel};
use subtrans::subtitle_processor::SubtitleCollection;
use subtrans::translation::batch::DEGENERATE_RETRY_TEMPERATURE;
use subtrans::translation::core::DEFAULT_TEMPERATURE;
use subtrans::translation::tags;
use subtrans::translation::{BatchTranslator, ChunkPlanner, PromptTemplate, TranslationOptions};

use crate::common::{self, SAMPLE_SRT};

const TRANSLATED_SRT: &str = "1
00:00:01,000 --> 00:00:04,000
FR: alpha line

2
00:00:05,000 --> 00:00:09,000
FR: bravo line

3
00:00:10,000 --> 00:00:14,000
FR: charlie line";

/// Chunk with "charlie" answers first, then "alpha", then "bravo"
fn staggered_latency(prompt: &str) -> u64 {
    if prompt.contains("charlie") {
        5
    } else if prompt.contains("alpha") {
        40
    } else {
        80
    }
}

/// Echoes every chunk except the one holding "bravo"
fn fail_on_bravo(prompt: &str, _call: usize) -> Result<Generation, ProviderError> {
    if prompt.contains("bravo") {
        return Err(ProviderError::ApiError {
            message: "bravo is unavailable".to_string(),
            status_code: 503,
        });
    }
    let text = tags::render_blocks(&tags::find_blocks(prompt));
    Ok(Generation::new(text, 10))
}

/// Chunk with "alpha" is slow, every other chunk answers at once
fn slow_alpha(prompt: &str) -> u64 {
    if prompt.contains("alpha") { 60 } else { 1 }
}

/// Echoes every block and repeats the first one at the end
fn repeat_first_block(prompt: &str, _call: usize) -> Result<Generation, ProviderError> {
    let mut blocks = tags::find_blocks(prompt);
    if let Some(first) = blocks.first().cloned() {
        blocks.push(first);
    }
    Ok(Generation::new(tags::render_blocks(&blocks), 10))
}

fn truncate_always(_prompt: &str, _call: usize) -> Result<Generation, ProviderError> {
    Err(ProviderError::OutputTruncated("MAX_TOKENS".to_string()))
}

/// Document with `count` one-line entries, `line 1` .. `line count`
fn numbered_document(count: usize) -> String {
    (1..=count)
        .map(|i| format!("{}\n00:00:{:02},000 --> 00:00:{:02},500\nline {}\n", i, i, i, i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn block_texts(prompt: &str) -> Vec<String> {
    tags::find_blocks(prompt).into_iter().map(|b| b.text).collect()
}

#[tokio::test]
async fn test_translateSubtitles_withReorderedCompletion_shouldKeepChunkOrder() {
    common::init_logging();
    let model = MockModel::translating("FR: ").with_latency(staggered_latency);
    let (service, model) = common::service_with(model, common::one_block_per_chunk(3));

    let output = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap();

    assert_eq!(output, TRANSLATED_SRT);
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn test_translateSubtitles_shouldReportMonotonicProgress() {
    let (service, _) = common::service_with(MockModel::echo(), common::one_block_per_chunk(2));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    service
        .translate_subtitles(SAMPLE_SRT, move |fraction| sink.lock().push(fraction))
        .await
        .unwrap();

    let seen = seen.lock().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.last().copied(), Some(1.0));
}

#[tokio::test]
async fn test_translateSubtitles_withFirstChunkFailing_shouldCancelRemainingChunks() {
    let (service, model) = common::service_with(MockModel::failing(), common::one_block_per_chunk(1));

    let error = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap_err();

    let chunk_error = error.chunk_error().unwrap();
    assert_eq!(chunk_error.kind, FailureKind::Provider);
    assert_eq!(chunk_error.chunk_index, 0);
    assert_eq!(model.call_count(), 1);
    assert!(error.partial_translation().is_none());
}

#[tokio::test]
async fn test_translateSubtitles_withMiddleChunkFailing_shouldReturnEarlierChunks() {
    let (service, model) = common::service_with(MockModel::scripted(fail_on_bravo), common::one_block_per_chunk(1));

    let error = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap_err();

    match &error {
        TranslationError::Aggregate {
            source,
            partial_translation,
        } => {
            assert_eq!(source.chunk_index, 1);
            assert_eq!(partial_translation, "1\n00:00:01,000 --> 00:00:04,000\nalpha line");
        }
        other => panic!("expected an aggregate error, got {:?}", other),
    }
    assert_eq!(model.call_count(), 2);
    assert!(error.to_string().contains("ProviderFailure"));
}

#[tokio::test]
async fn test_translateSubtitles_withConcurrentFailure_shouldNotStartQueuedChunks() {
    let model = MockModel::scripted(fail_on_bravo).with_latency(slow_alpha);
    let (service, model) = common::service_with(model, common::one_block_per_chunk(2));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    let error = service
        .translate_subtitles(SAMPLE_SRT, move |fraction| sink.lock().push(fraction))
        .await
        .unwrap_err();

    assert_eq!(error.chunk_error().map(|e| e.chunk_index), Some(1));
    // Chunk 1 was in flight and finished, but its result is discarded
    assert!(error.partial_translation().is_none());
    assert_eq!(model.call_count(), 2);
    assert!(model.prompts().iter().all(|p| !p.contains("charlie")));
    assert_eq!(*seen.lock(), vec![1.0 / 3.0]);
}

#[tokio::test]
async fn test_translateSubtitles_withRepeatedBlock_shouldKeepIdsUnique() {
    let (service, _) = common::service_with(MockModel::scripted(repeat_first_block), TranslationOptions::default());

    let output = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap();

    assert_eq!(output, SAMPLE_SRT.trim());
    assert_eq!(SubtitleCollection::parse_srt_string(&output).unwrap().len(), 3);
}

#[tokio::test]
async fn test_translateSubtitles_withProviderTruncation_shouldFailAsTooLong() {
    let (service, model) = common::service_with(MockModel::scripted(truncate_always), TranslationOptions::default());

    let error = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap_err();

    assert_eq!(error.chunk_error().map(|e| e.kind), Some(FailureKind::TooLong));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_translateSubtitles_withLostSubtitleOnce_shouldRetryAndSucceed() {
    let (service, model) = common::service_with(MockModel::dropping_first(1), TranslationOptions::default());

    let output = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap();

    assert_eq!(output, SAMPLE_SRT.trim());
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_translateSubtitles_withPersistentLoss_shouldFailAfterMaxRetries() {
    let options = TranslationOptions {
        max_retries: 2,
        ..TranslationOptions::default()
    };
    let (service, model) = common::service_with(MockModel::dropping_first(usize::MAX), options);

    let error = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap_err();

    let chunk_error = error.chunk_error().unwrap();
    assert_eq!(chunk_error.kind, FailureKind::PartialLoss);
    assert_eq!(chunk_error.attempts, 3);
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn test_translateSubtitles_withRefusalAndNoRetry_shouldStopAtFirstAttempt() {
    let (service, model) = common::service_with(MockModel::refusing(), TranslationOptions::default());

    let error = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap_err();

    let chunk_error = error.chunk_error().unwrap();
    assert_eq!(chunk_error.kind, FailureKind::Refusal);
    assert!(chunk_error.raw_output.contains("can't help"));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_translateSubtitles_withRefusalAndRetryEnabled_shouldRetry() {
    let options = TranslationOptions {
        retry_on_refusal: true,
        max_retries: 2,
        ..TranslationOptions::default()
    };
    let (service, model) = common::service_with(MockModel::refusing(), options);

    let error = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap_err();

    assert_eq!(error.chunk_error().map(|e| e.kind), Some(FailureKind::Refusal));
    assert_eq!(model.call_count(), 3);
}

#[tokio::test]
async fn test_translateSubtitles_withContentPolicyBlock_shouldReportRefusal() {
    let (service, model) =
        common::service_with(MockModel::new(MockBehavior::ContentPolicy), TranslationOptions::default());

    let error = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap_err();

    assert_eq!(error.chunk_error().map(|e| e.kind), Some(FailureKind::Refusal));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_translateSubtitles_withDegenerateResponse_shouldRaiseTemperatureForNextAttempt() {
    let (service, model) =
        common::service_with(MockModel::new(MockBehavior::Repeat { times: 1 }), TranslationOptions::default());

    let output = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap();

    assert_eq!(output, SAMPLE_SRT.trim());
    assert_eq!(model.temperatures(), vec![DEFAULT_TEMPERATURE, DEGENERATE_RETRY_TEMPERATURE]);
}

#[tokio::test]
async fn test_translateSubtitles_withResponseAtCeiling_shouldFailWithoutRetry() {
    let (service, model) =
        common::service_with(MockModel::new(MockBehavior::Truncated), TranslationOptions::default());

    let error = service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap_err();

    assert_eq!(error.chunk_error().map(|e| e.kind), Some(FailureKind::TooLong));
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_translateSubtitles_withRetries_shouldNotExposeOriginalIdsAfterFirstAttempt() {
    let options = TranslationOptions {
        max_retries: 3,
        ..TranslationOptions::default()
    };
    let (service, model) = common::service_with(MockModel::dropping_first(2), options);

    service.translate_subtitles(SAMPLE_SRT, |_| {}).await.unwrap();

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 3);
    assert_eq!(tags::block_ids(&prompts[0]), vec![1, 2, 3]);
    for prompt in &prompts[1..] {
        let ids = tags::block_ids(prompt);
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|id| (1..30).contains(id)));
    }
}

#[test]
fn test_translateChunks_withPresetCancellation_shouldNotCallModel() {
    let model = MockModel::echo();
    let translator = BatchTranslator::new(
        Arc::new(model.clone()),
        PromptTemplate::default(),
        TranslationOptions::default(),
    );
    let chunks = ChunkPlanner::new(1).plan_text("<1>a</1>\n<2>b</2>", |s| s.len());
    let cancelled = Arc::new(AtomicBool::new(true));

    let outcome = tokio_test::block_on(translator.translate_chunks_with_cancellation(
        &chunks,
        Arc::clone(&cancelled),
        |_| {},
    ));

    assert!(cancelled.load(Ordering::SeqCst));
    assert_eq!(outcome.translations, vec![None, None]);
    assert!(outcome.failure.is_none());
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_translateSubtitles_fromThirdAttempt_shouldShuffleBlockOrder() {
    let document = numbered_document(20);
    let source_texts: Vec<String> = (1..=20).map(|i| format!("line {i}")).collect();
    let options = TranslationOptions {
        max_retries: 3,
        ..TranslationOptions::default()
    };
    let (service, model) = common::service_with(MockModel::dropping_first(2), options);

    let output = service.translate_subtitles(&document, |_| {}).await.unwrap();

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 3);
    assert_eq!(block_texts(&prompts[0]), source_texts);
    assert_eq!(block_texts(&prompts[1]), source_texts);

    // 20 blocks: an identity permutation is practically impossible
    let third = block_texts(&prompts[2]);
    assert_ne!(third, source_texts);
    let mut sorted = third.clone();
    sorted.sort();
    let mut expected = source_texts.clone();
    expected.sort();
    assert_eq!(sorted, expected);

    assert_eq!(output, document.trim());
}
