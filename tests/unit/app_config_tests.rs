/*!
 * Tests for configuration loading and validation
 */

use anyhow::Result;
use std::str::FromStr;
use subtrans::app_config::{Config, LogLevel, TranslationProvider, parse_endpoint};

use crate::common;

fn ollama_config() -> Config {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::Ollama;
    config
}

/// A missing file is created with the defaults
#[test]
fn test_loadOrCreate_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let config = Config::load_or_create(&path)?;

    assert!(path.exists());
    assert_eq!(config.target_language, "English");
    assert_eq!(config.translation.common.worker_count, 1);
    assert_eq!(config.translation.common.tokens_per_chunk, 2500);
    assert_eq!(config.translation.common.max_retries, 3);
    assert!(!config.translation.common.retry_on_refusal);
    Ok(())
}

/// Omitted common settings take their defaults
#[test]
fn test_loadOrCreate_withPartialFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{
            "target_language": "de",
            "translation": {
                "provider": "ollama",
                "common": { "worker_count": 4, "retry_on_refusal": true }
            }
        }"#,
    )?;

    let config = Config::load_or_create(&path)?;

    assert_eq!(config.target_language, "de");
    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.common.worker_count, 4);
    assert!(config.translation.common.retry_on_refusal);
    assert_eq!(config.translation.common.tokens_per_chunk, 2500);
    assert_eq!(config.log_level, LogLevel::Info);
    assert_eq!(config.translation.get_model(), "llama3.1");
    Ok(())
}

/// Saving then loading keeps user settings
#[test]
fn test_save_thenLoad_shouldKeepSettings() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let mut config = ollama_config();
    config.target_language = "Japanese".to_string();
    config.translation.common.temperature = 0.7;
    config.save(&path)?;

    let loaded = Config::load_or_create(&path)?;
    assert_eq!(loaded.target_language, "Japanese");
    assert_eq!(loaded.translation.common.temperature, 0.7);
    Ok(())
}

#[test]
fn test_validate_withLocalProvider_shouldSucceed() {
    assert!(ollama_config().validate().is_ok());
}

#[test]
fn test_validate_withZeroWorkers_shouldFail() {
    let mut config = ollama_config();
    config.translation.common.worker_count = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withOutOfRangeTemperature_shouldFail() {
    let mut config = ollama_config();
    config.translation.common.temperature = 3.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withMissingPromptFile_shouldFail() {
    let mut config = ollama_config();
    config.translation.common.prompt_file = Some("does/not/exist.txt".into());
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_withHostedProviderKeyInConfig_shouldSucceed() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::OpenAI;
    for provider in config.translation.available_providers.iter_mut() {
        if provider.provider_type == "openai" {
            provider.api_key = "sk-test".to_string();
        }
    }
    assert!(config.validate().is_ok());
    assert_eq!(config.translation.get_api_key(), "sk-test");
}

#[test]
fn test_translationProvider_fromStr_shouldAcceptAliases() {
    assert_eq!(TranslationProvider::from_str("claude").unwrap(), TranslationProvider::Anthropic);
    assert_eq!(TranslationProvider::from_str("GPT").unwrap(), TranslationProvider::OpenAI);
    assert_eq!(TranslationProvider::from_str("lmstudio").unwrap(), TranslationProvider::LMStudio);
    assert_eq!(TranslationProvider::from_str("google").unwrap(), TranslationProvider::Gemini);
    assert!(TranslationProvider::from_str("unknown").is_err());
}

#[test]
fn test_parseEndpoint_withBareHost_shouldAssumeHttp() {
    let url = parse_endpoint("localhost:11434").unwrap();
    assert_eq!(url.scheme(), "http");
    assert_eq!(url.port(), Some(11434));
    assert!(parse_endpoint("").is_err());
}

#[test]
fn test_validate_withBrokenEndpoint_shouldFail() {
    let mut config = ollama_config();
    for provider in config.translation.available_providers.iter_mut() {
        if provider.provider_type == "ollama" {
            provider.endpoint = "http://".to_string();
        }
    }
    assert!(config.validate().is_err());
}
