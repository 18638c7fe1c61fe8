use std::time::Instant;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::http::{self, RetryPolicy};
use super::{Generation, ModelCapability, TokenEstimator, TokenUsageStats, UsageTracker};
use crate::errors::ProviderError;

/// Harm categories whose blocking threshold is switched off for translation
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Client for the Gemini `generateContent` API
#[derive(Debug)]
pub struct Gemini {
    client: Client,
    api_key: String,
    /// Base URL up to the API version, e.g. `.../v1beta`
    endpoint: String,
    model: String,
    max_output_tokens: usize,
    policy: RetryPolicy,
    estimator: TokenEstimator,
    usage: UsageTracker,
}

/// `generateContent` request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting>,
}

/// `countTokens` request
#[derive(Debug, Serialize)]
pub struct CountTokensRequest {
    contents: Vec<Content>,
}

/// One conversation turn
#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

/// Text part of a turn
#[derive(Debug, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: String,
    threshold: String,
}

/// `generateContent` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    pub usage_metadata: Option<UsageMetadata>,
}

/// One generated candidate
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Set when the prompt itself was blocked
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

/// Token accounting; thinking tokens count as output
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub thoughts_token_count: u64,
}

/// `countTokens` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountTokensResponse {
    pub total_tokens: u64,
}

impl GenerateContentRequest {
    /// Single user turn with every harm filter off
    pub fn new(prompt: impl Into<String>, temperature: f32, max_output_tokens: u32) -> Self {
        Self {
            contents: vec![Content::user(prompt)],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens,
            },
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: category.to_string(),
                    threshold: "OFF".to_string(),
                })
                .collect(),
        }
    }
}

impl Content {
    fn user(text: impl Into<String>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts: vec![Part { text: text.into() }],
        }
    }
}

impl UsageMetadata {
    /// Output tokens including thinking
    pub fn output_tokens(&self) -> u64 {
        self.candidates_token_count + self.thoughts_token_count
    }
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| content.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    fn finish_reason(&self) -> Option<&str> {
        self.candidates.first().and_then(|c| c.finish_reason.as_deref())
    }

    /// Response text, or the error an empty response stands for.
    ///
    /// An empty answer stopped by `SAFETY` is a content-policy block and one
    /// stopped by `MAX_TOKENS` hit the output ceiling. Any other empty answer
    /// is passed on as its finish reason so the validator can classify it.
    pub fn into_text(self) -> Result<String, ProviderError> {
        let text = self.text();
        if !text.is_empty() {
            return Ok(text);
        }

        if let Some(reason) = self.prompt_feedback.as_ref().and_then(|f| f.block_reason.as_deref()) {
            return Err(ProviderError::ContentRefused(format!("prompt blocked: {}", reason)));
        }

        match self.finish_reason() {
            Some("SAFETY") => Err(ProviderError::ContentRefused("finish reason SAFETY".to_string())),
            Some("MAX_TOKENS") => Err(ProviderError::OutputTruncated(
                "finish reason MAX_TOKENS with no text".to_string(),
            )),
            Some(other) => Ok(format!("finish_reason: {}", other)),
            None => Ok(String::new()),
        }
    }
}

impl Gemini {
    /// Create a new Gemini client
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        max_output_tokens: usize,
        policy: RetryPolicy,
    ) -> Self {
        let model = model.into();
        Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            usage: UsageTracker::new("gemini", model.clone()),
            model,
            max_output_tokens,
            policy,
            estimator: TokenEstimator::default(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/models/{}:{}", self.endpoint.trim_end_matches('/'), self.model, method)
    }

    fn decorate(&self) -> impl Fn(RequestBuilder) -> RequestBuilder + '_ {
        move |builder| builder.header("x-goog-api-key", &self.api_key)
    }

    /// Complete a `generateContent` request
    pub async fn complete(&self, request: &GenerateContentRequest) -> Result<GenerateContentResponse, ProviderError> {
        http::post_json(
            &self.client,
            &self.url("generateContent"),
            request,
            self.policy,
            "Gemini",
            self.decorate(),
            |_, _| None,
        )
        .await
    }

    /// Count the tokens of `text` as one user turn
    pub async fn count_tokens(&self, text: &str) -> Result<u64, ProviderError> {
        let request = CountTokensRequest {
            contents: vec![Content::user(text)],
        };
        let response: CountTokensResponse = http::post_json(
            &self.client,
            &self.url("countTokens"),
            &request,
            self.policy,
            "Gemini",
            self.decorate(),
            |_, _| None,
        )
        .await?;
        Ok(response.total_tokens.max(1))
    }
}

#[async_trait]
impl ModelCapability for Gemini {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation, ProviderError> {
        let request = GenerateContentRequest::new(prompt, temperature, self.max_output_tokens as u32);

        let started = Instant::now();
        let mut response = self.complete(&request).await?;
        let usage = response.usage_metadata.take().unwrap_or_default();
        self.usage.record(
            Some(usage.prompt_token_count),
            Some(usage.output_tokens()),
            started.elapsed(),
        );

        let text = response.into_text()?;
        debug!("Gemini returned {} output tokens", usage.output_tokens());
        Ok(Generation::new(text, usage.output_tokens() as usize))
    }

    fn estimate_tokens(&self, text: &str) -> usize {
        self.estimator.estimate(text)
    }

    fn max_output_tokens(&self) -> usize {
        self.max_output_tokens
    }

    async fn calibrate(&self, document: &str) -> Result<(), ProviderError> {
        match self.count_tokens(document).await {
            Ok(measured) => {
                self.estimator.calibrate(document, measured as usize);
                Ok(())
            }
            Err(e) => {
                warn!("Token counting failed, keeping local estimate: {}", e);
                Err(e)
            }
        }
    }

    fn usage(&self) -> TokenUsageStats {
        self.usage.snapshot()
    }
}
