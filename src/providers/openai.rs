use std::time::Instant;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::http::{self, RetryPolicy};
use super::{Generation, ModelCapability, TokenEstimator, TokenUsageStats, UsageTracker};
use crate::errors::ProviderError;

/// Client for the OpenAI Chat Completions API and compatible local servers
#[derive(Debug)]
pub struct OpenAI {
    client: Client,
    /// Name used in logs and usage reports
    provider_name: String,
    /// Bearer token, empty for local servers
    api_key: String,
    /// Base URL including the `/v1` prefix
    endpoint: String,
    model: String,
    max_output_tokens: usize,
    policy: RetryPolicy,
    estimator: TokenEstimator,
    usage: UsageTracker,
}

/// Chat completion request
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

/// Chat message
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

/// Chat completion response
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

/// One completion choice
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage block
#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl OpenAI {
    /// Create a new client
    pub fn new(
        client: Client,
        provider_name: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        max_output_tokens: usize,
        policy: RetryPolicy,
    ) -> Self {
        let provider_name = provider_name.into();
        let model = model.into();
        Self {
            client,
            usage: UsageTracker::new(provider_name.clone(), model.clone()),
            provider_name,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            model,
            max_output_tokens,
            policy,
            estimator: TokenEstimator::default(),
        }
    }

    fn decorate(&self) -> impl Fn(RequestBuilder) -> RequestBuilder + '_ {
        move |builder| {
            if self.api_key.is_empty() {
                builder
            } else {
                builder.bearer_auth(&self.api_key)
            }
        }
    }

    /// Send a chat completion request
    pub async fn complete(&self, request: &ChatCompletionRequest) -> Result<ChatCompletionResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        http::post_json(
            &self.client,
            &url,
            request,
            self.policy,
            &self.provider_name,
            self.decorate(),
            |_, _| None,
        )
        .await
    }
}

#[async_trait]
impl ModelCapability for OpenAI {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation, ProviderError> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "system".to_string(),
                content: Some(prompt.to_string()),
            }],
            temperature,
            max_tokens: self.max_output_tokens as u32,
        };

        let started = Instant::now();
        let response = self.complete(&request).await?;
        let output_tokens = response.usage.as_ref().map(|u| u.completion_tokens);
        self.usage.record(
            response.usage.as_ref().map(|u| u.prompt_tokens),
            output_tokens,
            started.elapsed(),
        );

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ParseError("response contains no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ProviderError::ContentRefused(format!(
                "{} stopped generation with finish_reason content_filter",
                self.provider_name
            )));
        }

        let text = choice.message.content.unwrap_or_default();
        // Local servers may omit usage; fall back to the estimate
        let output_tokens = output_tokens.map(|t| t as usize).unwrap_or_else(|| self.estimator.estimate(&text));
        debug!("{} returned {} output tokens", self.provider_name, output_tokens);
        Ok(Generation::new(text, output_tokens))
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
