use std::time::Instant;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use super::http::{self, RetryPolicy};
use super::{Generation, ModelCapability, TokenEstimator, TokenUsageStats, UsageTracker};
use crate::errors::ProviderError;

/// Ollama client for interacting with Ollama API
#[derive(Debug)]
pub struct Ollama {
    /// Base URL of the Ollama API
    base_url: String,
    /// HTTP client for making requests
    client: Client,
    model: String,
    max_output_tokens: usize,
    policy: RetryPolicy,
    estimator: TokenEstimator,
    usage: UsageTracker,
}

/// Generate request for the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model name to use for generation
    model: String,
    /// Prompt to generate from
    prompt: String,
    /// Additional model parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<GenerationOptions>,
    /// Whether to stream the response
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

/// Generation options for the Ollama API
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Temperature for generation (default: 0.8)
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    /// Maximum number of tokens to generate
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Generation response from the Ollama API
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model name
    #[serde(default)]
    pub model: String,
    /// Generated text
    pub response: String,
    /// Whether the generation is complete
    #[serde(default)]
    pub done: bool,
    /// Why generation stopped (`stop` or `length`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub done_reason: Option<String>,
    /// Number of prompt tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_eval_count: Option<u64>,
    /// Number of generated tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_count: Option<u64>,
}

impl GenerationRequest {
    /// Create a new generation request
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: None,
            stream: None,
        }
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).temperature = Some(temperature);
        self
    }

    /// Cap the number of generated tokens
    pub fn num_predict(mut self, num_predict: u32) -> Self {
        self.options.get_or_insert_with(GenerationOptions::default).num_predict = Some(num_predict);
        self
    }

    /// Disable streaming
    pub fn no_stream(mut self) -> Self {
        self.stream = Some(false);
        self
    }
}

impl Ollama {
    /// Create a new Ollama client for `endpoint` (e.g. `http://localhost:11434`)
    pub fn new(
        client: Client,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        max_output_tokens: usize,
        policy: RetryPolicy,
    ) -> Self {
        let endpoint = endpoint.into();
        // Accept a bare host:port as well as a full URL
        let base_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", endpoint.trim_end_matches('/'))
        };
        let model = model.into();

        Self {
            base_url,
            client,
            usage: UsageTracker::new("ollama", model.clone()),
            model,
            max_output_tokens,
            policy,
            estimator: TokenEstimator::default(),
        }
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generate text from the Ollama API with retry logic
    pub async fn generate_raw(&self, request: &GenerationRequest) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/api/generate", self.base_url);
        http::post_json(
            &self.client,
            &url,
            request,
            self.policy,
            "Ollama",
            |builder: RequestBuilder| builder,
            |_, _| None,
        )
        .await
    }
}

#[async_trait]
impl ModelCapability for Ollama {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation, ProviderError> {
        let request = GenerationRequest::new(&self.model, prompt)
            .temperature(temperature)
            .num_predict(self.max_output_tokens as u32)
            .no_stream();

        let started = Instant::now();
        let response = self.generate_raw(&request).await?;
        self.usage
            .record(response.prompt_eval_count, response.eval_count, started.elapsed());

        let output_tokens = match (response.eval_count, response.done_reason.as_deref()) {
            (Some(count), _) => count as usize,
            // Older servers omit eval_count; a length stop still means the ceiling was hit
            (None, Some("length")) => self.max_output_tokens,
            (None, _) => self.estimator.estimate(&response.response),
        };
        debug!("Ollama returned {} output tokens", output_tokens);
        Ok(Generation::new(response.response, output_tokens))
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
