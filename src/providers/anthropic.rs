use std::time::Instant;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use super::http::{self, RetryPolicy};
use super::{Generation, ModelCapability, TokenEstimator, TokenUsageStats, UsageTracker};
use crate::errors::ProviderError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Marker of a content-policy block in Anthropic error bodies
const CONTENT_FILTER_MARKER: &str = "content filtering policy";

/// Anthropic client for interacting with Anthropic API
#[derive(Debug)]
pub struct Anthropic {
    /// HTTP client for API requests
    client: Client,
    /// API key for authentication
    api_key: String,
    /// API endpoint URL
    endpoint: String,
    /// Model name
    model: String,
    /// Output ceiling sent as `max_tokens`
    max_output_tokens: usize,
    /// Transport retry policy
    policy: RetryPolicy,
    estimator: TokenEstimator,
    usage: UsageTracker,
}

/// Anthropic message request
#[derive(Debug, Serialize)]
pub struct AnthropicRequest {
    /// The model to use
    model: String,

    /// The messages for the conversation
    messages: Vec<AnthropicMessage>,

    /// Temperature for generation
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    /// Maximum number of tokens to generate
    max_tokens: u32,
}

/// Token counting request
#[derive(Debug, Serialize)]
pub struct CountTokensRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
}

/// Anthropic message format
#[derive(Debug, Serialize, Deserialize)]
pub struct AnthropicMessage {
    /// Role of the message sender (user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

/// Token usage information
#[derive(Debug, Deserialize)]
pub struct TokenUsage {
    /// Number of input tokens
    pub input_tokens: u32,
    /// Number of output tokens
    pub output_tokens: u32,
}

/// Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// The content of the response
    pub content: Vec<AnthropicContent>,
    /// Why generation stopped
    #[serde(default)]
    pub stop_reason: Option<String>,
    /// Token usage information
    pub usage: TokenUsage,
}

/// Token counting response
#[derive(Debug, Deserialize)]
pub struct CountTokensResponse {
    pub input_tokens: u64,
}

/// Individual content block in an Anthropic response
#[derive(Debug, Deserialize)]
pub struct AnthropicContent {
    /// The type of content
    #[serde(rename = "type")]
    pub content_type: String,

    /// The actual text content
    #[serde(default)]
    pub text: String,
}

impl AnthropicRequest {
    /// Create a new Anthropic request
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
            max_tokens,
        }
    }

    /// Add a message to the request
    pub fn add_message(mut self, role: impl Into<String>, content: impl Into<String>) -> Self {
        self.messages.push(AnthropicMessage {
            role: role.into(),
            content: content.into(),
        });
        self
    }

    /// Set the temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

impl Anthropic {
    /// Create a new Anthropic client
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
            usage: UsageTracker::new("anthropic", model.clone()),
            model,
            max_output_tokens,
            policy,
            estimator: TokenEstimator::default(),
        }
    }

    fn url(&self, path: &str) -> String {
        if self.endpoint.is_empty() {
            format!("https://api.anthropic.com{}", path)
        } else {
            format!("{}{}", self.endpoint.trim_end_matches('/'), path)
        }
    }

    fn decorate(&self) -> impl Fn(RequestBuilder) -> RequestBuilder + '_ {
        move |builder| {
            builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
        }
    }

    /// Complete a messages request
    pub async fn complete(&self, request: &AnthropicRequest) -> Result<AnthropicResponse, ProviderError> {
        http::post_json(
            &self.client,
            &self.url("/v1/messages"),
            request,
            self.policy,
            "Anthropic",
            self.decorate(),
            classify_error,
        )
        .await
    }

    /// Count input tokens of `text` as a single user message
    pub async fn count_tokens(&self, text: &str) -> Result<u64, ProviderError> {
        let request = CountTokensRequest {
            model: self.model.clone(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: text.to_string(),
            }],
        };
        let response: CountTokensResponse = http::post_json(
            &self.client,
            &self.url("/v1/messages/count_tokens"),
            &request,
            self.policy,
            "Anthropic",
            self.decorate(),
            |_, _| None,
        )
        .await?;
        Ok(response.input_tokens)
    }

    /// Extract text from Anthropic response
    pub fn extract_text_from_response(response: &AnthropicResponse) -> String {
        response
            .content
            .iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

/// Content-policy blocks come back as 400 responses
fn classify_error(status: StatusCode, body: &str) -> Option<ProviderError> {
    if status == StatusCode::BAD_REQUEST && body.to_lowercase().contains(CONTENT_FILTER_MARKER) {
        return Some(ProviderError::ContentRefused(body.to_string()));
    }
    None
}

#[async_trait]
impl ModelCapability for Anthropic {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<Generation, ProviderError> {
        let request = AnthropicRequest::new(&self.model, self.max_output_tokens as u32)
            .add_message("user", prompt)
            .temperature(temperature);

        let started = Instant::now();
        let response = self.complete(&request).await?;
        self.usage.record(
            Some(response.usage.input_tokens as u64),
            Some(response.usage.output_tokens as u64),
            started.elapsed(),
        );

        if response.stop_reason.as_deref() == Some("refusal") {
            return Err(ProviderError::ContentRefused("model stopped with a refusal".to_string()));
        }

        let text = Self::extract_text_from_response(&response);
        debug!("Anthropic returned {} output tokens", response.usage.output_tokens);
        Ok(Generation::new(text, response.usage.output_tokens as usize))
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
