use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    types::{ChatCompletionRequestUserMessage, CreateChatCompletionRequestArgs},
    Client,
};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::{error::AppError, utils::config::AppConfig};

/// A completion together with the model that actually produced it.
#[derive(Debug, Clone)]
pub struct LlmCompletion {
    pub text: String,
    pub model: String,
}

/// Chat-completion client over an OpenAI-compatible endpoint with an
/// ordered model fallback chain. Every call is bounded by `call_timeout`;
/// a failed model (rate limit, network, empty output) advances the chain
/// after `request_delay`.
#[derive(Clone)]
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    chain: Vec<String>,
    request_delay: Duration,
    call_timeout: Duration,
}

impl LlmClient {
    pub fn new(
        client: Client<OpenAIConfig>,
        chain: Vec<String>,
        request_delay: Duration,
        call_timeout: Duration,
    ) -> Self {
        Self {
            client,
            chain,
            request_delay,
            call_timeout,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let client = Client::with_config(
            OpenAIConfig::new()
                .with_api_key(&config.llm_api_key)
                .with_api_base(&config.llm_base_url),
        );

        Self::new(
            client,
            config.model_chain(),
            Duration::from_secs(config.llm_request_delay_secs),
            Duration::from_secs(config.llm_timeout_secs),
        )
    }

    /// The delay observed between consecutive calls; workers reuse it for
    /// their own inter-request pacing.
    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    pub fn primary_model(&self) -> Option<&str> {
        self.chain.first().map(String::as_str)
    }

    /// One chat call against a specific model.
    pub async fn generate_with_model(
        &self,
        model: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, AppError> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages([ChatCompletionRequestUserMessage::from(prompt).into()])
            .temperature(temperature)
            .max_tokens(max_tokens)
            .build()?;

        let response = timeout(self.call_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                AppError::Processing(format!(
                    "LLM call timed out after {}s",
                    self.call_timeout.as_secs()
                ))
            })??;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_ref())
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(AppError::LLMParsing(format!(
                "model {model} returned an empty completion"
            )));
        }

        Ok(content)
    }

    /// Walk the fallback chain until one model answers.
    pub async fn generate(
        &self,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<LlmCompletion, AppError> {
        let mut last_error: Option<AppError> = None;

        for (position, model) in self.chain.iter().enumerate() {
            if position > 0 {
                sleep(self.request_delay).await;
            }

            debug!(%model, "trying model");
            match self
                .generate_with_model(model, prompt, temperature, max_tokens)
                .await
            {
                Ok(text) => {
                    return Ok(LlmCompletion {
                        text,
                        model: model.clone(),
                    })
                }
                Err(err) => {
                    warn!(%model, error = %err, "model failed; advancing fallback chain");
                    last_error = Some(err);
                }
            }
        }

        Err(AppError::LlmExhausted(
            last_error.map_or_else(|| "empty model chain".to_string(), |err| err.to_string()),
        ))
    }
}
