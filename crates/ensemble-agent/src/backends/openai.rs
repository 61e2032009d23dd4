use super::InferenceBackend;
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use ensemble_core::{EnsembleError, EnsembleResult};

/// OpenAI-compatible chat completions backend.
///
/// Works with OpenAI, OpenRouter, Groq and any other provider that
/// implements the `/v1/chat/completions` API.
pub struct OpenAiBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_messages(&self, system_prompt: &str, prompt: &str) -> Vec<serde_json::Value> {
        let mut api_messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": system_prompt
            }));
        }
        api_messages.push(serde_json::json!({
            "role": "user",
            "content": prompt
        }));
        api_messages
    }

    fn add_provider_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request.header("Content-Type", "application/json");
        let request = if self.config.api_key.is_empty() {
            request
        } else {
            request.header("Authorization", format!("Bearer {}", self.config.api_key))
        };

        // OpenRouter requires extra headers
        if matches!(self.config.provider, LlmProvider::OpenRouter) {
            request.header("X-Title", "ensemble")
        } else {
            request
        }
    }
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> EnsembleResult<String> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(system_prompt, prompt),
        });

        let resp = self
            .add_provider_headers(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| EnsembleError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body = resp
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(EnsembleError::Transport(format!(
                "OpenAI API error {status}: {error_body}"
            )));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EnsembleError::Transport(e.to_string()))?;

        parse_openai_response(&resp_body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

fn parse_openai_response(body: &serde_json::Value) -> EnsembleResult<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            EnsembleError::Validation(format!("No message content in OpenAI response: {body}"))
        })
}
