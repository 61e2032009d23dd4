use super::InferenceBackend;
use crate::config::ModelConfig;
use async_trait::async_trait;
use ensemble_core::{EnsembleError, EnsembleResult};

/// Ollama `/api/generate` backend (non-streaming).
pub struct OllamaBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OllamaBackend {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> EnsembleResult<String> {
        let url = format!("{}/api/generate", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "prompt": prompt,
            "stream": false,
            "options": {"temperature": self.config.temperature},
        });
        if !system_prompt.is_empty() {
            body["system"] = serde_json::json!(system_prompt);
        }

        let resp = self
            .http
            .post(&url)
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
                "Ollama API error {status}: {error_body}"
            )));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| EnsembleError::Transport(e.to_string()))?;

        resp_body["response"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                EnsembleError::Validation(format!(
                    "Ollama response has no 'response' field: {resp_body}"
                ))
            })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
