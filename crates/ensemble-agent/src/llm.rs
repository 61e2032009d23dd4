use crate::backends::ollama::OllamaBackend;
use crate::backends::openai::OpenAiBackend;
use crate::backends::InferenceBackend;
use crate::config::{LlmProvider, ModelConfig};
use async_trait::async_trait;
use ensemble_core::EnsembleResult;

/// Client that dispatches to the configured provider backend.
pub struct BackendClient {
    backend: Box<dyn InferenceBackend>,
}

impl BackendClient {
    /// Build the backend for `config.provider`.
    pub fn new(config: ModelConfig) -> Self {
        let backend: Box<dyn InferenceBackend> = match config.provider {
            LlmProvider::Ollama => Box::new(OllamaBackend::new(config)),
            LlmProvider::OpenAi | LlmProvider::OpenRouter | LlmProvider::Groq => {
                Box::new(OpenAiBackend::new(config))
            }
        };
        Self { backend }
    }

    /// Create from a pre-built backend (for custom/external providers).
    pub fn from_backend(backend: Box<dyn InferenceBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl InferenceBackend for BackendClient {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> EnsembleResult<String> {
        self.backend.generate(system_prompt, prompt).await
    }

    fn name(&self) -> &str {
        self.backend.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_provider() {
        let ollama = BackendClient::new(ModelConfig::default());
        assert_eq!(ollama.name(), "ollama");

        let groq = BackendClient::new(ModelConfig {
            provider: LlmProvider::Groq,
            ..ModelConfig::default()
        });
        assert_eq!(groq.name(), "openai");
    }
}
