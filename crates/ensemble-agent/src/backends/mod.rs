pub mod ollama;
pub mod openai;

use ensemble_core::EnsembleResult;
use async_trait::async_trait;

/// Trait for generative backends: one system instruction and one user
/// prompt in, plain text out.
///
/// To add a new provider:
/// 1. Create a new module in `backends/`
/// 2. Implement `InferenceBackend` for your struct
/// 3. Add the variant to `LlmProvider` in `config.rs`
/// 4. Wire it up in `BackendClient::new()` in `llm.rs`
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Single non-streaming completion.
    async fn generate(&self, system_prompt: &str, prompt: &str) -> EnsembleResult<String>;

    /// Short provider name used in logs.
    fn name(&self) -> &str;
}
