//! Generative backends, the resilient inference client and the agent
//! capability interface.
//!
//! # Main types
//!
//! - [`InferenceBackend`] — Prompt-in, text-out provider trait.
//! - [`BackendClient`] — Dispatches to the configured provider.
//! - [`ResilientClient`] — Retries, deadlines and schema-validated replies.
//! - [`StructuredReply`] / [`FallbackError`] — Structured call outcome.
//! - [`AgentHandle`] — What the orchestrator may call on an agent.
//! - [`DefaultAgentFactory`] — Builds worker variants by capability tag.

pub mod backends;
pub mod config;
pub mod factory;
pub mod handle;
pub mod llm;
pub mod profiles;
pub mod resilient;
pub mod structured;
pub mod workers;

pub use backends::ollama::OllamaBackend;
pub use backends::openai::OpenAiBackend;
pub use backends::InferenceBackend;
pub use config::{LlmProvider, ModelConfig};
pub use factory::{AgentFactory, DefaultAgentFactory};
pub use handle::{AgentContext, AgentHandle};
pub use llm::BackendClient;
pub use profiles::{canonical_capability, default_profiles, required_capabilities, AgentKind, AgentProfile};
pub use resilient::{compute_backoff, CallState, ResilientClient, RetryPolicy};
pub use structured::{parse_json_response, FallbackError, SchemaValidator, StructuredReply};
pub use workers::{CodingAgent, GeneralAgent, ReviewAgent};
