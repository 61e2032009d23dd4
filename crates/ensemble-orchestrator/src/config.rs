use crate::completion::CompletionPredicate;
use crate::optimizer::OptimizerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Collaboration loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Hard cap on conversation rounds.
    pub max_rounds: u32,
    /// Per-call deadline for agent processing.
    pub agent_timeout_secs: u64,
    /// Outputs with confidence below this are flagged for review.
    pub review_threshold: f64,
    /// Prior knowledge records fetched per task.
    pub prior_context_limit: usize,
    /// When the round loop may stop before `max_rounds`.
    pub completion: CompletionPredicate,
    /// Reordering of ready subtasks.
    pub optimizer: OptimizerConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            agent_timeout_secs: 300,
            review_threshold: 0.7,
            prior_context_limit: 3,
            completion: CompletionPredicate::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Per-turn deadline.
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs.max(1))
    }

    /// `max_rounds`, never less than one.
    pub fn rounds(&self) -> u32 {
        self.max_rounds.max(1)
    }
}
