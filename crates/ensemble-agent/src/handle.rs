use async_trait::async_trait;
use ensemble_core::{AgentOutput, EnsembleResult, PeerMessage, Strategy, Subtask};
use std::collections::BTreeMap;

/// Everything an agent gets besides the subtask itself.
#[derive(Debug, Clone)]
pub struct AgentContext {
    /// Id of the top-level task.
    pub task_id: String,
    /// Content of the top-level task.
    pub task_content: String,
    /// Current collaboration round, starting at 1.
    pub round: u32,
    /// How the subtask should be executed this round.
    pub strategy: Strategy,
    /// Results of the subtask's completed dependencies, keyed by subtask id.
    pub dependency_results: BTreeMap<String, String>,
    /// Prior knowledge relevant to the task.
    pub prior_knowledge: Vec<String>,
}

impl AgentContext {
    pub fn new(task_id: impl Into<String>, task_content: impl Into<String>, round: u32, strategy: Strategy) -> Self {
        Self {
            task_id: task_id.into(),
            task_content: task_content.into(),
            round,
            strategy,
            dependency_results: BTreeMap::new(),
            prior_knowledge: Vec::new(),
        }
    }
}

/// The capability contract between the orchestrator and a worker.
///
/// The orchestrator never inspects an agent beyond these operations.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Stable identifier, unique within a flow.
    fn id(&self) -> &str;

    /// Capability tag this agent was created for.
    fn capability(&self) -> &str;

    /// Execute one subtask. A returned `Err` is recorded as that subtask's
    /// failure for the round.
    async fn process(&self, subtask: &Subtask, context: &AgentContext) -> EnsembleResult<AgentOutput>;

    /// Accept a result shared by a peer.
    async fn receive_message(&self, message: PeerMessage);
}
