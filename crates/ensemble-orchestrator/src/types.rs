use ensemble_core::{AgentOutput, Strategy};
use serde::{Deserialize, Serialize};

/// States of the collaboration state machine, in the order a flow visits
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum Phase {
    /// Planning subtasks.
    Decomposing,
    /// Creating one agent per capability.
    Routing,
    /// Running every subtask once.
    Executing { round: u32 },
    /// Checking the completion predicate.
    Evaluating { round: u32 },
    /// Folding subtask results into one answer.
    Synthesizing,
    /// Terminal.
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Decomposing => write!(f, "decomposing"),
            Phase::Routing => write!(f, "routing"),
            Phase::Executing { round } => write!(f, "executing({round})"),
            Phase::Evaluating { round } => write!(f, "evaluating({round})"),
            Phase::Synthesizing => write!(f, "synthesizing"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// One agent execution within a round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundEntry {
    /// Agent that ran the subtask.
    pub agent_id: String,
    pub subtask_id: String,
    pub capability: String,
    /// Strategy chosen for this execution.
    pub strategy: Strategy,
    pub output: AgentOutput,
    /// Output confidence fell below the review threshold.
    pub needs_review: bool,
    /// Reward fed to the learner.
    pub reward: f64,
    /// Wall-clock time of the turn.
    pub duration_ms: u64,
}

/// Append-only record of one iteration of the collaboration loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationRound {
    /// 1-based round number.
    pub round: u32,
    /// Executions in order.
    pub entries: Vec<RoundEntry>,
}

impl ConversationRound {
    /// Empty round number `round`.
    pub fn new(round: u32) -> Self {
        Self {
            round,
            entries: Vec::new(),
        }
    }

    /// `(agent id, output)` pairs in execution order.
    pub fn results(&self) -> impl Iterator<Item = (&str, &AgentOutput)> {
        self.entries
            .iter()
            .map(|e| (e.agent_id.as_str(), &e.output))
    }

    /// Entries whose output carries an error.
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| !e.output.is_success()).count()
    }
}

/// A subtask that did not produce a usable result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskError {
    pub subtask_id: String,
    pub error: String,
}

/// Final outcome of a collaboration flow.
///
/// Always well-formed: failures surface through `error`/`error_kind` and
/// `subtask_errors` rather than as a `Result::Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationResult {
    pub task_id: String,
    /// Synthesized answer. Empty when nothing succeeded.
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Top-level failure. Results carrying one are never cached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable tag of the error, e.g. `validation` or `cancelled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    /// Failed or blocked subtasks as of the last round.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subtask_errors: Vec<SubtaskError>,
    #[serde(default)]
    pub subtask_count: usize,
    #[serde(default)]
    pub rounds: Vec<ConversationRound>,
    /// Phases visited, in order.
    #[serde(default)]
    pub phases: Vec<Phase>,
    /// The plan had a dependency cycle; edges on it were dropped.
    #[serde(default)]
    pub cycle_detected: bool,
    /// Served from the task cache without running.
    #[serde(default)]
    pub from_cache: bool,
}

impl CollaborationResult {
    /// An error result with no rounds.
    pub fn failed(task_id: impl Into<String>, error: impl Into<String>, kind: &str) -> Self {
        Self {
            task_id: task_id.into(),
            result: String::new(),
            confidence: None,
            error: Some(error.into()),
            error_kind: Some(kind.to_string()),
            subtask_errors: Vec::new(),
            subtask_count: 0,
            rounds: Vec::new(),
            phases: Vec::new(),
            cycle_detected: false,
            from_cache: false,
        }
    }

    /// No top-level error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The result as a JSON object.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({"task_id": self.task_id, "result": self.result, "error": self.error})
        })
    }
}

/// Health of the agents serving one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// No turn open.
    Idle,
    /// At least one turn open.
    Working,
    /// The last turn failed.
    Error,
}

/// Cumulative metrics for a capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Successful turns.
    pub total_turns: u32,
    /// Failed or timed-out turns.
    pub errors: u32,
    /// Successful turns flagged for review.
    pub low_confidence: u32,
    /// Time spent in turns, in milliseconds.
    pub duration_ms: u64,
}

/// Snapshot of one capability's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    /// Capability tag; the monitor key.
    pub capability: String,
    /// Most recently registered agent for this capability.
    pub agent_id: String,
    /// Subtask of the latest open turn.
    pub current_subtask: Option<String>,
    pub status: WorkerStatus,
    /// Turns currently open, across flows.
    #[serde(default)]
    pub active: u32,
    pub metrics: AgentMetrics,
}
