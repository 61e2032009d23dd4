//! Collaborative multi-agent orchestration.
//!
//! Takes a task through decomposition, capability routing, multi-round
//! execution with peer messaging, and synthesis. Ordering comes from a
//! dependency-aware prioritizer plus a stochastic optimizer; per-subtask
//! strategies come from an adaptive exploration controller backed by an
//! action-value learner.
//!
//! # Main types
//!
//! - [`CollaborationOrchestrator`] — Runs the collaboration state machine.
//! - [`CollaborationResult`] — Final, always well-formed outcome of a flow.
//! - [`TaskPrioritizer`] — Label normalization and dependency-aware ordering.
//! - [`TaskOrderOptimizer`] — Annealing over orderings of ready items.
//! - [`ExplorationController`] — Adaptive explore/exploit decisions.
//! - [`ActionValueLearner`] / [`TabularLearner`] — Strategy value estimates.
//! - [`AgentMonitor`] — Per-agent lifecycle and metrics.

/// Completion predicates for the round loop.
pub mod completion;
/// Orchestrator settings.
pub mod config;
/// Fixed-length numeric state encoding.
pub mod encoding;
/// Collaboration state machine.
pub mod engine;
/// Exploration rate and temperature control.
pub mod exploration;
/// Action-value learning and experience replay.
pub mod learner;
/// Per-flow peer mailboxes.
pub mod mailbox;
/// Agent health and metrics monitoring.
pub mod monitor;
/// Stochastic ordering of ready items.
pub mod optimizer;
/// Priority normalization and batch ordering.
pub mod prioritizer;
/// Per-flow subtask queue with dependency resolution.
pub mod task_queue;
/// Phases, rounds and results.
pub mod types;

pub use completion::CompletionPredicate;
pub use config::OrchestratorConfig;
pub use encoding::{encode_state, STATE_DIM};
pub use engine::CollaborationOrchestrator;
pub use exploration::{softmax, ExplorationConfig, ExplorationController};
pub use learner::{ActionValueLearner, LearnerConfig, ReplayBuffer, TabularLearner};
pub use mailbox::Mailboxes;
pub use monitor::AgentMonitor;
pub use optimizer::{OptimizerConfig, TaskOrderOptimizer};
pub use prioritizer::{PrioritizedBatch, TaskPrioritizer};
pub use task_queue::SubtaskQueue;
pub use types::{
    AgentMetrics, AgentState, CollaborationResult, ConversationRound, Phase, RoundEntry,
    SubtaskError, WorkerStatus,
};
