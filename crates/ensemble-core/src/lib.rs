//! Core types and error definitions for the ensemble workspace.
//!
//! This crate provides the foundational types shared across all ensemble
//! crates: the unified error enum, tasks and subtasks, execution strategies,
//! learning transitions, agent outputs and peer messages.
//!
//! # Main types
//!
//! - [`EnsembleError`] — Unified error enum for all ensemble subsystems.
//! - [`EnsembleResult`] — Convenience alias for `Result<T, EnsembleError>`.
//! - [`Task`] / [`Subtask`] — Units of work with priority and dependencies.
//! - [`Schedulable`] — What the prioritizer and optimizer can order.
//! - [`Strategy`] — Per-subtask execution plan.
//! - [`ActionRecord`] — A learning transition.
//! - [`AgentOutput`] — The result map an agent returns.
//! - [`PeerMessage`] — A result broadcast to peer agents.

/// Unified error type.
pub mod error;
/// Peer-to-peer agent messages.
pub mod message;
/// Agent result maps.
pub mod output;
/// Execution strategies, action names and rewards.
pub mod strategy;
/// Tasks, subtasks and priority labels.
pub mod task;

pub use error::{EnsembleError, EnsembleResult};
pub use message::PeerMessage;
pub use output::AgentOutput;
pub use strategy::{
    default_action_space, execution_reward, ActionRecord, Strategy, ACTION_DIRECT_RESPONSE,
    ACTION_GENERATIVE_STEP,
};
pub use task::{PriorityLabel, Schedulable, Subtask, Task, TaskStatus, TaskType};
