use ensemble_core::AgentOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// When the round loop may stop before `max_rounds`.
///
/// `max_rounds` is always a hard cap regardless of the predicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPredicate {
    /// Run every round up to the cap.
    #[default]
    MaxRounds,
    /// Stop once every subtask has a successful result.
    AllSubtasksSucceeded,
    /// Stop once every subtask succeeded and reported `done`.
    DoneSignal,
}

impl CompletionPredicate {
    /// `latest` holds the most recent output per subtask id; `expected` is
    /// the number of subtasks in the flow.
    pub fn is_complete(
        &self,
        round: u32,
        max_rounds: u32,
        latest: &BTreeMap<String, AgentOutput>,
        expected: usize,
    ) -> bool {
        if round >= max_rounds {
            return true;
        }
        let all_succeeded =
            latest.len() == expected && latest.values().all(AgentOutput::is_success);
        match self {
            CompletionPredicate::MaxRounds => false,
            CompletionPredicate::AllSubtasksSucceeded => all_succeeded,
            CompletionPredicate::DoneSignal => all_succeeded && latest.values().all(|o| o.done),
        }
    }
}
