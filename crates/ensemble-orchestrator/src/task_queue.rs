use ensemble_core::{Subtask, TaskStatus};
use std::collections::{HashMap, HashSet};

/// Subtasks of one flow with per-round dependency resolution.
///
/// Insertion order is preserved; it is the prioritized order.
pub struct SubtaskQueue {
    subtasks: Vec<Subtask>,
    index: HashMap<String, usize>,
    completed: HashSet<String>,
    failures: HashMap<String, String>,
}

impl SubtaskQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self {
            subtasks: Vec::new(),
            index: HashMap::new(),
            completed: HashSet::new(),
            failures: HashMap::new(),
        }
    }

    /// Add a subtask. A duplicate id replaces the earlier entry.
    pub fn add(&mut self, subtask: Subtask) {
        let id = subtask.id().to_string();
        match self.index.get(&id) {
            Some(&pos) => self.subtasks[pos] = subtask,
            None => {
                self.index.insert(id, self.subtasks.len());
                self.subtasks.push(subtask);
            }
        }
    }

    fn is_ready(&self, subtask: &Subtask) -> bool {
        subtask.task.status == TaskStatus::Pending
            && subtask
                .task
                .dependencies
                .iter()
                .all(|d| self.completed.contains(d))
    }

    /// Pending subtasks whose dependencies have all completed, in queue order.
    pub fn all_ready(&self) -> Vec<&Subtask> {
        self.subtasks.iter().filter(|s| self.is_ready(s)).collect()
    }

    fn set_status(&mut self, id: &str, status: TaskStatus) -> bool {
        match self.index.get(id) {
            Some(&pos) => {
                self.subtasks[pos].task.status = status;
                true
            }
            None => false,
        }
    }

    /// Mark a subtask as handed to an agent. Returns `false` for an unknown id.
    pub fn mark_running(&mut self, id: &str) -> bool {
        self.set_status(id, TaskStatus::Running)
    }

    /// Mark a subtask as completed, releasing its dependents.
    pub fn mark_completed(&mut self, id: &str) -> bool {
        let found = self.set_status(id, TaskStatus::Completed);
        if found {
            self.completed.insert(id.to_string());
            self.failures.remove(id);
        }
        found
    }

    /// Mark a subtask as failed and keep `reason` for the final report.
    /// Its dependents stay blocked for the rest of the round.
    pub fn mark_failed(&mut self, id: &str, reason: impl Into<String>) -> bool {
        let found = self.set_status(id, TaskStatus::Failed);
        if found {
            self.failures.insert(id.to_string(), reason.into());
        }
        found
    }

    /// Return every subtask to `Pending` for the next round. Failure reasons
    /// from the previous round are cleared.
    pub fn reset_for_round(&mut self) {
        for s in &mut self.subtasks {
            s.task.status = TaskStatus::Pending;
        }
        self.completed.clear();
        self.failures.clear();
    }

    /// Look up a subtask by id.
    pub fn get(&self, id: &str) -> Option<&Subtask> {
        self.index.get(id).map(|&pos| &self.subtasks[pos])
    }

    /// Every subtask, in queue order.
    pub fn all(&self) -> &[Subtask] {
        &self.subtasks
    }

    /// Failure reason recorded this round, if any.
    pub fn failure(&self, id: &str) -> Option<&str> {
        self.failures.get(id).map(String::as_str)
    }

    /// Subtasks still pending: their dependencies failed or never ran.
    pub fn blocked(&self) -> Vec<&Subtask> {
        self.subtasks
            .iter()
            .filter(|s| s.task.status == TaskStatus::Pending)
            .collect()
    }

    /// Subtasks not yet handed out this round.
    pub fn pending_count(&self) -> usize {
        self.subtasks
            .iter()
            .filter(|s| s.task.status == TaskStatus::Pending)
            .count()
    }

    /// Subtasks completed this round.
    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Number of subtasks in the queue.
    pub fn total_count(&self) -> usize {
        self.subtasks.len()
    }

    /// Every subtask has either completed or failed.
    pub fn is_done(&self) -> bool {
        self.subtasks
            .iter()
            .all(|s| matches!(s.task.status, TaskStatus::Completed | TaskStatus::Failed))
    }
}

impl Default for SubtaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
