use crate::types::{AgentMetrics, AgentState, WorkerStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Tracks state and cumulative metrics per agent capability.
///
/// Every flow creates its own agents, but they report under their
/// capability, so the map holds one entry per capability no matter how
/// many tasks a long-lived orchestrator runs. Overlapping flows are
/// counted in `active`; the entry is `Working` while any turn is open.
pub struct AgentMonitor {
    states: Arc<RwLock<BTreeMap<String, AgentState>>>,
}

impl AgentMonitor {
    /// An empty monitor.
    pub fn new() -> Self {
        Self {
            states: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Start tracking `capability`, served now by `agent_id`.
    /// Re-registering keeps existing metrics and records the newest agent.
    pub async fn register(&self, capability: &str, agent_id: &str) {
        let mut states = self.states.write().await;
        let state = states
            .entry(capability.to_string())
            .or_insert_with(|| AgentState {
                capability: capability.to_string(),
                agent_id: agent_id.to_string(),
                current_subtask: None,
                status: WorkerStatus::Idle,
                active: 0,
                metrics: AgentMetrics::default(),
            });
        state.agent_id = agent_id.to_string();
    }

    /// Mark a turn on `subtask_id` as open.
    pub async fn start_task(&self, capability: &str, subtask_id: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(capability) {
            state.active += 1;
            state.current_subtask = Some(subtask_id.to_string());
            state.status = WorkerStatus::Working;
        }
    }

    /// Close a turn. The entry goes idle once no turn is open; an entry in
    /// `Error` stays there until its next successful turn.
    pub async fn finish_task(&self, capability: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(capability) {
            state.active = state.active.saturating_sub(1);
            if state.active == 0 {
                state.current_subtask = None;
                if state.status == WorkerStatus::Working {
                    state.status = WorkerStatus::Idle;
                }
            }
        }
    }

    /// Count a failed turn and flag the capability.
    pub async fn record_error(&self, capability: &str) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(capability) {
            state.metrics.errors += 1;
            state.status = WorkerStatus::Error;
        }
    }

    /// Record a completed turn and whether its confidence needs review.
    pub async fn record_turn(&self, capability: &str, low_confidence: bool) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(capability) {
            state.metrics.total_turns += 1;
            if low_confidence {
                state.metrics.low_confidence += 1;
            }
            if state.status == WorkerStatus::Error {
                state.status = WorkerStatus::Working;
            }
        }
    }

    /// Add wall-clock time spent in one turn.
    pub async fn record_duration(&self, capability: &str, duration_ms: u64) {
        let mut states = self.states.write().await;
        if let Some(state) = states.get_mut(capability) {
            state.metrics.duration_ms += duration_ms;
        }
    }

    /// All states, ordered by capability.
    pub async fn snapshot(&self) -> Vec<AgentState> {
        let states = self.states.read().await;
        states.values().cloned().collect()
    }

    /// State for one capability, if it has been registered.
    pub async fn get_state(&self, capability: &str) -> Option<AgentState> {
        let states = self.states.read().await;
        states.get(capability).cloned()
    }

    /// Metrics summed over every capability.
    pub async fn aggregate_metrics(&self) -> AgentMetrics {
        let states = self.states.read().await;
        let mut total = AgentMetrics::default();
        for state in states.values() {
            total.total_turns += state.metrics.total_turns;
            total.errors += state.metrics.errors;
            total.low_confidence += state.metrics.low_confidence;
            total.duration_ms += state.metrics.duration_ms;
        }
        total
    }

    /// Snapshot plus aggregate, as JSON.
    pub async fn to_json(&self) -> serde_json::Value {
        let states = self.snapshot().await;
        let aggregate = self.aggregate_metrics().await;
        serde_json::json!({
            "agents": states,
            "aggregate": aggregate,
        })
    }
}

impl Default for AgentMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_lifecycle() {
        let monitor = AgentMonitor::new();
        monitor.register("programmer", "programmer-1").await;

        monitor.start_task("programmer", "s1").await;
        let state = monitor.get_state("programmer").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.current_subtask.as_deref(), Some("s1"));
        assert_eq!(state.agent_id, "programmer-1");

        monitor.finish_task("programmer").await;
        let state = monitor.get_state("programmer").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
        assert!(state.current_subtask.is_none());
        assert_eq!(state.active, 0);
    }

    #[tokio::test]
    async fn test_error_status_survives_finish() {
        let monitor = AgentMonitor::new();
        monitor.register("general", "general-1").await;
        monitor.start_task("general", "s1").await;
        monitor.record_error("general").await;
        monitor.finish_task("general").await;
        let state = monitor.get_state("general").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Error);
        assert_eq!(state.metrics.errors, 1);

        // A later successful turn clears the flag.
        monitor.start_task("general", "s2").await;
        monitor.record_turn("general", false).await;
        monitor.finish_task("general").await;
        let state = monitor.get_state("general").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn test_unregistered_capability_is_ignored() {
        let monitor = AgentMonitor::new();
        monitor.record_turn("ghost", false).await;
        monitor.finish_task("ghost").await;
        assert!(monitor.get_state("ghost").await.is_none());
        assert!(monitor.snapshot().await.is_empty());
    }

    // ── Entries stay bounded across flows ──

    #[tokio::test]
    async fn test_reregistering_keeps_one_entry_per_capability() {
        let monitor = AgentMonitor::new();
        for flow in 0..5 {
            let agent_id = format!("general-{flow}");
            monitor.register("general", &agent_id).await;
            monitor.start_task("general", "s1").await;
            monitor.record_turn("general", false).await;
            monitor.finish_task("general").await;
        }
        let states = monitor.snapshot().await;
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].agent_id, "general-4");
        assert_eq!(states[0].metrics.total_turns, 5);
    }

    #[tokio::test]
    async fn test_overlapping_turns_stay_working() {
        let monitor = AgentMonitor::new();
        monitor.register("general", "general-a").await;
        monitor.start_task("general", "a1").await;
        monitor.start_task("general", "b1").await;
        monitor.finish_task("general").await;
        let state = monitor.get_state("general").await.unwrap();
        assert_eq!(state.status, WorkerStatus::Working);
        assert_eq!(state.active, 1);
        monitor.finish_task("general").await;
        assert_eq!(
            monitor.get_state("general").await.unwrap().status,
            WorkerStatus::Idle
        );
    }

    #[tokio::test]
    async fn test_aggregate_metrics() {
        let monitor = AgentMonitor::new();
        monitor.register("programmer", "a").await;
        monitor.register("code_reviewer", "b").await;
        monitor.record_turn("programmer", false).await;
        monitor.record_turn("code_reviewer", true).await;
        monitor.record_duration("programmer", 40).await;
        monitor.record_error("code_reviewer").await;

        let agg = monitor.aggregate_metrics().await;
        assert_eq!(agg.total_turns, 2);
        assert_eq!(agg.low_confidence, 1);
        assert_eq!(agg.errors, 1);
        assert_eq!(agg.duration_ms, 40);

        let json = monitor.to_json().await;
        assert_eq!(json["agents"].as_array().unwrap().len(), 2);
        assert!(json["aggregate"].is_object());
    }
}
