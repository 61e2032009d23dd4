//! End-to-end collaboration tests.
//!
//! Runs full flows against a scripted inference backend that answers
//! planner, agent and synthesis prompts deterministically. Checks phase
//! order, caching, knowledge reuse, failure isolation and cancellation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use ensemble_agent::{
    AgentContext, AgentFactory, AgentHandle, DefaultAgentFactory, InferenceBackend,
    ResilientClient, RetryPolicy,
};
use ensemble_core::{
    AgentOutput, EnsembleError, EnsembleResult, PeerMessage, PriorityLabel, Subtask, Task,
    TaskType,
};
use ensemble_memory::{InMemoryKnowledgeStore, KnowledgeStore, TaskCache};
use ensemble_orchestrator::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Scripted backend: answers by prompt kind
// ---------------------------------------------------------------------------

struct ScriptedBackend {
    plan: String,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(plan: &str) -> Arc<Self> {
        Arc::new(Self {
            plan: plan.to_string(),
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn saw(&self, needle: &str) -> bool {
        self.prompts.lock().iter().any(|p| p.contains(needle))
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn generate(&self, _system: &str, prompt: &str) -> EnsembleResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        let reply = if prompt.contains("Break the following task into subtasks") {
            self.plan.clone()
        } else if prompt.contains("Combine the subtask results") {
            r#"{"result": "synthesized answer", "confidence": 0.85}"#.to_string()
        } else {
            r#"{"result": "partial work", "confidence": 0.9, "done": true}"#.to_string()
        };
        Ok(reply)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn client(backend: Arc<ScriptedBackend>) -> Arc<ResilientClient> {
    let policy = RetryPolicy {
        backoff_multiplier_ms: 1,
        backoff_min_ms: 1,
        backoff_max_ms: 2,
        ..RetryPolicy::default()
    };
    Arc::new(ResilientClient::new(backend, policy))
}

fn config(completion: CompletionPredicate) -> OrchestratorConfig {
    OrchestratorConfig {
        completion,
        optimizer: OptimizerConfig {
            seed: Some(5),
            ..OptimizerConfig::default()
        },
        ..OrchestratorConfig::default()
    }
}

fn orchestrator(backend: Arc<ScriptedBackend>, completion: CompletionPredicate) -> CollaborationOrchestrator {
    let client = client(backend);
    let factory = Arc::new(DefaultAgentFactory::new(client.clone()));
    CollaborationOrchestrator::new(client, factory, config(completion)).with_exploration(
        ExplorationConfig {
            seed: Some(9),
            ..ExplorationConfig::default()
        },
    )
}

// ---------------------------------------------------------------------------
// Agents with fixed behaviour, served by a wrapping factory
// ---------------------------------------------------------------------------

enum Behaviour {
    Fail,
    Hang,
}

struct FixedAgent {
    id: String,
    capability: String,
    behaviour: Behaviour,
}

#[async_trait]
impl AgentHandle for FixedAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn capability(&self) -> &str {
        &self.capability
    }

    async fn process(&self, _subtask: &Subtask, _ctx: &AgentContext) -> EnsembleResult<AgentOutput> {
        match self.behaviour {
            Behaviour::Fail => Err(EnsembleError::Agent("boom".to_string())),
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(AgentOutput::success("too late"))
            }
        }
    }

    async fn receive_message(&self, _message: PeerMessage) {}
}

struct OverridingFactory {
    inner: DefaultAgentFactory,
    capability: &'static str,
    hang: bool,
}

#[async_trait]
impl AgentFactory for OverridingFactory {
    async fn create(&self, capability: &str, agent_id: &str) -> EnsembleResult<Arc<dyn AgentHandle>> {
        if capability == self.capability {
            let behaviour = if self.hang { Behaviour::Hang } else { Behaviour::Fail };
            return Ok(Arc::new(FixedAgent {
                id: agent_id.to_string(),
                capability: capability.to_string(),
                behaviour,
            }));
        }
        self.inner.create(capability, agent_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_single_subtask_flow_completes_in_one_round() {
    let backend = ScriptedBackend::new("not json");
    let orch = orchestrator(backend.clone(), CompletionPredicate::AllSubtasksSucceeded);

    let task = Task::new("summarize file X").with_label(PriorityLabel::High);
    assert!((TaskPrioritizer::new().prioritize(task.clone()).priority - 0.7).abs() < 1e-9);

    let result = orch.run(task).await;
    assert!(result.is_success(), "unexpected error: {:?}", result.error);
    assert_eq!(result.result, "synthesized answer");
    assert_eq!(result.subtask_count, 1);
    assert_eq!(result.rounds.len(), 1);
    assert!(result.subtask_errors.is_empty());
    assert!(!result.from_cache);

    let value = result.to_value();
    assert!(value.get("error").is_none());
    assert_eq!(value["result"], "synthesized answer");

    assert_eq!(
        result.phases,
        vec![
            Phase::Decomposing,
            Phase::Routing,
            Phase::Executing { round: 1 },
            Phase::Evaluating { round: 1 },
            Phase::Synthesizing,
            Phase::Done,
        ]
    );
    assert_eq!(orch.controller().history_len(), 1);
}

#[tokio::test]
async fn test_max_rounds_predicate_runs_every_round() {
    let backend = ScriptedBackend::new("not json");
    let mut cfg = config(CompletionPredicate::MaxRounds);
    cfg.max_rounds = 3;
    let c = client(backend);
    let orch = CollaborationOrchestrator::new(c.clone(), Arc::new(DefaultAgentFactory::new(c)), cfg);

    let result = orch.run(Task::new("draft a haiku")).await;
    assert!(result.is_success());
    assert_eq!(result.rounds.len(), 3);
    assert_eq!(result.rounds[2].round, 3);
}

#[tokio::test]
async fn test_resubmission_is_served_from_cache() {
    let backend = ScriptedBackend::new("not json");
    let orch = orchestrator(backend.clone(), CompletionPredicate::AllSubtasksSucceeded);

    let first = orch.run(Task::new("summarize file X")).await;
    assert!(first.is_success());
    let calls_after_first = backend.calls();

    let second = orch.run(Task::new("  summarize file X  ")).await;
    assert!(second.from_cache);
    assert_eq!(second.result, first.result);
    assert_eq!(backend.calls(), calls_after_first);
    assert_eq!(orch.cache().stats().hits, 1);
}

#[tokio::test]
async fn test_coding_plan_routes_to_programmer_and_reviewer() {
    let plan = r#"{"subtasks": [
        {"id": "impl", "description": "implement the parser", "capability": "coder", "dependencies": []},
        {"id": "review", "description": "review the parser", "dependencies": ["impl"]}
    ]}"#;
    let backend = ScriptedBackend::new(plan);
    let orch = orchestrator(backend.clone(), CompletionPredicate::AllSubtasksSucceeded);

    let result = orch
        .run(Task::new("write a toml parser").with_type(TaskType::Coding))
        .await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.subtask_count, 2);

    let round = &result.rounds[0];
    let order: Vec<&str> = round.entries.iter().map(|e| e.subtask_id.as_str()).collect();
    assert_eq!(order, vec!["impl", "review"]);
    assert_eq!(round.entries[0].capability, "programmer");
    assert_eq!(round.entries[1].capability, "code_reviewer");

    // The reviewer saw the programmer's result as a prerequisite.
    assert!(backend.saw("Results of prerequisite subtasks"));

    let agents = orch.monitor().snapshot().await;
    assert_eq!(agents.len(), 2);
    assert!(agents.iter().all(|a| a.metrics.total_turns == 1));
}

#[tokio::test]
async fn test_agent_failure_is_isolated() {
    let plan = r#"{"subtasks": [
        {"id": "a", "description": "good part", "capability": "general", "dependencies": []},
        {"id": "b", "description": "bad part", "capability": "flaky", "dependencies": []},
        {"id": "c", "description": "after bad", "capability": "general", "dependencies": ["b"]}
    ]}"#;
    let backend = ScriptedBackend::new(plan);
    let c = client(backend);
    let factory = Arc::new(OverridingFactory {
        inner: DefaultAgentFactory::new(c.clone()),
        capability: "flaky",
        hang: false,
    });
    let orch = CollaborationOrchestrator::new(
        c,
        factory,
        config(CompletionPredicate::AllSubtasksSucceeded),
    );

    let result = orch.run(Task::new("mixed work")).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.result, "synthesized answer");

    let failed: Vec<&str> = result
        .subtask_errors
        .iter()
        .map(|e| e.subtask_id.as_str())
        .collect();
    assert_eq!(failed, vec!["b", "c"]);
    assert!(result.subtask_errors[0].error.contains("boom"));
    assert!(result.subtask_errors[1].error.contains("blocked"));

    // Failures never satisfy the predicate, so the loop ran to the cap.
    assert_eq!(result.rounds.len(), 5);
    let flaky = result.rounds[0]
        .entries
        .iter()
        .find(|e| e.subtask_id == "b")
        .unwrap();
    assert!(!flaky.output.is_success());
    let state = orch.monitor().get_state(&flaky.capability).await.unwrap();
    assert_eq!(state.status, WorkerStatus::Error);
    assert_eq!(state.metrics.errors, 5);
}

#[tokio::test]
async fn test_cyclic_plan_still_runs_every_subtask() {
    let plan = r#"{"subtasks": [
        {"id": "a", "description": "first half", "capability": "general", "dependencies": ["b"]},
        {"id": "b", "description": "second half", "capability": "general", "dependencies": ["a"]},
        {"id": "c", "description": "wrap up", "capability": "general", "dependencies": ["a"]}
    ]}"#;
    let backend = ScriptedBackend::new(plan);
    let orch = orchestrator(backend, CompletionPredicate::AllSubtasksSucceeded);

    let result = orch.run(Task::new("cyclic work")).await;
    assert!(result.is_success(), "{:?}", result.error);
    assert!(result.cycle_detected);
    assert!(result.subtask_errors.is_empty(), "{:?}", result.subtask_errors);
    assert_eq!(result.rounds.len(), 1);

    // The cycle is broken in submission order; the edge leaving it is kept.
    let order: Vec<&str> = result.rounds[0]
        .entries
        .iter()
        .map(|e| e.subtask_id.as_str())
        .collect();
    assert_eq!(order.len(), 3);
    let pos = |id: &str| order.iter().position(|o| *o == id).unwrap();
    assert!(pos("a") < pos("c"));
    assert!(result.rounds[0].entries.iter().all(|e| e.output.is_success()));
}

#[tokio::test]
async fn test_monitor_stays_bounded_across_tasks() {
    let backend = ScriptedBackend::new("not json");
    let orch = orchestrator(backend, CompletionPredicate::AllSubtasksSucceeded);

    for i in 0..5 {
        assert!(orch.run(Task::new(format!("distinct task {i}"))).await.is_success());
    }
    let states = orch.monitor().snapshot().await;
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].capability, "general");
    assert_eq!(states[0].metrics.total_turns, 5);
    assert_eq!(states[0].status, WorkerStatus::Idle);
}

#[tokio::test]
async fn test_prior_knowledge_reaches_planner() {
    let backend = ScriptedBackend::new("not json");
    let store = Arc::new(InMemoryKnowledgeStore::new());
    let cache = Arc::new(TaskCache::new(10));
    let orch = orchestrator(backend.clone(), CompletionPredicate::AllSubtasksSucceeded)
        .with_knowledge(store.clone())
        .with_cache(cache.clone());

    assert!(orch.run(Task::new("summarize file X")).await.is_success());
    assert_eq!(store.count().await, 1);
    let records = store.query("summarize file X").await.unwrap();
    assert_eq!(records[0].label, "TaskResult");
    assert!(!backend.saw("Related earlier results"));

    cache.clear();
    assert!(orch.run(Task::new("summarize file X")).await.is_success());
    assert!(backend.saw("Related earlier results"));
}

#[tokio::test]
async fn test_cancellation_returns_cancelled_result() {
    let backend = ScriptedBackend::new("not json");
    let c = client(backend);
    let factory = Arc::new(OverridingFactory {
        inner: DefaultAgentFactory::new(c.clone()),
        capability: "general",
        hang: true,
    });
    let orch = CollaborationOrchestrator::new(
        c,
        factory,
        config(CompletionPredicate::AllSubtasksSucceeded),
    );

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let task = Task::new("never finishes");
    let result = orch.run_cancellable(task.clone(), token).await;
    assert_eq!(result.error_kind.as_deref(), Some("cancelled"));
    assert!(result.result.is_empty());
    assert!(!orch.cache().contains(&task).unwrap());
}

#[tokio::test]
async fn test_empty_task_reports_config_error() {
    let backend = ScriptedBackend::new("not json");
    let orch = orchestrator(backend.clone(), CompletionPredicate::AllSubtasksSucceeded);
    let result = orch.run(Task::new("   ")).await;
    assert_eq!(result.error_kind.as_deref(), Some("config"));
    assert_eq!(backend.calls(), 0);
}
