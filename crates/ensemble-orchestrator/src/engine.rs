use crate::config::OrchestratorConfig;
use crate::encoding::encode_state;
use crate::exploration::{ExplorationConfig, ExplorationController};
use crate::learner::{ActionValueLearner, TabularLearner};
use crate::mailbox::Mailboxes;
use crate::monitor::AgentMonitor;
use crate::optimizer::TaskOrderOptimizer;
use crate::prioritizer::{PrioritizedBatch, TaskPrioritizer};
use crate::task_queue::SubtaskQueue;
use crate::types::{CollaborationResult, ConversationRound, Phase, RoundEntry, SubtaskError};
use ensemble_agent::{
    canonical_capability, required_capabilities, AgentContext, AgentFactory, AgentHandle,
    ResilientClient, StructuredReply,
};
use ensemble_core::{
    default_action_space, execution_reward, ActionRecord, AgentOutput, EnsembleError,
    EnsembleResult, PeerMessage, Strategy, Subtask, Task, ACTION_DIRECT_RESPONSE,
};
use ensemble_memory::{KnowledgeStore, TaskCache};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const PLANNER_SYSTEM_PROMPT: &str = "You are the coordinator of a team of specialist agents. \
You split work into small, independent subtasks and combine their results.";

const KNOWLEDGE_LABEL: &str = "TaskResult";

fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "subtasks": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "description": {"type": "string", "minLength": 1},
                        "capability": {"type": "string"},
                        "dependencies": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["description", "dependencies"]
                }
            }
        },
        "required": ["subtasks"]
    })
}

fn synthesis_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "result": {"type": "string"},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1}
        },
        "required": ["result"]
    })
}

#[derive(Deserialize)]
struct PlanStep {
    #[serde(default)]
    id: Option<String>,
    description: String,
    #[serde(default)]
    capability: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Deserialize)]
struct Plan {
    subtasks: Vec<PlanStep>,
}

/// Per-flow working state. Dropped when the flow ends.
struct Flow {
    task: Task,
    phases: Vec<Phase>,
    prior: Vec<String>,
    queue: SubtaskQueue,
    agents: HashMap<String, Arc<dyn AgentHandle>>,
    mailboxes: Mailboxes,
    rounds: Vec<ConversationRound>,
    /// Last successful result per subtask, across rounds.
    results: BTreeMap<String, AgentOutput>,
    /// Outputs of the most recent round.
    last_round: BTreeMap<String, AgentOutput>,
    /// Subtasks that could not run in the most recent round.
    last_blocked: Vec<String>,
    cycle_detected: bool,
}

impl Flow {
    fn enter(&mut self, phase: Phase) {
        debug!(task_id = %self.task.id, %phase, "Entering phase");
        self.phases.push(phase);
    }
}

/// Drives a task from submission to a synthesized result.
///
/// Decomposes the task, routes subtasks to agents by capability, runs
/// conversation rounds in which agents see each other's results, and
/// synthesizes a final answer. Results without a top-level error are
/// cached by task content and recorded in the knowledge store.
pub struct CollaborationOrchestrator {
    config: OrchestratorConfig,
    client: Arc<ResilientClient>,
    factory: Arc<dyn AgentFactory>,
    cache: Arc<TaskCache<CollaborationResult>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
    prioritizer: TaskPrioritizer,
    optimizer: TaskOrderOptimizer,
    controller: Arc<ExplorationController>,
    learner: Arc<dyn ActionValueLearner>,
    monitor: Arc<AgentMonitor>,
    action_space: Vec<String>,
}

impl CollaborationOrchestrator {
    /// Orchestrator with default cache, learner and exploration settings.
    pub fn new(
        client: Arc<ResilientClient>,
        factory: Arc<dyn AgentFactory>,
        config: OrchestratorConfig,
    ) -> Self {
        let optimizer = TaskOrderOptimizer::new(config.optimizer.clone());
        Self {
            config,
            client,
            factory,
            cache: Arc::new(TaskCache::default()),
            knowledge: None,
            prioritizer: TaskPrioritizer::new(),
            optimizer,
            controller: Arc::new(ExplorationController::default()),
            learner: Arc::new(TabularLearner::default()),
            monitor: Arc::new(AgentMonitor::new()),
            action_space: default_action_space(),
        }
    }

    /// Share a result cache, e.g. across orchestrators.
    pub fn with_cache(mut self, cache: Arc<TaskCache<CollaborationResult>>) -> Self {
        self.cache = cache;
        self
    }

    /// Read prior context from and persist results to `store`.
    pub fn with_knowledge(mut self, store: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(store);
        self
    }

    /// Replace the default tabular learner.
    pub fn with_learner(mut self, learner: Arc<dyn ActionValueLearner>) -> Self {
        self.learner = learner;
        self
    }

    /// Replace the exploration controller's settings.
    pub fn with_exploration(mut self, config: ExplorationConfig) -> Self {
        self.controller = Arc::new(ExplorationController::new(config));
        self
    }

    /// Replace the strategy actions the controller chooses among.
    pub fn with_action_space(mut self, actions: Vec<String>) -> Self {
        if !actions.is_empty() {
            self.action_space = actions;
        }
        self
    }

    /// Settings in effect.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Per-capability agent monitor.
    pub fn monitor(&self) -> &Arc<AgentMonitor> {
        &self.monitor
    }

    /// Result cache.
    pub fn cache(&self) -> &Arc<TaskCache<CollaborationResult>> {
        &self.cache
    }

    /// Exploration controller shared by every flow.
    pub fn controller(&self) -> &Arc<ExplorationController> {
        &self.controller
    }

    /// Run a task to completion. Never fails: errors are reported inside
    /// the result.
    pub async fn run(&self, task: Task) -> CollaborationResult {
        let task_id = task.id.clone();
        let start = Instant::now();
        info!(task_id = %task_id, task_type = %task.task_type, "Collaboration starting");

        match self.run_flow(task).await {
            Ok(result) => {
                info!(
                    task_id = %task_id,
                    duration_ms = start.elapsed().as_millis() as u64,
                    rounds = result.rounds.len(),
                    from_cache = result.from_cache,
                    success = result.is_success(),
                    "Collaboration finished"
                );
                result
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Collaboration aborted");
                CollaborationResult::failed(task_id, e.to_string(), e.kind())
            }
        }
    }

    /// Like [`run`](Self::run), but stops at the next suspension point once
    /// `token` is cancelled. Nothing is cached for a cancelled flow.
    pub async fn run_cancellable(&self, task: Task, token: CancellationToken) -> CollaborationResult {
        let task_id = task.id.clone();
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                warn!(task_id = %task_id, "Collaboration cancelled");
                let err = EnsembleError::Cancelled;
                CollaborationResult::failed(task_id, err.to_string(), err.kind())
            }
            result = self.run(task) => result,
        }
    }

    async fn run_flow(&self, task: Task) -> EnsembleResult<CollaborationResult> {
        let task = self.prioritizer.prioritize(task);

        if let Some(mut hit) = self.cache.get(&task)? {
            info!(task_id = %task.id, "Cache hit");
            hit.task_id.clone_from(&task.id);
            hit.from_cache = true;
            return Ok(hit);
        }

        let prior = self.prior_context(&task).await;
        let mut flow = Flow {
            task,
            phases: Vec::new(),
            prior,
            queue: SubtaskQueue::new(),
            agents: HashMap::new(),
            mailboxes: Mailboxes::new(),
            rounds: Vec::new(),
            results: BTreeMap::new(),
            last_round: BTreeMap::new(),
            last_blocked: Vec::new(),
            cycle_detected: false,
        };

        flow.enter(Phase::Decomposing);
        let subtasks = self.decompose(&flow.task, &flow.prior).await;
        let PrioritizedBatch {
            items,
            cycle_detected,
            cyclic_dependencies,
        } = self.prioritizer.prioritize_all(subtasks);
        flow.cycle_detected = cycle_detected;
        for (dependent, dependency) in &cyclic_dependencies {
            warn!(
                task_id = %flow.task.id,
                subtask_id = %dependent,
                dependency = %dependency,
                "Dropping dependency on a cycle"
            );
        }
        for subtask in items {
            flow.queue.add(drop_dependencies(subtask, &cyclic_dependencies));
        }
        info!(task_id = %flow.task.id, subtasks = flow.queue.total_count(), "Decomposition complete");

        flow.enter(Phase::Routing);
        self.route(&mut flow).await?;

        let max_rounds = self.config.rounds();
        for round in 1..=max_rounds {
            flow.enter(Phase::Executing { round });
            self.execute_round(&mut flow, round, max_rounds).await;

            flow.enter(Phase::Evaluating { round });
            let complete = self.config.completion.is_complete(
                round,
                max_rounds,
                &flow.last_round,
                flow.queue.total_count(),
            );
            info!(
                task_id = %flow.task.id,
                round,
                blocked = flow.last_blocked.len(),
                complete,
                "Round evaluated"
            );
            if complete {
                break;
            }
        }

        flow.enter(Phase::Synthesizing);
        let mut result = self.synthesize(&mut flow).await;
        flow.enter(Phase::Done);
        result.phases = std::mem::take(&mut flow.phases);

        if result.is_success() {
            self.persist(&flow.task, &result).await;
            if let Err(e) = self.cache.put(&flow.task, result.clone()) {
                warn!(task_id = %flow.task.id, error = %e, "Failed to cache result");
            }
        }
        Ok(result)
    }

    async fn prior_context(&self, task: &Task) -> Vec<String> {
        let Some(store) = &self.knowledge else {
            return Vec::new();
        };
        match store.query(task.normalized_content()).await {
            Ok(records) => records
                .iter()
                .take(self.config.prior_context_limit)
                .map(|r| r.summary())
                .collect(),
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "Knowledge lookup failed");
                Vec::new()
            }
        }
    }

    /// Ask the planner for subtasks. Falls back to one subtask per required
    /// capability when the planner does not produce a usable plan.
    async fn decompose(&self, task: &Task, prior: &[String]) -> Vec<Subtask> {
        let capabilities = required_capabilities(task.task_type);
        let mut prompt = format!(
            "Break the following task into subtasks for a team of agents.\n\
             Task: {}\nTask type: {}\nAvailable capabilities: {}\n",
            task.content,
            task.task_type,
            capabilities.join(", ")
        );
        if !prior.is_empty() {
            prompt.push_str("\nRelated earlier results:\n");
            for p in prior {
                let _ = writeln!(prompt, "- {p}");
            }
        }
        prompt.push_str(
            "\nRespond with a JSON object: {\"subtasks\": [{\"id\": string, \"description\": \
             string, \"capability\": string, \"dependencies\": [ids of subtasks that must \
             finish first]}]}.",
        );

        let plan = match self
            .client
            .invoke_with_fallback(PLANNER_SYSTEM_PROMPT, &prompt, &plan_schema())
            .await
        {
            StructuredReply::Valid(value) => serde_json::from_value::<Plan>(value)
                .map_err(|e| e.to_string())
                .and_then(|p| {
                    if p.subtasks.is_empty() {
                        Err("plan has no subtasks".to_string())
                    } else {
                        Ok(p)
                    }
                }),
            StructuredReply::Invalid(fallback) => Err(fallback.error),
        };

        match plan {
            Ok(plan) => build_subtasks(task, plan, &capabilities),
            Err(reason) => {
                warn!(task_id = %task.id, reason = %reason, "Decomposition failed, using default plan");
                default_subtasks(task, &capabilities)
            }
        }
    }

    async fn route(&self, flow: &mut Flow) -> EnsembleResult<()> {
        let short_id: String = flow.task.id.chars().take(8).collect();
        let capabilities: Vec<String> = flow
            .queue
            .all()
            .iter()
            .map(|s| s.capability.clone())
            .collect();
        for capability in capabilities {
            if flow.agents.contains_key(&capability) {
                continue;
            }
            let agent_id = format!("{capability}-{short_id}");
            let agent = self.factory.create(&capability, &agent_id).await?;
            self.monitor.register(agent.capability(), agent.id()).await;
            flow.mailboxes.register(agent.id());
            flow.agents.insert(capability, agent);
        }
        info!(task_id = %flow.task.id, agents = flow.agents.len(), "Routing complete");
        Ok(())
    }

    /// Execute every subtask once, releasing dependents as their
    /// prerequisites complete.
    async fn execute_round(&self, flow: &mut Flow, round: u32, max_rounds: u32) {
        flow.queue.reset_for_round();
        flow.last_round.clear();
        let mut record = ConversationRound::new(round);

        loop {
            let ready: Vec<Subtask> = flow.queue.all_ready().into_iter().cloned().collect();
            if ready.is_empty() {
                break;
            }
            for subtask in self.optimizer.optimize(ready) {
                let entry = self.execute_subtask(flow, &subtask, round, max_rounds).await;
                record.entries.push(entry);
            }
        }

        flow.last_blocked = flow
            .queue
            .blocked()
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        for id in &flow.last_blocked {
            warn!(task_id = %flow.task.id, subtask_id = %id, round, "Subtask blocked by failed dependency");
        }
        flow.rounds.push(record);
    }

    async fn execute_subtask(
        &self,
        flow: &mut Flow,
        subtask: &Subtask,
        round: u32,
        max_rounds: u32,
    ) -> RoundEntry {
        let subtask_id = subtask.id().to_string();
        let agent = match flow.agents.get(&subtask.capability) {
            Some(a) => a.clone(),
            None => {
                // Routing registers every capability in the queue.
                let output = AgentOutput::failure(format!(
                    "no agent for capability '{}'",
                    subtask.capability
                ));
                flow.queue.mark_failed(&subtask_id, output.error.clone().unwrap_or_default());
                flow.last_round.insert(subtask_id.clone(), output.clone());
                return RoundEntry {
                    agent_id: String::new(),
                    subtask_id,
                    capability: subtask.capability.clone(),
                    strategy: Strategy::from_action(ACTION_DIRECT_RESPONSE, subtask.content()),
                    output,
                    needs_review: false,
                    reward: 0.0,
                    duration_ms: 0,
                };
            }
        };

        for message in flow.mailboxes.drain(agent.id()) {
            agent.receive_message(message).await;
        }

        let state = encode_state(subtask.content(), round);
        let action = self
            .controller
            .choose_action(self.learner.as_ref(), &state, &self.action_space)
            .await
            .unwrap_or_else(|| ACTION_DIRECT_RESPONSE.to_string());
        let strategy = Strategy::from_action(&action, subtask.content());

        let mut ctx = AgentContext::new(&flow.task.id, &flow.task.content, round, strategy.clone());
        ctx.prior_knowledge.clone_from(&flow.prior);
        for dep in &subtask.task.dependencies {
            if let Some(out) = flow.results.get(dep) {
                ctx.dependency_results.insert(dep.clone(), out.result.clone());
            }
        }

        flow.queue.mark_running(&subtask_id);
        self.monitor.start_task(agent.capability(), &subtask_id).await;
        let started = Instant::now();
        let output = match tokio::time::timeout(
            self.config.agent_timeout(),
            agent.process(subtask, &ctx),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                error!(agent_id = %agent.id(), subtask_id = %subtask_id, error = %e, "Agent failed");
                AgentOutput::failure(e.to_string()).with_extra("kind", json!(e.kind()))
            }
            Err(_) => {
                error!(agent_id = %agent.id(), subtask_id = %subtask_id, "Agent timed out");
                AgentOutput::failure(format!(
                    "agent timed out after {}s",
                    self.config.agent_timeout().as_secs()
                ))
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let success = output.is_success();
        let reward = execution_reward(success, output.confidence);
        let next_state = encode_state(&format!("{} {}", subtask.content(), output.result), round + 1);
        self.learner.update(ActionRecord {
            state,
            action: strategy.action_name().to_string(),
            reward,
            next_state,
            terminal: round >= max_rounds,
        });
        self.controller.record_outcome(reward);

        let needs_review = success
            && output
                .confidence
                .is_some_and(|c| c < self.config.review_threshold);
        self.monitor.record_duration(agent.capability(), duration_ms).await;
        if success {
            self.monitor.record_turn(agent.capability(), needs_review).await;
            flow.queue.mark_completed(&subtask_id);
            flow.results.insert(subtask_id.clone(), output.clone());
            let message =
                PeerMessage::new(agent.id(), output.result.clone(), round).for_subtask(&subtask_id);
            let delivered = flow.mailboxes.broadcast(&message);
            debug!(agent_id = %agent.id(), subtask_id = %subtask_id, delivered, "Result shared");
        } else {
            self.monitor.record_error(agent.capability()).await;
            flow.queue
                .mark_failed(&subtask_id, output.error.clone().unwrap_or_default());
        }
        self.monitor.finish_task(agent.capability()).await;

        if needs_review {
            info!(subtask_id = %subtask_id, confidence = ?output.confidence, "Output flagged for review");
        }
        flow.last_round.insert(subtask_id.clone(), output.clone());

        RoundEntry {
            agent_id: agent.id().to_string(),
            subtask_id,
            capability: agent.capability().to_string(),
            strategy,
            output,
            needs_review,
            reward,
            duration_ms,
        }
    }

    async fn synthesize(&self, flow: &mut Flow) -> CollaborationResult {
        let mut subtask_errors: Vec<SubtaskError> = Vec::new();
        for subtask in flow.queue.all() {
            let id = subtask.id();
            if let Some(reason) = flow.queue.failure(id) {
                subtask_errors.push(SubtaskError {
                    subtask_id: id.to_string(),
                    error: reason.to_string(),
                });
            } else if flow.last_blocked.iter().any(|b| b == id) {
                subtask_errors.push(SubtaskError {
                    subtask_id: id.to_string(),
                    error: "blocked: a dependency did not complete".to_string(),
                });
            }
        }

        let mut result = CollaborationResult {
            task_id: flow.task.id.clone(),
            result: String::new(),
            confidence: None,
            error: None,
            error_kind: None,
            subtask_errors,
            subtask_count: flow.queue.total_count(),
            rounds: std::mem::take(&mut flow.rounds),
            phases: Vec::new(),
            cycle_detected: flow.cycle_detected,
            from_cache: false,
        };

        let successes: Vec<(&Subtask, &AgentOutput)> = flow
            .queue
            .all()
            .iter()
            .filter_map(|s| flow.results.get(s.id()).map(|o| (s, o)))
            .collect();
        if successes.is_empty() {
            result.error = Some("no subtask produced a result".to_string());
            result.error_kind = Some("agent".to_string());
            return result;
        }

        let mut prompt = format!(
            "Combine the subtask results below into one final answer.\nTask: {}\n\nSubtask results:\n",
            flow.task.content
        );
        for (subtask, output) in &successes {
            let _ = writeln!(
                prompt,
                "- [{}] ({}) {}: {}",
                subtask.id(),
                subtask.capability,
                subtask.content(),
                output.result
            );
        }
        for e in &result.subtask_errors {
            let _ = writeln!(prompt, "- [{}] failed: {}", e.subtask_id, e.error);
        }
        prompt.push_str(
            "\nRespond with a JSON object: {\"result\": string, \"confidence\": number between 0 and 1}.",
        );

        let local_confidence = {
            let values: Vec<f64> = successes.iter().filter_map(|(_, o)| o.confidence).collect();
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        };

        match self
            .client
            .invoke_with_fallback(PLANNER_SYSTEM_PROMPT, &prompt, &synthesis_schema())
            .await
        {
            StructuredReply::Valid(value) => {
                result.result = value
                    .get("result")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                result.confidence = value
                    .get("confidence")
                    .and_then(Value::as_f64)
                    .map(|c| c.clamp(0.0, 1.0))
                    .or(local_confidence);
            }
            StructuredReply::Invalid(fallback) => {
                warn!(task_id = %flow.task.id, error = %fallback.error, "Synthesis failed, joining results");
                result.result = successes
                    .iter()
                    .map(|(_, o)| o.result.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                result.confidence = local_confidence;
                result.error = Some(format!("synthesis failed: {}", fallback.error));
                result.error_kind = Some(fallback.kind);
            }
        }
        result
    }

    async fn persist(&self, task: &Task, result: &CollaborationResult) {
        let Some(store) = &self.knowledge else {
            return;
        };
        let mut properties = Map::new();
        properties.insert("task_id".into(), json!(task.id));
        properties.insert("content".into(), json!(task.normalized_content()));
        properties.insert("task_type".into(), json!(task.task_type.as_str()));
        properties.insert("result".into(), json!(result.result));
        properties.insert("rounds".into(), json!(result.rounds.len()));
        if let Some(c) = result.confidence {
            properties.insert("confidence".into(), json!(c));
        }
        if let Err(e) = store.add_node(KNOWLEDGE_LABEL, properties).await {
            warn!(task_id = %task.id, error = %e, "Failed to record result in knowledge store");
        }
    }
}

/// Turn a validated plan into subtasks. Ids are made unique, capabilities
/// canonicalized, and dependencies on unknown ids dropped.
fn build_subtasks(task: &Task, plan: Plan, capabilities: &[&str]) -> Vec<Subtask> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut id_map: HashMap<String, String> = HashMap::new();
    let mut ids = Vec::with_capacity(plan.subtasks.len());
    for (i, step) in plan.subtasks.iter().enumerate() {
        let raw = step
            .id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| format!("s{}", i + 1), str::to_string);
        let id = if seen.contains(&raw) {
            format!("{raw}-{}", i + 1)
        } else {
            raw.clone()
        };
        seen.insert(id.clone());
        id_map.entry(raw).or_insert_with(|| id.clone());
        ids.push(id);
    }

    plan.subtasks
        .into_iter()
        .zip(ids)
        .enumerate()
        .map(|(i, (step, id))| {
            let capability = match step.capability.as_deref() {
                Some(c) if !c.trim().is_empty() => canonical_capability(c),
                _ => capabilities
                    .get(i % capabilities.len().max(1))
                    .map_or_else(|| canonical_capability(""), |c| (*c).to_string()),
            };
            let mut subtask = Subtask::new(task, step.description.trim(), capability).with_id(&id);
            for dep in step.dependencies {
                match id_map.get(dep.trim()) {
                    Some(target) if *target != id => subtask = subtask.depends_on(target.clone()),
                    Some(_) => warn!(subtask_id = %id, "Dropping self-dependency"),
                    None => warn!(subtask_id = %id, dependency = %dep, "Dropping unknown dependency"),
                }
            }
            subtask
        })
        .collect()
}

/// Remove the listed `(dependent, dependency)` edges from `subtask`.
fn drop_dependencies(mut subtask: Subtask, edges: &[(String, String)]) -> Subtask {
    if edges.is_empty() {
        return subtask;
    }
    let id = subtask.id().to_string();
    subtask
        .task
        .dependencies
        .retain(|dep| !edges.iter().any(|(a, b)| *a == id && b == dep));
    subtask
}

/// One subtask per required capability, each depending on the previous.
fn default_subtasks(task: &Task, capabilities: &[&str]) -> Vec<Subtask> {
    let mut out: Vec<Subtask> = Vec::with_capacity(capabilities.len());
    for (i, capability) in capabilities.iter().enumerate() {
        let content = if i == 0 {
            task.content.clone()
        } else {
            format!("Continue the work on: {}", task.content)
        };
        let mut subtask = Subtask::new(task, content, *capability).with_id(format!("s{}", i + 1));
        if let Some(prev) = out.last() {
            subtask = subtask.depends_on(prev.id().to_string());
        }
        out.push(subtask);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ensemble_core::TaskType;

    fn plan(value: Value) -> Plan {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_default_plan_for_general_task() {
        let task = Task::new("summarize file X");
        let subs = default_subtasks(&task, &required_capabilities(task.task_type));
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].capability, "general");
        assert_eq!(subs[0].content(), "summarize file X");
    }

    #[test]
    fn test_default_plan_for_coding_task_chains() {
        let task = Task::new("write a parser").with_type(TaskType::Coding);
        let subs = default_subtasks(&task, &required_capabilities(task.task_type));
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].capability, "programmer");
        assert_eq!(subs[1].capability, "code_reviewer");
        assert_eq!(subs[1].task.dependencies, vec!["s1".to_string()]);
    }

    #[test]
    fn test_drop_dependencies_only_listed_edges() {
        let task = Task::new("t");
        let sub = Subtask::new(&task, "x", "general")
            .with_id("x")
            .depends_on("root")
            .depends_on("z");
        let edges = vec![
            ("x".to_string(), "z".to_string()),
            ("z".to_string(), "root".to_string()),
        ];
        let kept = drop_dependencies(sub, &edges);
        assert_eq!(kept.task.dependencies, vec!["root".to_string()]);
    }

    #[test]
    fn test_build_subtasks_drops_unknown_dependencies() {
        let task = Task::new("t").with_type(TaskType::Coding);
        let subs = build_subtasks(
            &task,
            plan(json!({"subtasks": [
                {"id": "a", "description": "write", "capability": "coder", "dependencies": []},
                {"id": "b", "description": "check", "dependencies": ["a", "zzz", "b"]}
            ]})),
            &required_capabilities(task.task_type),
        );
        assert_eq!(subs[0].capability, "programmer");
        assert_eq!(subs[1].capability, "code_reviewer");
        assert_eq!(subs[1].task.dependencies, vec!["a".to_string()]);
    }

    #[test]
    fn test_build_subtasks_uniquifies_ids() {
        let task = Task::new("t");
        let subs = build_subtasks(
            &task,
            plan(json!({"subtasks": [
                {"id": "x", "description": "one", "dependencies": []},
                {"id": "x", "description": "two", "dependencies": []},
                {"description": "three", "dependencies": ["x"]}
            ]})),
            &["general"],
        );
        let ids: Vec<&str> = subs.iter().map(Subtask::id).collect();
        assert_eq!(ids, vec!["x", "x-2", "s3"]);
        assert_eq!(subs[2].task.dependencies, vec!["x".to_string()]);
    }
}
