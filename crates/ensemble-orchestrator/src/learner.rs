//! Action-value learning over strategy choices.

use async_trait::async_trait;
use ensemble_agent::ResilientClient;
use ensemble_core::ActionRecord;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

const NOVEL_ACTION_SYSTEM_PROMPT: &str =
    "You are an AI specializing in creative problem-solving and action generation.";

/// Learner hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    /// Transitions kept in the replay buffer.
    pub replay_capacity: usize,
    /// Transitions sampled per update. Learning starts once the buffer
    /// holds this many.
    pub batch_size: usize,
    /// Soft-update rate of the target table.
    pub tau: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Step size of the Q update.
    pub learning_rate: f64,
    /// Fixed RNG seed for minibatch sampling; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            replay_capacity: 10_000,
            batch_size: 64,
            tau: 0.005,
            gamma: 0.99,
            learning_rate: 0.1,
            seed: None,
        }
    }
}

/// Estimates how good each action is in a state.
#[async_trait]
pub trait ActionValueLearner: Send + Sync {
    /// Value estimate for each of `actions`, in the same order.
    fn action_values(&self, state: &[f64], actions: &[String]) -> Vec<f64>;

    /// Feed one transition.
    fn update(&self, record: ActionRecord);

    /// Highest-valued action; ties go to the earliest.
    fn best_action(&self, state: &[f64], actions: &[String]) -> Option<String> {
        let values = self.action_values(state, actions);
        let mut best: Option<(usize, f64)> = None;
        for (i, v) in values.into_iter().enumerate() {
            if best.map_or(true, |(_, b)| v > b) {
                best = Some((i, v));
            }
        }
        best.and_then(|(i, _)| actions.get(i).cloned())
    }

    /// An action outside `actions`, if the learner can come up with one.
    async fn propose_novel_action(&self, _state: &[f64], _actions: &[String]) -> Option<String> {
        None
    }
}

/// Bounded FIFO of transitions with uniform sampling.
pub struct ReplayBuffer {
    capacity: usize,
    records: VecDeque<ActionRecord>,
}

impl ReplayBuffer {
    /// Empty buffer holding at most `capacity` records (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Append, evicting the oldest record when full.
    pub fn push(&mut self, record: ActionRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Up to `batch` distinct records chosen uniformly at random.
    pub fn sample(&self, batch: usize, rng: &mut StdRng) -> Vec<&ActionRecord> {
        let amount = batch.min(self.records.len());
        rand::seq::index::sample(rng, self.records.len(), amount)
            .into_iter()
            .filter_map(|i| self.records.get(i))
            .collect()
    }

    /// Records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum records held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

type StateKey = Vec<i32>;

/// Quantize a state so nearby states share table entries.
fn state_key(state: &[f64]) -> StateKey {
    state.iter().map(|v| (v * 10.0).round() as i32).collect()
}

struct TableState {
    q: HashMap<(StateKey, String), f64>,
    target: HashMap<(StateKey, String), f64>,
    actions: BTreeSet<String>,
    replay: ReplayBuffer,
    rng: StdRng,
    updates: u64,
}

/// Tabular Q-learner with experience replay and a soft-updated target
/// table.
pub struct TabularLearner {
    config: LearnerConfig,
    state: RwLock<TableState>,
    generator: Option<Arc<ResilientClient>>,
}

impl TabularLearner {
    /// Empty tables and buffer.
    pub fn new(config: LearnerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let replay = ReplayBuffer::new(config.replay_capacity);
        Self {
            config,
            state: RwLock::new(TableState {
                q: HashMap::new(),
                target: HashMap::new(),
                actions: BTreeSet::new(),
                replay,
                rng,
                updates: 0,
            }),
            generator: None,
        }
    }

    /// Use `client` to propose actions outside the known space.
    pub fn with_generator(mut self, client: Arc<ResilientClient>) -> Self {
        self.generator = Some(client);
        self
    }

    /// Hyperparameters in effect.
    pub fn config(&self) -> &LearnerConfig {
        &self.config
    }

    /// Number of learning steps taken.
    pub fn updates(&self) -> u64 {
        self.state.read().updates
    }

    /// Transitions in the replay buffer.
    pub fn replay_len(&self) -> usize {
        self.state.read().replay.len()
    }

    /// Current estimate for one state/action pair.
    pub fn value(&self, state: &[f64], action: &str) -> f64 {
        let table = self.state.read();
        table
            .q
            .get(&(state_key(state), action.to_string()))
            .copied()
            .unwrap_or(0.0)
    }

    fn learn(&self, table: &mut TableState) {
        let TableState {
            q,
            target,
            actions,
            replay,
            rng,
            updates,
        } = table;

        let batch = replay.sample(self.config.batch_size, rng);
        for record in batch {
            let next_key = state_key(&record.next_state);
            let next_best = actions
                .iter()
                .filter_map(|a| target.get(&(next_key.clone(), a.clone())))
                .copied()
                .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
                .unwrap_or(0.0);
            let continuation = if record.terminal { 0.0 } else { 1.0 };
            let goal = record.reward + self.config.gamma * next_best * continuation;

            let entry = q
                .entry((state_key(&record.state), record.action.clone()))
                .or_insert(0.0);
            *entry += self.config.learning_rate * (goal - *entry);
        }

        let tau = self.config.tau;
        for (key, value) in &*q {
            let t = target.entry(key.clone()).or_insert(0.0);
            *t = tau * value + (1.0 - tau) * *t;
        }
        *updates += 1;
    }
}

impl Default for TabularLearner {
    fn default() -> Self {
        Self::new(LearnerConfig::default())
    }
}

#[async_trait]
impl ActionValueLearner for TabularLearner {
    fn action_values(&self, state: &[f64], actions: &[String]) -> Vec<f64> {
        let key = state_key(state);
        let table = self.state.read();
        actions
            .iter()
            .map(|a| table.q.get(&(key.clone(), a.clone())).copied().unwrap_or(0.0))
            .collect()
    }

    fn update(&self, record: ActionRecord) {
        let mut table = self.state.write();
        table.actions.insert(record.action.clone());
        table.replay.push(record);
        if table.replay.len() < self.config.batch_size {
            return;
        }
        self.learn(&mut table);
        debug!(updates = table.updates, replay = table.replay.len(), "Learner updated");
    }

    async fn propose_novel_action(&self, state: &[f64], actions: &[String]) -> Option<String> {
        let client = self.generator.as_ref()?;
        let state_description = state
            .iter()
            .map(|v| format!("{v:.3}"))
            .collect::<Vec<_>>()
            .join(" ");
        let prompt = format!(
            "Given the current state: {state_description}\n\
             And the following available actions: {}\n\n\
             Generate a novel action that is not in the list of available actions but could \
             potentially be beneficial.\nProvide your response as a single line describing the \
             novel action.",
            actions.join(", ")
        );
        match client.invoke(NOVEL_ACTION_SYSTEM_PROMPT, &prompt).await {
            Ok(text) => {
                let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
                if actions.iter().any(|a| a == line) {
                    None
                } else {
                    Some(line.to_string())
                }
            }
            Err(e) => {
                warn!(error = %e, "Novel action generation failed");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use ensemble_agent::{InferenceBackend, RetryPolicy};
    use ensemble_core::EnsembleResult;

    fn record(action: &str, reward: f64) -> ActionRecord {
        ActionRecord {
            state: vec![0.1, 0.2],
            action: action.to_string(),
            reward,
            next_state: vec![0.1, 0.2],
            terminal: true,
        }
    }

    fn small(batch: usize) -> TabularLearner {
        TabularLearner::new(LearnerConfig {
            batch_size: batch,
            seed: Some(3),
            ..LearnerConfig::default()
        })
    }

    // ── Test 1: replay buffer bounds ──

    #[test]
    fn test_replay_evicts_oldest() {
        let mut buf = ReplayBuffer::new(2);
        buf.push(record("a", 1.0));
        buf.push(record("b", 1.0));
        buf.push(record("c", 1.0));
        assert_eq!(buf.len(), 2);
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen: Vec<String> = buf.sample(10, &mut rng).iter().map(|r| r.action.clone()).collect();
        seen.sort();
        assert_eq!(seen, vec!["b", "c"]);
    }

    // ── Test 2: no learning before a full batch ──

    #[test]
    fn test_waits_for_batch() {
        let learner = small(4);
        for _ in 0..3 {
            learner.update(record("direct_response", 1.0));
        }
        assert_eq!(learner.updates(), 0);
        assert_eq!(learner.value(&[0.1, 0.2], "direct_response"), 0.0);
        learner.update(record("direct_response", 1.0));
        assert_eq!(learner.updates(), 1);
        assert!(learner.value(&[0.1, 0.2], "direct_response") > 0.0);
    }

    // ── Test 3: rewarded action becomes best ──

    #[test]
    fn test_rewarded_action_preferred() {
        let learner = small(1);
        for _ in 0..20 {
            learner.update(record("direct_response", 1.5));
            learner.update(record("generative_step", 0.0));
        }
        let actions = vec!["generative_step".to_string(), "direct_response".to_string()];
        assert_eq!(
            learner.best_action(&[0.1, 0.2], &actions).as_deref(),
            Some("direct_response")
        );
    }

    #[test]
    fn test_best_action_ties_go_to_first() {
        let learner = small(64);
        let actions = vec!["x".to_string(), "y".to_string()];
        assert_eq!(learner.best_action(&[0.0], &actions).as_deref(), Some("x"));
        assert!(learner.best_action(&[0.0], &[]).is_none());
    }

    // ── Test 4: novel actions ──

    struct Fixed(&'static str);

    #[async_trait]
    impl InferenceBackend for Fixed {
        async fn generate(&self, _s: &str, _p: &str) -> EnsembleResult<String> {
            Ok(self.0.to_string())
        }
        fn name(&self) -> &str {
            "fixed"
        }
    }

    fn with_reply(reply: &'static str) -> TabularLearner {
        small(64).with_generator(Arc::new(ResilientClient::new(
            Arc::new(Fixed(reply)),
            RetryPolicy::default(),
        )))
    }

    #[tokio::test]
    async fn test_novel_action_from_generator() {
        let actions = vec!["direct_response".to_string()];
        let novel = with_reply("\n  sketch an outline first\nmore text")
            .propose_novel_action(&[0.0], &actions)
            .await;
        assert_eq!(novel.as_deref(), Some("sketch an outline first"));
    }

    #[tokio::test]
    async fn test_known_action_is_not_novel() {
        let actions = vec!["direct_response".to_string()];
        let novel = with_reply("direct_response")
            .propose_novel_action(&[0.0], &actions)
            .await;
        assert!(novel.is_none());
        assert!(small(64).propose_novel_action(&[0.0], &actions).await.is_none());
    }
}
