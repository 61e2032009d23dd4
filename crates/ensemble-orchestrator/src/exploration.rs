//! Adaptive exploration over strategy choices.

use crate::learner::ActionValueLearner;
use parking_lot::Mutex;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// Bounds and adaptation factors for the exploration controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorationConfig {
    /// Starting probability of exploring.
    pub initial_rate: f64,
    /// Starting softmax temperature.
    pub initial_temperature: f64,
    /// Lower clamp for the exploration rate.
    pub min_rate: f64,
    /// Upper clamp for the exploration rate.
    pub max_rate: f64,
    /// Lower clamp for the temperature.
    pub min_temperature: f64,
    /// Upper clamp for the temperature.
    pub max_temperature: f64,
    /// Rewards averaged as "recent performance".
    pub recent_window: usize,
    /// Rewards kept for the running baseline.
    pub baseline_window: usize,
    /// Rate multiplier while recent rewards beat the baseline.
    pub rate_decay: f64,
    /// Temperature multiplier while recent rewards beat the baseline.
    pub temperature_decay: f64,
    /// Rate multiplier otherwise.
    pub rate_growth: f64,
    /// Temperature multiplier otherwise.
    pub temperature_growth: f64,
    /// Fixed RNG seed; entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for ExplorationConfig {
    fn default() -> Self {
        Self {
            initial_rate: 0.5,
            initial_temperature: 1.0,
            min_rate: 0.1,
            max_rate: 0.9,
            min_temperature: 0.5,
            max_temperature: 2.0,
            recent_window: 10,
            baseline_window: 100,
            rate_decay: 0.95,
            temperature_decay: 0.98,
            rate_growth: 1.05,
            temperature_growth: 1.02,
            seed: None,
        }
    }
}

struct ControllerState {
    rate: f64,
    temperature: f64,
    history: VecDeque<f64>,
    rng: StdRng,
}

/// Decides when to explore and how sharply to sample among actions.
///
/// Exploration narrows while recent rewards beat the running baseline and
/// widens otherwise. Rate and temperature always stay within their bounds.
pub struct ExplorationController {
    config: ExplorationConfig,
    state: Mutex<ControllerState>,
}

/// Numerically stable `softmax(values / temperature)`.
pub fn softmax(values: &[f64], temperature: f64) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let t = temperature.max(f64::MIN_POSITIVE);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = values.iter().map(|v| ((v - max) / t).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn mean<'a>(values: impl Iterator<Item = &'a f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

impl ExplorationController {
    /// Controller starting at the configured rate and temperature.
    pub fn new(config: ExplorationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let rate = config.initial_rate.clamp(config.min_rate, config.max_rate);
        let temperature = config
            .initial_temperature
            .clamp(config.min_temperature, config.max_temperature);
        Self {
            state: Mutex::new(ControllerState {
                rate,
                temperature,
                history: VecDeque::with_capacity(config.baseline_window),
                rng,
            }),
            config,
        }
    }

    /// Current exploration probability.
    pub fn rate(&self) -> f64 {
        self.state.lock().rate
    }

    /// Current softmax temperature.
    pub fn temperature(&self) -> f64 {
        self.state.lock().temperature
    }

    /// Rewards currently kept for adaptation.
    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Bernoulli draw with the current exploration rate.
    pub fn should_explore(&self, _state: &[f64]) -> bool {
        let mut s = self.state.lock();
        let rate = s.rate;
        s.rng.gen::<f64>() < rate
    }

    /// Sampling distribution over `values` at the current temperature.
    pub fn action_probabilities(&self, values: &[f64]) -> Vec<f64> {
        softmax(values, self.temperature())
    }

    /// Pick an action for `state`.
    ///
    /// Exploiting takes the learner's best action. Exploring takes a novel
    /// proposal from the learner when it has one, otherwise samples from
    /// the softmax over the learner's values.
    pub async fn choose_action(
        &self,
        learner: &dyn ActionValueLearner,
        state: &[f64],
        actions: &[String],
    ) -> Option<String> {
        if actions.is_empty() {
            return None;
        }
        if !self.should_explore(state) {
            return learner.best_action(state, actions);
        }
        if let Some(novel) = learner.propose_novel_action(state, actions).await {
            debug!(action = %novel, "Exploring novel action");
            return Some(novel);
        }
        let probs = self.action_probabilities(&learner.action_values(state, actions));
        let dist = WeightedIndex::new(&probs).ok()?;
        let index = dist.sample(&mut self.state.lock().rng);
        actions.get(index).cloned()
    }

    /// Fold one reward into the history and adapt rate and temperature.
    ///
    /// Adaptation starts once the history is longer than the recent window.
    pub fn record_outcome(&self, reward: f64) {
        let cfg = &self.config;
        let mut s = self.state.lock();
        s.history.push_back(reward);
        while s.history.len() > cfg.baseline_window.max(1) {
            s.history.pop_front();
        }
        if s.history.len() <= cfg.recent_window {
            return;
        }

        let recent = mean(s.history.iter().rev().take(cfg.recent_window));
        let baseline = mean(s.history.iter());
        if recent > baseline {
            s.rate *= cfg.rate_decay;
            s.temperature *= cfg.temperature_decay;
        } else {
            s.rate *= cfg.rate_growth;
            s.temperature *= cfg.temperature_growth;
        }
        s.rate = s.rate.clamp(cfg.min_rate, cfg.max_rate);
        s.temperature = s.temperature.clamp(cfg.min_temperature, cfg.max_temperature);
        debug!(recent, baseline, rate = s.rate, temperature = s.temperature, "Exploration adapted");
    }
}

impl Default for ExplorationController {
    fn default() -> Self {
        Self::new(ExplorationConfig::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::learner::{LearnerConfig, TabularLearner};

    fn seeded() -> ExplorationController {
        ExplorationController::new(ExplorationConfig {
            seed: Some(11),
            ..ExplorationConfig::default()
        })
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0], 1.0);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(p[2] > p[1] && p[1] > p[0]);
        let flat = softmax(&[5.0, 5.0], 0.5);
        assert!((flat[0] - 0.5).abs() < 1e-9);
        assert!(softmax(&[], 1.0).is_empty());
    }

    #[test]
    fn test_lower_temperature_is_sharper() {
        let hot = softmax(&[0.0, 1.0], 2.0);
        let cold = softmax(&[0.0, 1.0], 0.5);
        assert!(cold[1] > hot[1]);
    }

    // ── Test: improving rewards narrow exploration ──

    #[test]
    fn test_rate_decreases_after_above_baseline_cycles() {
        let c = seeded();
        for _ in 0..10 {
            c.record_outcome(0.0);
        }
        assert!((c.rate() - 0.5).abs() < 1e-9);
        for _ in 0..10 {
            c.record_outcome(1.0);
        }
        assert!(c.rate() < 0.5);
        assert!(c.rate() >= 0.1);
        assert!(c.temperature() < 1.0);
    }

    #[test]
    fn test_flat_rewards_widen_exploration_within_bounds() {
        let c = seeded();
        for _ in 0..200 {
            c.record_outcome(0.5);
        }
        assert!((c.rate() - 0.9).abs() < 1e-9);
        assert!((c.temperature() - 2.0).abs() < 1e-9);
        assert_eq!(c.history_len(), 100);
    }

    #[test]
    fn test_rate_never_below_minimum() {
        let c = seeded();
        let mut reward = 0.0;
        for _ in 0..500 {
            reward += 1.0;
            c.record_outcome(reward);
        }
        assert!(c.rate() >= 0.1);
        assert!(c.temperature() >= 0.5);
    }

    #[test]
    fn test_should_explore_respects_extremes() {
        let never = ExplorationController::new(ExplorationConfig {
            initial_rate: 0.0,
            min_rate: 0.0,
            seed: Some(1),
            ..ExplorationConfig::default()
        });
        assert!((0..50).all(|_| !never.should_explore(&[])));
        let always = ExplorationController::new(ExplorationConfig {
            initial_rate: 1.0,
            max_rate: 1.0,
            seed: Some(1),
            ..ExplorationConfig::default()
        });
        assert!((0..50).all(|_| always.should_explore(&[])));
    }

    #[tokio::test]
    async fn test_choose_action_stays_in_space_without_generator() {
        let c = seeded();
        let learner = TabularLearner::new(LearnerConfig {
            seed: Some(2),
            ..LearnerConfig::default()
        });
        let actions = vec!["direct_response".to_string(), "generative_step".to_string()];
        for _ in 0..30 {
            let a = c.choose_action(&learner, &[0.0, 0.1], &actions).await.unwrap();
            assert!(actions.contains(&a));
        }
        assert!(c.choose_action(&learner, &[0.0], &[]).await.is_none());
    }
}
