//! Stochastic reordering of ready items.

use ensemble_core::Schedulable;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Annealing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Candidate orderings evaluated per call.
    pub budget: usize,
    /// Fixed seed for reproducible orderings.
    pub seed: Option<u64>,
    /// Starting annealing temperature.
    pub initial_temperature: f64,
    /// Multiplied into the temperature after every evaluation.
    pub cooling: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            budget: 1000,
            seed: None,
            initial_temperature: 0.5,
            cooling: 0.99,
        }
    }
}

/// Searches for an ordering that front-loads high-priority items.
///
/// Only ever permutes what it is given, so callers pass the set of items
/// whose dependencies are already satisfied.
pub struct TaskOrderOptimizer {
    config: OptimizerConfig,
    rng: Mutex<StdRng>,
}

impl TaskOrderOptimizer {
    /// Optimizer seeded from `config.seed`, or from entropy.
    pub fn new(config: OptimizerConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
        }
    }

    /// Settings in effect.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// `-Σ priority_i × (n − i)`. Lower is better.
    pub fn cost<T: Schedulable>(items: &[T]) -> f64 {
        let n = items.len();
        -items
            .iter()
            .enumerate()
            .map(|(i, t)| t.effective_priority() * (n - i) as f64)
            .sum::<f64>()
    }

    /// Return a permutation of `items` whose cost is no worse than the
    /// input order's.
    pub fn optimize<T: Schedulable>(&self, items: Vec<T>) -> Vec<T> {
        let n = items.len();
        if n < 2 || self.config.budget == 0 {
            return items;
        }

        let p: Vec<f64> = items.iter().map(Schedulable::effective_priority).collect();
        let weight = |pos: usize| (n - pos) as f64;
        let cost_of = |perm: &[usize]| -> f64 {
            -perm
                .iter()
                .enumerate()
                .map(|(pos, &i)| p[i] * weight(pos))
                .sum::<f64>()
        };

        let mut perm: Vec<usize> = (0..n).collect();
        let mut current = cost_of(&perm);
        let initial = current;
        let mut best = perm.clone();
        let mut best_cost = current;
        let mut temperature = self.config.initial_temperature.max(f64::MIN_POSITIVE);

        {
            let mut rng = self.rng.lock();
            for _ in 0..self.config.budget {
                let i = rng.gen_range(0..n);
                let mut j = rng.gen_range(0..n - 1);
                if j >= i {
                    j += 1;
                }
                let delta = (p[perm[i]] - p[perm[j]]) * (weight(i) - weight(j));
                let accept = delta <= 0.0 || rng.gen::<f64>() < (-delta / temperature).exp();
                if accept {
                    perm.swap(i, j);
                    current += delta;
                    if current < best_cost {
                        best_cost = current;
                        best.clone_from(&perm);
                    }
                }
                temperature = (temperature * self.config.cooling).max(f64::MIN_POSITIVE);
            }
        }

        debug!(items = n, initial, best = best_cost, "Ordering optimized");

        let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
        best.into_iter().filter_map(|i| slots[i].take()).collect()
    }
}

impl Default for TaskOrderOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}
