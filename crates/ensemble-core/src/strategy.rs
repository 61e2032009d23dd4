use serde::{Deserialize, Serialize};

/// Action name for [`Strategy::DirectResponse`].
pub const ACTION_DIRECT_RESPONSE: &str = "direct_response";
/// Action name for [`Strategy::GenerativeStep`].
pub const ACTION_GENERATIVE_STEP: &str = "generative_step";

/// The default action space offered to the exploration controller.
pub fn default_action_space() -> Vec<String> {
    vec![
        ACTION_DIRECT_RESPONSE.to_string(),
        ACTION_GENERATIVE_STEP.to_string(),
    ]
}

/// The chosen execution plan for one subtask in one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Strategy {
    /// Ask the backend to produce an executable step in `language`.
    GenerativeStep {
        /// Target language of the step, e.g. `python`.
        language: String,
        /// Instructions the step must satisfy.
        payload: String,
    },
    /// Ask the backend for an answer directly.
    DirectResponse {
        /// Prompt sent to the backend.
        prompt: String,
    },
}

impl Strategy {
    /// Build a strategy from an action name. Unrecognised (novel) actions
    /// become a direct response whose prompt carries the proposed approach.
    pub fn from_action(action: &str, subtask_text: &str) -> Self {
        match action {
            ACTION_GENERATIVE_STEP => Strategy::GenerativeStep {
                language: "python".to_string(),
                payload: subtask_text.to_string(),
            },
            ACTION_DIRECT_RESPONSE => Strategy::DirectResponse {
                prompt: subtask_text.to_string(),
            },
            novel => Strategy::DirectResponse {
                prompt: format!("Approach: {novel}\n\nTask: {subtask_text}"),
            },
        }
    }

    /// Name of the action this strategy was built from.
    pub fn action_name(&self) -> &'static str {
        match self {
            Strategy::GenerativeStep { .. } => ACTION_GENERATIVE_STEP,
            Strategy::DirectResponse { .. } => ACTION_DIRECT_RESPONSE,
        }
    }
}

/// One learning transition: the unit consumed by a learner update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Encoded state the action was chosen in.
    pub state: Vec<f64>,
    /// Name of the chosen action.
    pub action: String,
    /// Observed reward.
    pub reward: f64,
    /// Encoded state after the action.
    pub next_state: Vec<f64>,
    /// Whether the episode ended with this transition.
    pub terminal: bool,
}

/// Reward for one execution: `1.0` for success plus `0.5 × confidence`.
///
/// Confidence counts as `1.0` when a successful execution does not report
/// one, and as `0.0` on failure.
pub fn execution_reward(success: bool, confidence: Option<f64>) -> f64 {
    if !success {
        return 0.0;
    }
    1.0 + 0.5 * confidence.unwrap_or(1.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_known_actions() {
        let step = Strategy::from_action(ACTION_GENERATIVE_STEP, "sum a list");
        assert_eq!(
            step,
            Strategy::GenerativeStep {
                language: "python".into(),
                payload: "sum a list".into()
            }
        );
        assert_eq!(step.action_name(), "generative_step");
    }

    #[test]
    fn test_novel_action_becomes_direct_response() {
        let s = Strategy::from_action("ask three experts", "pick a db");
        match s {
            Strategy::DirectResponse { prompt } => {
                assert!(prompt.contains("ask three experts"));
                assert!(prompt.contains("pick a db"));
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn test_reward() {
        assert_eq!(execution_reward(true, None), 1.5);
        assert!((execution_reward(true, Some(0.4)) - 1.2).abs() < 1e-12);
        assert_eq!(execution_reward(false, Some(0.9)), 0.0);
    }
}
