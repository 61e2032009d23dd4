use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// What an agent hands back after processing a subtask.
///
/// Serializes to a flat map with at least a `result` field; `error`,
/// `confidence` and `done` are omitted when unset, and `extras` are merged
/// into the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Main textual result. Empty on failure.
    #[serde(default)]
    pub result: String,
    /// Error message, if processing failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Self-reported confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Agent signals its part of the task is finished.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub done: bool,
    /// Free-form additional fields.
    #[serde(flatten)]
    pub extras: Map<String, Value>,
}

impl AgentOutput {
    /// A successful output carrying `result`.
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            ..Self::default()
        }
    }

    /// A failed output carrying `error`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Set the confidence, clamped to `[0, 1]`.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Mark the output as done.
    pub fn with_done(mut self, done: bool) -> Self {
        self.done = done;
        self
    }

    /// Attach an extra field.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// True when no error was reported.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Render as a JSON object.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}
