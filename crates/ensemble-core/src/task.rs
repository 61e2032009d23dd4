use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declared kind of a task. Drives capability routing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Code-producing work.
    Coding,
    /// UI/UX design work.
    Design,
    /// Research or analysis.
    Research,
    /// Anything without a more specific tag, including unknown tags.
    #[default]
    #[serde(other)]
    General,
}

impl TaskType {
    /// The lowercase tag used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::General => "general",
            TaskType::Coding => "coding",
            TaskType::Design => "design",
            TaskType::Research => "research",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "coding" => TaskType::Coding,
            "design" => TaskType::Design,
            "research" => TaskType::Research,
            _ => TaskType::General,
        })
    }
}

/// Categorical priority supplied by the submitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLabel {
    /// Maps to 0.3.
    Low,
    /// Maps to 0.5.
    #[default]
    Medium,
    /// Maps to 0.7.
    High,
    /// Any label not recognised. Scored like `Medium`.
    #[serde(other)]
    Unknown,
}

impl PriorityLabel {
    /// Fixed numeric value for this label.
    pub fn score(&self) -> f64 {
        match self {
            PriorityLabel::Low => 0.3,
            PriorityLabel::Medium => 0.5,
            PriorityLabel::High => 0.7,
            PriorityLabel::Unknown => 0.5,
        }
    }
}

impl FromStr for PriorityLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "low" => PriorityLabel::Low,
            "medium" => PriorityLabel::Medium,
            "high" => PriorityLabel::High,
            _ => PriorityLabel::Unknown,
        })
    }
}

/// Lifecycle status of a task or subtask.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting on dependencies or scheduling.
    #[default]
    Pending,
    /// Currently handed to an agent.
    Running,
    /// Finished with a usable result.
    Completed,
    /// Finished with an error.
    Failed,
}

fn default_weight() -> f64 {
    1.0
}

fn default_priority() -> f64 {
    PriorityLabel::Medium.score()
}

/// `priority` as submitters write it: a normalized number or a label.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum PriorityInput {
    Value(f64),
    Label(PriorityLabel),
}

/// Wire shape accepted when reading a [`Task`].
#[derive(Deserialize)]
struct TaskRepr {
    id: String,
    content: String,
    #[serde(default, rename = "type")]
    task_type: TaskType,
    #[serde(default)]
    label: Option<PriorityLabel>,
    #[serde(default)]
    priority: Option<PriorityInput>,
    #[serde(default = "default_weight")]
    importance: f64,
    #[serde(default = "default_weight")]
    urgency: f64,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    status: TaskStatus,
    #[serde(default)]
    score: Option<f64>,
}

impl From<TaskRepr> for Task {
    fn from(repr: TaskRepr) -> Self {
        // An explicit `label` wins over a label given through `priority`.
        let (label, priority) = match repr.priority {
            Some(PriorityInput::Value(v)) => (repr.label.unwrap_or_default(), v),
            Some(PriorityInput::Label(l)) => (repr.label.unwrap_or(l), default_priority()),
            None => (repr.label.unwrap_or_default(), default_priority()),
        };
        Self {
            id: repr.id,
            content: repr.content,
            task_type: repr.task_type,
            label,
            priority,
            importance: repr.importance,
            urgency: repr.urgency,
            dependencies: repr.dependencies,
            metadata: repr.metadata,
            status: repr.status,
            score: repr.score,
        }
    }
}

/// A unit of work submitted to the orchestrator.
///
/// `content` is immutable once created. The prioritizer writes `priority`
/// and `score`; the orchestrator writes `status`.
///
/// On input `priority` may also be a label (`"high"`), in which case it
/// sets `label` the same way the `label` key does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "TaskRepr")]
pub struct Task {
    /// Unique identifier.
    pub id: String,
    /// Free-text description of the work.
    pub content: String,
    /// Declared kind of work.
    #[serde(default, rename = "type")]
    pub task_type: TaskType,
    /// Label the priority was derived from.
    #[serde(default)]
    pub label: PriorityLabel,
    /// Normalized priority in `[0, 1]`.
    pub priority: f64,
    /// Importance weight used by batch scoring.
    #[serde(default = "default_weight")]
    pub importance: f64,
    /// Urgency weight used by batch scoring.
    #[serde(default = "default_weight")]
    pub urgency: f64,
    /// Ids that must complete before this task may run.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Arbitrary caller metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Batch score assigned by the prioritizer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Task {
    /// Create a general, medium-priority task with a fresh id.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            task_type: TaskType::General,
            label: PriorityLabel::Medium,
            priority: PriorityLabel::Medium.score(),
            importance: 1.0,
            urgency: 1.0,
            dependencies: Vec::new(),
            metadata: HashMap::new(),
            status: TaskStatus::Pending,
            score: None,
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the declared type.
    pub fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Set the priority label. The numeric priority is recomputed by the
    /// prioritizer, not here.
    pub fn with_label(mut self, label: PriorityLabel) -> Self {
        self.label = label;
        self
    }

    /// Append a dependency id.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Content with surrounding whitespace removed. This is the only field
    /// that identifies a task for caching purposes.
    pub fn normalized_content(&self) -> &str {
        self.content.trim()
    }
}

/// A piece of a decomposed [`Task`], routed to an agent by capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    /// Task-shaped body of the subtask.
    #[serde(flatten)]
    pub task: Task,
    /// Id of the task this was decomposed from.
    pub parent_id: String,
    /// Capability tag an agent must carry to process this subtask.
    pub capability: String,
}

impl Subtask {
    /// Create a subtask of `parent`, inheriting its type and priority.
    pub fn new(parent: &Task, content: impl Into<String>, capability: impl Into<String>) -> Self {
        let mut task = Task::new(content)
            .with_type(parent.task_type)
            .with_label(parent.label);
        task.priority = parent.priority;
        Self {
            task,
            parent_id: parent.id.clone(),
            capability: capability.into(),
        }
    }

    /// Replace the generated id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.task.id = id.into();
        self
    }

    /// Append a dependency id.
    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.task.dependencies.push(id.into());
        self
    }

    /// The subtask's own id.
    pub fn id(&self) -> &str {
        &self.task.id
    }

    /// The subtask's description.
    pub fn content(&self) -> &str {
        &self.task.content
    }
}

/// Anything the prioritizer and optimizer can order.
pub trait Schedulable {
    /// Unique id within a batch.
    fn id(&self) -> &str;
    /// Ids that must complete first.
    fn dependencies(&self) -> &[String];
    /// Declared priority label.
    fn label(&self) -> PriorityLabel;
    /// Normalized priority.
    fn priority(&self) -> f64;
    /// Overwrite the normalized priority.
    fn set_priority(&mut self, priority: f64);
    /// Importance weight.
    fn importance(&self) -> f64;
    /// Urgency weight.
    fn urgency(&self) -> f64;
    /// Batch score, once assigned.
    fn score(&self) -> Option<f64>;
    /// Record the batch score.
    fn set_score(&mut self, score: f64);

    /// Value the optimizer front-loads: the batch score when one has been
    /// assigned, otherwise the normalized priority.
    fn effective_priority(&self) -> f64 {
        self.score().unwrap_or_else(|| self.priority())
    }
}

impl Schedulable for Task {
    fn id(&self) -> &str {
        &self.id
    }
    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }
    fn label(&self) -> PriorityLabel {
        self.label
    }
    fn priority(&self) -> f64 {
        self.priority
    }
    fn set_priority(&mut self, priority: f64) {
        self.priority = priority;
    }
    fn importance(&self) -> f64 {
        self.importance
    }
    fn urgency(&self) -> f64 {
        self.urgency
    }
    fn score(&self) -> Option<f64> {
        self.score
    }
    fn set_score(&mut self, score: f64) {
        self.score = Some(score);
    }
}

impl Schedulable for Subtask {
    fn id(&self) -> &str {
        self.task.id()
    }
    fn dependencies(&self) -> &[String] {
        self.task.dependencies()
    }
    fn label(&self) -> PriorityLabel {
        self.task.label
    }
    fn priority(&self) -> f64 {
        self.task.priority
    }
    fn set_priority(&mut self, priority: f64) {
        self.task.set_priority(priority);
    }
    fn importance(&self) -> f64 {
        self.task.importance
    }
    fn urgency(&self) -> f64 {
        self.task.urgency
    }
    fn score(&self) -> Option<f64> {
        self.task.score
    }
    fn set_score(&mut self, score: f64) {
        self.task.set_score(score);
    }
}
