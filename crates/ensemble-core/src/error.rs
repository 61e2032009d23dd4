use thiserror::Error;

/// A convenience `Result` alias using [`EnsembleError`].
pub type EnsembleResult<T> = Result<T, EnsembleError>;

/// Top-level error type for the ensemble workspace.
///
/// Each variant corresponds to one class of the failure taxonomy. Only
/// [`EnsembleError::Transport`] is worth retrying; everything else is either
/// recovered locally by the caller or propagated as-is.
#[derive(Error, Debug)]
pub enum EnsembleError {
    /// The generative backend was unreachable, timed out, or answered with a
    /// non-2xx status.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A structured response could not be parsed or violated its schema.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A single agent failed while processing a subtask.
    #[error("Agent error: {0}")]
    Agent(String),

    /// Invalid configuration or caller input (e.g. an unusable cache key).
    /// Never retried.
    #[error("Config error: {0}")]
    Config(String),

    /// An error raised by the collaboration state machine itself.
    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    /// The knowledge-store collaborator rejected a read or write.
    #[error("Knowledge store error: {0}")]
    Knowledge(String),

    /// The flow was cancelled at a suspension point.
    #[error("Cancelled")]
    Cancelled,

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EnsembleError {
    /// Whether the failure is transient and worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EnsembleError::Transport(_))
    }

    /// Short machine-readable tag used in fallback error objects.
    pub fn kind(&self) -> &'static str {
        match self {
            EnsembleError::Transport(_) => "transport",
            EnsembleError::Validation(_) | EnsembleError::Json(_) => "validation",
            EnsembleError::Agent(_) => "agent",
            EnsembleError::Config(_) => "config",
            EnsembleError::Orchestrator(_) => "orchestrator",
            EnsembleError::Knowledge(_) => "knowledge",
            EnsembleError::Cancelled => "cancelled",
            EnsembleError::Io(_) => "io",
        }
    }
}
