use crate::handle::{AgentContext, AgentHandle};
use crate::profiles::AgentProfile;
use crate::resilient::ResilientClient;
use crate::structured::{first_code_block, StructuredReply};
use async_trait::async_trait;
use ensemble_core::{AgentOutput, EnsembleError, EnsembleResult, PeerMessage, Strategy, Subtask};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// Oldest peer messages are dropped beyond this many.
const INBOX_LIMIT: usize = 50;

fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "result": {"type": "string"},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1},
            "done": {"type": "boolean"}
        },
        "required": ["result"]
    })
}

const OUTPUT_INSTRUCTIONS: &str = "Respond with a JSON object: \
{\"result\": string, \"confidence\": number between 0 and 1, \"done\": boolean}.";

/// State and helpers shared by every worker variant.
struct WorkerCore {
    id: String,
    capability: String,
    system_prompt: String,
    client: Arc<ResilientClient>,
    inbox: Mutex<Vec<PeerMessage>>,
}

impl WorkerCore {
    fn new(profile: &AgentProfile, id: &str, client: Arc<ResilientClient>) -> Self {
        Self {
            id: id.to_string(),
            capability: profile.capability.clone(),
            system_prompt: profile.system_prompt.clone(),
            client,
            inbox: Mutex::new(Vec::new()),
        }
    }

    fn receive(&self, message: PeerMessage) {
        let mut inbox = self.inbox.lock();
        inbox.push(message);
        if inbox.len() > INBOX_LIMIT {
            let overflow = inbox.len() - INBOX_LIMIT;
            inbox.drain(..overflow);
        }
    }

    fn inbox_len(&self) -> usize {
        self.inbox.lock().len()
    }

    /// The most recent `limit` peer messages, oldest first.
    fn peer_notes(&self, limit: usize) -> String {
        let inbox = self.inbox.lock();
        let start = inbox.len().saturating_sub(limit);
        let mut out = String::new();
        for m in &inbox[start..] {
            let _ = writeln!(out, "- [{} / round {}] {}", m.sender, m.round, m.content);
        }
        out
    }

    fn base_prompt(&self, subtask: &Subtask, ctx: &AgentContext) -> String {
        let mut prompt = format!(
            "Overall task: {}\nYour subtask: {}\nRound: {}\n",
            ctx.task_content,
            subtask.content(),
            ctx.round
        );
        if !ctx.dependency_results.is_empty() {
            prompt.push_str("\nResults of prerequisite subtasks:\n");
            for (id, result) in &ctx.dependency_results {
                let _ = writeln!(prompt, "- {id}: {result}");
            }
        }
        if !ctx.prior_knowledge.is_empty() {
            prompt.push_str("\nRelevant prior knowledge:\n");
            for k in &ctx.prior_knowledge {
                let _ = writeln!(prompt, "- {k}");
            }
        }
        prompt
    }

    async fn respond(&self, prompt: &str) -> EnsembleResult<AgentOutput> {
        let prompt = format!("{prompt}\n{OUTPUT_INSTRUCTIONS}");
        match self
            .client
            .invoke_with_fallback(&self.system_prompt, &prompt, &output_schema())
            .await
        {
            StructuredReply::Valid(value) => serde_json::from_value(value)
                .map_err(|e| EnsembleError::Validation(format!("agent output: {e}"))),
            StructuredReply::Invalid(fallback) => Ok(AgentOutput::failure(fallback.error.clone())
                .with_extra("fallback", fallback.to_value())),
        }
    }

    async fn generate_step(&self, language: &str, prompt: &str) -> EnsembleResult<AgentOutput> {
        let prompt = format!(
            "{prompt}\nWrite a self-contained {language} program that accomplishes the subtask. \
             Put the program in a single markdown code block."
        );
        let text = self.client.invoke(&self.system_prompt, &prompt).await?;
        let mut output = AgentOutput::success(text.clone()).with_extra("language", json!(language));
        if let Some(code) = first_code_block(&text) {
            output = output.with_extra("code", json!(code));
        }
        Ok(output)
    }
}

/// Answers subtasks directly.
pub struct GeneralAgent {
    core: WorkerCore,
}

impl GeneralAgent {
    pub fn new(profile: &AgentProfile, id: &str, client: Arc<ResilientClient>) -> Self {
        Self {
            core: WorkerCore::new(profile, id, client),
        }
    }

    pub fn inbox_len(&self) -> usize {
        self.core.inbox_len()
    }
}

#[async_trait]
impl AgentHandle for GeneralAgent {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn capability(&self) -> &str {
        &self.core.capability
    }

    async fn process(&self, subtask: &Subtask, ctx: &AgentContext) -> EnsembleResult<AgentOutput> {
        let mut prompt = self.core.base_prompt(subtask, ctx);
        let notes = self.core.peer_notes(5);
        if !notes.is_empty() {
            prompt.push_str("\nWhat your teammates shared:\n");
            prompt.push_str(&notes);
        }
        match &ctx.strategy {
            Strategy::DirectResponse { prompt: extra } => {
                if extra != subtask.content() {
                    let _ = write!(prompt, "\n{extra}\n");
                }
                self.core.respond(&prompt).await
            }
            Strategy::GenerativeStep { language, .. } => {
                self.core.generate_step(language, &prompt).await
            }
        }
    }

    async fn receive_message(&self, message: PeerMessage) {
        self.core.receive(message);
    }
}

/// Produces code for subtasks and folds reviewer feedback into later rounds.
pub struct CodingAgent {
    core: WorkerCore,
}

impl CodingAgent {
    pub fn new(profile: &AgentProfile, id: &str, client: Arc<ResilientClient>) -> Self {
        Self {
            core: WorkerCore::new(profile, id, client),
        }
    }
}

#[async_trait]
impl AgentHandle for CodingAgent {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn capability(&self) -> &str {
        &self.core.capability
    }

    async fn process(&self, subtask: &Subtask, ctx: &AgentContext) -> EnsembleResult<AgentOutput> {
        let mut prompt = self.core.base_prompt(subtask, ctx);
        let notes = self.core.peer_notes(10);
        if !notes.is_empty() {
            prompt.push_str("\nFeedback to address:\n");
            prompt.push_str(&notes);
        }
        let language = match &ctx.strategy {
            Strategy::GenerativeStep { language, .. } => language.as_str(),
            Strategy::DirectResponse { prompt: extra } => {
                if extra != subtask.content() {
                    let _ = write!(prompt, "\n{extra}\n");
                }
                // Direct answers still need code attached, so ask for the
                // structured form with the code embedded in `result`.
                prompt.push_str("\nInclude the full implementation in the result field.\n");
                let mut out = self.core.respond(&prompt).await?;
                if let Some(code) = first_code_block(&out.result) {
                    out = out.with_extra("code", json!(code));
                }
                return Ok(out);
            }
        };
        debug!(agent = %self.core.id, language, "generating code step");
        self.core.generate_step(language, &prompt).await
    }

    async fn receive_message(&self, message: PeerMessage) {
        self.core.receive(message);
    }
}

/// Critiques the work peers have shared.
pub struct ReviewAgent {
    core: WorkerCore,
}

impl ReviewAgent {
    pub fn new(profile: &AgentProfile, id: &str, client: Arc<ResilientClient>) -> Self {
        Self {
            core: WorkerCore::new(profile, id, client),
        }
    }
}

#[async_trait]
impl AgentHandle for ReviewAgent {
    fn id(&self) -> &str {
        &self.core.id
    }

    fn capability(&self) -> &str {
        &self.core.capability
    }

    async fn process(&self, subtask: &Subtask, ctx: &AgentContext) -> EnsembleResult<AgentOutput> {
        let mut prompt = self.core.base_prompt(subtask, ctx);
        let notes = self.core.peer_notes(20);
        if notes.is_empty() && ctx.dependency_results.is_empty() {
            prompt.push_str("\nNo work has been shared yet. Review the subtask statement itself for gaps and risks.\n");
        } else {
            prompt.push_str("\nWork to review:\n");
            prompt.push_str(&notes);
        }
        let mut out = self.core.respond(&prompt).await?;
        out = out.with_extra("review", json!(true));
        Ok(out)
    }

    async fn receive_message(&self, message: PeerMessage) {
        self.core.receive(message);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::backends::InferenceBackend;
    use crate::profiles::default_profiles;
    use crate::resilient::RetryPolicy;
    use ensemble_core::Task;

    struct EchoBackend {
        prompts: Mutex<Vec<String>>,
        reply: String,
    }

    #[async_trait]
    impl InferenceBackend for EchoBackend {
        async fn generate(&self, _system: &str, prompt: &str) -> EnsembleResult<String> {
            self.prompts.lock().push(prompt.to_string());
            Ok(self.reply.clone())
        }
        fn name(&self) -> &str {
            "echo"
        }
    }

    fn setup(reply: &str) -> (Arc<EchoBackend>, Arc<ResilientClient>) {
        let backend = Arc::new(EchoBackend {
            prompts: Mutex::new(Vec::new()),
            reply: reply.to_string(),
        });
        let client = Arc::new(ResilientClient::new(backend.clone(), RetryPolicy::default()));
        (backend, client)
    }

    fn subtask() -> (Task, Subtask) {
        let task = Task::new("build a cli");
        let sub = Subtask::new(&task, "parse args", "general");
        (task, sub)
    }

    #[tokio::test]
    async fn test_general_agent_includes_peer_notes() {
        let (backend, client) = setup(r#"{"result": "use clap", "confidence": 0.8}"#);
        let profiles = default_profiles();
        let agent = GeneralAgent::new(&profiles["general"], "general-1", client);
        agent
            .receive_message(PeerMessage::new("programmer-1", "I prefer argh", 1))
            .await;

        let (task, sub) = subtask();
        let ctx = AgentContext::new(&task.id, &task.content, 2, Strategy::from_action("direct_response", sub.content()));
        let out = agent.process(&sub, &ctx).await.unwrap();

        assert_eq!(out.result, "use clap");
        assert_eq!(out.confidence, Some(0.8));
        let prompt = backend.prompts.lock()[0].clone();
        assert!(prompt.contains("I prefer argh"));
        assert!(prompt.contains("Round: 2"));
    }

    #[tokio::test]
    async fn test_coding_agent_generative_step_extracts_code() {
        let (_backend, client) = setup("Here:\n```python\nprint('hi')\n```");
        let profiles = default_profiles();
        let agent = CodingAgent::new(&profiles["programmer"], "programmer-1", client);
        let (task, sub) = subtask();
        let ctx = AgentContext::new(&task.id, &task.content, 1, Strategy::from_action("generative_step", sub.content()));

        let out = agent.process(&sub, &ctx).await.unwrap();
        assert!(out.is_success());
        assert_eq!(out.extras["language"], "python");
        assert_eq!(out.extras["code"], "print('hi')");
    }

    #[tokio::test]
    async fn test_review_agent_invalid_reply_becomes_failure_output() {
        let (backend, client) = setup("looks fine to me");
        let profiles = default_profiles();
        let agent = ReviewAgent::new(&profiles["code_reviewer"], "code_reviewer-1", client);
        let (task, sub) = subtask();
        let ctx = AgentContext::new(&task.id, &task.content, 1, Strategy::from_action("direct_response", sub.content()));

        let out = agent.process(&sub, &ctx).await.unwrap();
        assert!(!out.is_success());
        assert_eq!(out.extras["fallback"]["kind"], "validation");
        assert_eq!(backend.prompts.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_inbox_is_bounded() {
        let (_b, client) = setup("{}");
        let profiles = default_profiles();
        let agent = GeneralAgent::new(&profiles["general"], "g", client);
        for i in 0..(INBOX_LIMIT + 10) {
            agent.receive_message(PeerMessage::new("p", format!("m{i}"), 1)).await;
        }
        assert_eq!(agent.inbox_len(), INBOX_LIMIT);
    }
}
