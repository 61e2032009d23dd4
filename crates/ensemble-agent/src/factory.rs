use crate::handle::AgentHandle;
use crate::profiles::{canonical_capability, default_profiles, AgentKind, AgentProfile, CAP_GENERAL};
use crate::resilient::ResilientClient;
use crate::workers::{CodingAgent, GeneralAgent, ReviewAgent};
use async_trait::async_trait;
use ensemble_core::{EnsembleError, EnsembleResult};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Creates agents for capability tags.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    /// Build an agent serving `capability`, identified by `agent_id`.
    async fn create(&self, capability: &str, agent_id: &str) -> EnsembleResult<Arc<dyn AgentHandle>>;
}

/// Builds the built-in worker variants around one shared client.
pub struct DefaultAgentFactory {
    client: Arc<ResilientClient>,
    profiles: HashMap<String, AgentProfile>,
}

impl DefaultAgentFactory {
    /// Factory whose agents share `client`.
    pub fn new(client: Arc<ResilientClient>) -> Self {
        Self {
            client,
            profiles: default_profiles(),
        }
    }

    /// Register or replace a profile.
    pub fn with_profile(mut self, profile: AgentProfile) -> Self {
        self.profiles
            .insert(canonical_capability(&profile.capability), profile);
        self
    }
}

#[async_trait]
impl AgentFactory for DefaultAgentFactory {
    async fn create(&self, capability: &str, agent_id: &str) -> EnsembleResult<Arc<dyn AgentHandle>> {
        let canonical = canonical_capability(capability);
        let profile = match self.profiles.get(&canonical) {
            Some(p) => p.clone(),
            None => {
                warn!(capability = %canonical, "Unknown capability, using general agent");
                let general = self.profiles.get(CAP_GENERAL).ok_or_else(|| {
                    EnsembleError::Config("no profile registered for 'general'".to_string())
                })?;
                AgentProfile {
                    capability: canonical.clone(),
                    ..general.clone()
                }
            }
        };

        info!(agent_id, capability = %profile.capability, kind = ?profile.kind, "Creating agent");
        let agent: Arc<dyn AgentHandle> = match profile.kind {
            AgentKind::General => Arc::new(GeneralAgent::new(&profile, agent_id, self.client.clone())),
            AgentKind::Coding => Arc::new(CodingAgent::new(&profile, agent_id, self.client.clone())),
            AgentKind::Review => Arc::new(ReviewAgent::new(&profile, agent_id, self.client.clone())),
        };
        Ok(agent)
    }
}
