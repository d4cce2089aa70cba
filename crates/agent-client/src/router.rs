//! Correlation-key → agent-session routing.
//!
//! The agent keeps its own session per logical conversation. The router
//! remembers, per correlation key, which agent session that is: the first
//! successful forward creates one, every later forward continues it with
//! `/chat`. The mapping lives in memory only — on restart the next
//! forward for a previously-known key opens a fresh agent session, a
//! known and accepted limitation.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use cm_domain::error::Result;
use cm_domain::trace::TraceEvent;
use cm_domain::CorrelationKey;

use crate::provider::AgentProvider;

/// Result of one forward to the agent.
#[derive(Debug, Clone)]
pub struct ForwardReply {
    /// True when this forward created the agent session.
    pub created: bool,
    /// The agent session handle used.
    pub agent_session_id: String,
    /// The agent's reply body (`/chat` only).
    pub reply: Option<String>,
}

/// Routes transcripts to the agent, creating or continuing the agent
/// session for each correlation key.
///
/// Callers must serialize `send` per key (the correlator holds a per-key
/// lock across it); the router itself only guards the map's memory.
pub struct AgentSessionRouter {
    provider: Arc<dyn AgentProvider>,
    owner: String,
    sessions: RwLock<HashMap<String, String>>,
}

impl AgentSessionRouter {
    pub fn new(provider: Arc<dyn AgentProvider>, owner: impl Into<String>) -> Self {
        Self {
            provider,
            owner: owner.into(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Forward a transcript for the given key.
    ///
    /// On any failure the mapping is left untouched, so a later attempt
    /// reuses whatever handle existed or tries creation again.
    pub async fn send(&self, key: &CorrelationKey, transcript: &str) -> Result<ForwardReply> {
        let session_key = key.to_string();
        let existing = self.sessions.read().get(&session_key).cloned();

        match existing {
            Some(handle) => {
                let reply = self.provider.chat(&handle, transcript).await?;
                Ok(ForwardReply {
                    created: false,
                    agent_session_id: handle,
                    reply: Some(reply),
                })
            }
            None => {
                let handle = self
                    .provider
                    .create_session(&self.owner, transcript)
                    .await?;
                self.sessions
                    .write()
                    .insert(session_key.clone(), handle.clone());

                TraceEvent::AgentSessionCreated {
                    session_key,
                    agent_session_id: handle.clone(),
                }
                .emit();

                Ok(ForwardReply {
                    created: true,
                    agent_session_id: handle,
                    reply: None,
                })
            }
        }
    }

    /// The stored agent session handle for a key, if any.
    pub fn handle_for(&self, key: &CorrelationKey) -> Option<String> {
        self.sessions.read().get(&key.to_string()).cloned()
    }

    /// Number of tracked agent sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}
