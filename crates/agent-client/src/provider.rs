//! The `AgentProvider` trait defines the interface to the analysis
//! agent (REST, or a test double).

use async_trait::async_trait;

use cm_domain::error::Result;

/// Abstraction over the analysis agent's session API.
///
/// Implementations surface failures as-is — no internal retries — so the
/// correlator can drop the current message and continue the loop.
#[async_trait]
pub trait AgentProvider: Send + Sync {
    /// Open a new analysis session (POST /createSession) and return the
    /// agent's session handle.
    async fn create_session(&self, owner: &str, description: &str) -> Result<String>;

    /// Continue an existing session (POST /chat) and return the agent's
    /// raw reply body.
    async fn chat(&self, session_id: &str, message: &str) -> Result<String>;
}
