use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Analysis agent connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the agent API (e.g. `http://localhost:6678`).
    #[serde(default = "d_agent_url")]
    pub base_url: String,
    /// Owner sent on session creation.
    #[serde(default = "d_owner")]
    pub owner: String,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: d_agent_url(),
            owner: d_owner(),
            timeout_ms: 8000,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_agent_url() -> String {
    "http://localhost:6678".into()
}
fn d_owner() -> String {
    "user".into()
}
fn d_8000() -> u64 {
    8000
}
