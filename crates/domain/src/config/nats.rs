use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// NATS connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    #[serde(default = "d_nats_url")]
    pub url: String,
    /// Subject pattern for conversation segments.
    #[serde(default = "d_subject")]
    pub subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: d_nats_url(),
            subject: d_subject(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_nats_url() -> String {
    "nats://localhost:4222".into()
}
fn d_subject() -> String {
    "conversation.segments.>".into()
}
