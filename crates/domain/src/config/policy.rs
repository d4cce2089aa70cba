use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trigger policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trigger-policy parameters, bound once at startup.
///
/// The policy instance is constructed from this struct and never
/// reconfigured for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Policy selector for the registry (`"turn-count"` is built in).
    #[serde(default = "d_policy_name")]
    pub name: String,
    /// Total message count across the session's segments at which a
    /// forward fires.
    #[serde(default = "d_4")]
    pub turns_threshold: u32,
    #[serde(default)]
    pub send_mode: SendMode,
    /// Number of trailing messages kept in `window` mode.
    #[serde(default = "d_8")]
    pub window_size: usize,
}

/// Which subset of the session's messages a trigger forwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendMode {
    /// Every message from every segment, in segment order.
    #[default]
    All,
    /// Only messages from segments not yet marked sent.
    Delta,
    /// The chronologically-latest `window_size` messages.
    Window,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            name: d_policy_name(),
            turns_threshold: 4,
            send_mode: SendMode::All,
            window_size: 8,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_policy_name() -> String {
    "turn-count".into()
}
fn d_4() -> u32 {
    4
}
fn d_8() -> usize {
    8
}
