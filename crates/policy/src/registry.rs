//! Policy selection by name.
//!
//! Policies are statically compiled; the configuration picks one by name
//! at startup. An unknown name is a config mistake, not a fatal one — it
//! logs a warning and falls back to the built-in turn-count policy.

use std::sync::Arc;

use cm_domain::config::PolicyConfig;

use crate::{TriggerPolicy, TurnCountPolicy};

/// Build the configured trigger policy.
pub fn build_policy(cfg: &PolicyConfig) -> Arc<dyn TriggerPolicy> {
    match cfg.name.as_str() {
        "turn-count" | "turn_count" => Arc::new(TurnCountPolicy::new(cfg)),
        other => {
            tracing::warn!(
                policy = %other,
                "unknown trigger policy, falling back to turn-count"
            );
            Arc::new(TurnCountPolicy::new(cfg))
        }
    }
}
