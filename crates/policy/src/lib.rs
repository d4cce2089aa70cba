//! Trigger policies — the replaceable decision logic of the monitor.
//!
//! A policy decides, after each persisted segment, whether a session has
//! accumulated enough material to forward downstream, and which subset of
//! its messages makes up the forwarded payload. The correlator depends
//! only on the [`TriggerPolicy`] trait, so policies swap by name in
//! configuration without touching it.

mod registry;
mod turn_count;

pub use registry::build_policy;
pub use turn_count::TurnCountPolicy;

use async_trait::async_trait;

use cm_domain::error::Result;
use cm_domain::{CorrelationKey, Message, Segment};
use cm_store::SegmentStore;

/// Abstraction over the trigger decision for one session.
///
/// Implementations must be pure over the store's contents: no internal
/// running counters, so duplicate delivery can never drift the decision.
#[async_trait]
pub trait TriggerPolicy: Send + Sync {
    /// The registry name this policy was selected under.
    fn name(&self) -> &str;

    /// Called after a segment is persisted. Returns true when the
    /// session should be forwarded to the analysis agent now.
    async fn should_trigger(&self, key: &CorrelationKey, store: &SegmentStore) -> Result<bool>;

    /// Select the forwarding payload from the ordered session aggregate.
    ///
    /// An empty result means the caller must skip the forward entirely —
    /// no remote call, nothing marked sent.
    fn select_messages(&self, segments: &[Segment]) -> Vec<Message>;

    /// Candidate sessions for timer-driven forwarding. The built-in
    /// policy has no timeout semantics and returns none.
    async fn periodic_check(&self, store: &SegmentStore) -> Result<Vec<CorrelationKey>> {
        let _ = store;
        Ok(Vec::new())
    }
}
