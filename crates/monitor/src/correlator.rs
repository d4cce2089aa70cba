//! Segment-to-session correlation and trigger engine.
//!
//! Every incoming segment runs the same region under its key's lock:
//! persist, evaluate the trigger policy, and — when it fires — select the
//! payload, forward it to the analysis agent, and mark the covered
//! segments sent. A forward failure leaves the session idle with its
//! segments durably stored; the next segment re-evaluates from scratch.

use std::sync::Arc;

use cm_agent::{format_transcript, AgentSessionRouter, ForwardReply};
use cm_domain::error::Result;
use cm_domain::trace::TraceEvent;
use cm_domain::{CorrelationKey, SegmentRecord};
use cm_policy::TriggerPolicy;
use cm_store::SegmentStore;

use crate::key_lock::KeyLockMap;

/// What handling one segment amounted to.
#[derive(Debug)]
pub enum SegmentOutcome {
    /// Persisted; the trigger did not fire.
    Stored { is_new: bool, turn_count: usize },
    /// The trigger fired but the policy selected nothing, so no remote
    /// call was made and nothing was marked sent.
    SkippedEmptySelection,
    /// Forwarded to the agent and marked sent.
    Forwarded {
        reply: ForwardReply,
        messages: usize,
    },
}

pub struct Correlator {
    store: Arc<SegmentStore>,
    policy: Arc<dyn TriggerPolicy>,
    router: Arc<AgentSessionRouter>,
    locks: KeyLockMap,
}

impl Correlator {
    pub fn new(
        store: Arc<SegmentStore>,
        policy: Arc<dyn TriggerPolicy>,
        router: Arc<AgentSessionRouter>,
    ) -> Self {
        Self {
            store,
            policy,
            router,
            locks: KeyLockMap::new(),
        }
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    /// Drive one segment through persist → evaluate → forward.
    ///
    /// Holds the key lock for the whole region, so concurrent deliveries
    /// of the same key serialize and can never double-create the agent
    /// session.
    pub async fn handle_segment(&self, record: &SegmentRecord) -> Result<SegmentOutcome> {
        record.validate()?;
        let key = record.key();
        let _permit = self.locks.acquire(&key).await?;

        let upserted = self.store.upsert(record)?;

        if !self.policy.should_trigger(&key, &self.store).await? {
            return Ok(SegmentOutcome::Stored {
                is_new: upserted.is_new,
                turn_count: upserted.turn_count,
            });
        }

        self.forward_locked(&key).await
    }

    /// Run the policy's periodic check and forward each candidate.
    ///
    /// Per-candidate failures are logged and skipped; the sweep itself
    /// only fails if the policy does. Returns the number of completed
    /// forwards.
    pub async fn run_periodic_check(&self) -> Result<usize> {
        let candidates = self.policy.periodic_check(&self.store).await?;
        let mut forwarded = 0;

        for key in candidates {
            let _permit = self.locks.acquire(&key).await?;
            match self.forward_locked(&key).await {
                Ok(SegmentOutcome::Forwarded { .. }) => forwarded += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        session_id = %key.session_id,
                        agent_id = %key.agent_id,
                        error = %e,
                        "periodic forward failed, skipping candidate"
                    );
                }
            }
        }

        self.locks.prune_idle();
        Ok(forwarded)
    }

    /// Select, format, forward, and mark sent. Caller must hold the
    /// key's permit.
    async fn forward_locked(&self, key: &CorrelationKey) -> Result<SegmentOutcome> {
        let segments = self.store.list_by_session(&key.session_id, &key.agent_id);
        let selection = self.policy.select_messages(&segments);
        if selection.is_empty() {
            tracing::debug!(
                session_id = %key.session_id,
                agent_id = %key.agent_id,
                "policy selected no messages, skipping forward"
            );
            return Ok(SegmentOutcome::SkippedEmptySelection);
        }

        let transcript = format_transcript(&selection);
        let reply = self.router.send(key, &transcript).await?;

        // Success only: segments inserted after the snapshot above are
        // not covered by this forward, but the key lock keeps that
        // window closed for bus deliveries.
        self.store.mark_sent(&key.session_id, &key.agent_id)?;

        TraceEvent::ForwardCompleted {
            session_key: key.to_string(),
            messages: selection.len(),
            created_session: reply.created,
        }
        .emit();

        Ok(SegmentOutcome::Forwarded {
            reply,
            messages: selection.len(),
        })
    }
}
