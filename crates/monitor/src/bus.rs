//! NATS ingestion loop.
//!
//! Subscribes to the configured subject, decodes each payload as a
//! segment record, and drives the correlator. Malformed payloads, store
//! failures, and agent failures are all logged and dropped — the loop
//! keeps consuming. Only a refused connection at startup is fatal.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};

use cm_domain::config::Config;
use cm_domain::error::{Error, Result};
use cm_domain::SegmentRecord;
use cm_store::SegmentStore;

use crate::correlator::{Correlator, SegmentOutcome};

pub struct Monitor {
    config: Arc<Config>,
    correlator: Arc<Correlator>,
    store: Arc<SegmentStore>,
}

impl Monitor {
    pub fn new(config: Arc<Config>, correlator: Arc<Correlator>, store: Arc<SegmentStore>) -> Self {
        Self {
            config,
            correlator,
            store,
        }
    }

    /// Connect, subscribe, and consume until ctrl-c or the subscription
    /// closes. Unsubscribes before the connection goes away, on every
    /// exit path.
    pub async fn run(&self) -> Result<()> {
        let url = &self.config.nats.url;
        tracing::info!(url = %url, "connecting to NATS");
        let client = async_nats::connect(url.as_str())
            .await
            .map_err(|e| Error::Bus(format!("connecting to {url}: {e}")))?;

        let subject = self.config.nats.subject.clone();
        let mut subscriber = client
            .subscribe(subject.clone())
            .await
            .map_err(|e| Error::Bus(format!("subscribing to {subject}: {e}")))?;
        tracing::info!(subject = %subject, "subscription active");

        {
            let mut payloads = (&mut subscriber).map(|msg| msg.payload);
            self.consume(&mut payloads, shutdown_signal()).await;
        }

        // Unsubscribe before closing the connection, even on error paths.
        if let Err(e) = subscriber.unsubscribe().await {
            tracing::warn!(error = %e, "unsubscribe failed");
        }
        if let Err(e) = client.flush().await {
            tracing::warn!(error = %e, "NATS flush failed");
        }
        drop(client);
        tracing::info!("disconnected from NATS");

        if let Err(e) = self.store.flush() {
            tracing::warn!(error = %e, "final store flush failed");
        }

        Ok(())
    }

    /// Consume payloads until the stream ends or `shutdown` resolves.
    ///
    /// The shutdown future is pinned once and polled across iterations,
    /// so a signal arriving while a delivery is being processed is
    /// observed on the next loop pass — the loop stops accepting
    /// deliveries instead of waiting for a second signal. Split from
    /// [`Monitor::run`] so the loop is drivable in tests without a
    /// broker.
    pub async fn consume<S>(&self, payloads: &mut S, shutdown: impl Future<Output = ()>)
    where
        S: Stream + Unpin,
        S::Item: AsRef<[u8]>,
    {
        tokio::pin!(shutdown);

        // Optional periodic policy sweep. Disabled at interval 0.
        let mut sweep = match self.config.monitor.check_interval_secs {
            0 => None,
            secs => {
                let mut interval = tokio::time::interval(Duration::from_secs(secs));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                Some(interval)
            }
        };

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received");
                    break;
                }
                maybe_payload = payloads.next() => {
                    match maybe_payload {
                        Some(payload) => self.process(payload.as_ref()).await,
                        None => {
                            tracing::warn!("segment stream ended");
                            break;
                        }
                    }
                }
                _ = tick(&mut sweep) => {
                    match self.correlator.run_periodic_check().await {
                        Ok(0) => {}
                        Ok(n) => tracing::info!(forwards = n, "periodic check completed"),
                        Err(e) => tracing::warn!(error = %e, "periodic check failed"),
                    }
                }
            }
        }
    }

    /// Handle one bus payload. Never returns an error — every failure
    /// mode here is log-and-continue.
    async fn process(&self, payload: &[u8]) {
        let record: SegmentRecord = match serde_json::from_slice(payload) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, bytes = payload.len(), "dropping malformed segment payload");
                return;
            }
        };

        tracing::debug!(segment_id = %record.id, session_id = %record.session_id, "segment received");

        match self.correlator.handle_segment(&record).await {
            Ok(SegmentOutcome::Stored { is_new, .. }) => {
                tracing::debug!(segment_id = %record.id, is_new, "segment stored, no trigger");
            }
            Ok(SegmentOutcome::SkippedEmptySelection) => {
                tracing::debug!(segment_id = %record.id, "trigger fired but selection was empty");
            }
            Ok(SegmentOutcome::Forwarded { reply, messages }) => {
                tracing::info!(
                    segment_id = %record.id,
                    messages,
                    agent_session_id = %reply.agent_session_id,
                    created_session = reply.created,
                    reply = reply.reply.as_deref().unwrap_or(""),
                    "session forwarded to agent"
                );
            }
            Err(e @ Error::Malformed(_)) => {
                tracing::warn!(segment_id = %record.id, error = %e, "dropping invalid segment");
            }
            Err(e @ Error::Store(_)) => {
                tracing::error!(segment_id = %record.id, error = %e, "store failure, segment dropped");
            }
            Err(e) => {
                // Agent failures leave the session idle; the next
                // segment re-evaluates against the stored aggregate.
                tracing::warn!(segment_id = %record.id, error = %e, "forward failed, will retry on next segment");
            }
        }
    }
}

/// Resolve on ctrl-c. If the handler cannot be installed, signal-driven
/// shutdown is disabled rather than stopping the monitor outright.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler failed, signal shutdown disabled");
        std::future::pending::<()>().await;
    }
}

/// Await the next sweep tick, or forever when the sweep is disabled.
async fn tick(sweep: &mut Option<tokio::time::Interval>) {
    match sweep {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
