//! End-to-end correlator tests against a scripted agent and a temp store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use futures_util::StreamExt;

use cm_agent::{AgentProvider, AgentSessionRouter};
use cm_domain::config::{Config, PolicyConfig, SendMode};
use cm_domain::error::{Error, Result};
use cm_domain::{Message, SegmentRecord};
use cm_monitor::bus::Monitor;
use cm_monitor::correlator::{Correlator, SegmentOutcome};
use cm_policy::build_policy;
use cm_store::SegmentStore;

// ── scripted agent ──────────────────────────────────────────────────

#[derive(Default)]
struct ScriptedAgent {
    calls: Mutex<Vec<String>>,
    transcripts: Mutex<Vec<String>>,
    creates: AtomicUsize,
    fail_next: AtomicBool,
    create_delay: Option<Duration>,
}

impl ScriptedAgent {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slow() -> Arc<Self> {
        Arc::new(Self {
            create_delay: Some(Duration::from_millis(50)),
            ..Self::default()
        })
    }

    fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn transcripts(&self) -> Vec<String> {
        self.transcripts.lock().clone()
    }
}

#[async_trait]
impl AgentProvider for ScriptedAgent {
    async fn create_session(&self, _owner: &str, description: &str) -> Result<String> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::AgentRejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.calls.lock().push("create".into());
        self.transcripts.lock().push(description.to_owned());
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("agent-sess-{n}"))
    }

    async fn chat(&self, session_id: &str, message: &str) -> Result<String> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::AgentUnreachable("connection refused".into()));
        }
        self.calls.lock().push(format!("chat:{session_id}"));
        self.transcripts.lock().push(message.to_owned());
        Ok(r#"{"status":"ok"}"#.into())
    }
}

// ── fixtures ────────────────────────────────────────────────────────

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn record(id: &str, session: &str, at: i64, turns: usize) -> SegmentRecord {
    SegmentRecord {
        id: id.into(),
        session_id: session.into(),
        agent_id: "agent-1".into(),
        timestamp: ts(at),
        messages: (0..turns)
            .map(|i| Message {
                sender: if i % 2 == 0 { "user" } else { "assistant" }.into(),
                content: format!("{id} msg {i}"),
                timestamp: ts(at + i as i64),
            })
            .collect(),
    }
}

fn pipeline(
    agent: Arc<ScriptedAgent>,
    policy_cfg: PolicyConfig,
) -> (tempfile::TempDir, Arc<Correlator>) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SegmentStore::open(dir.path()).unwrap());
    let policy = build_policy(&policy_cfg);
    let router = Arc::new(AgentSessionRouter::new(agent, "user"));
    (dir, Arc::new(Correlator::new(store, policy, router)))
}

fn monitor_pipeline(agent: Arc<ScriptedAgent>) -> (tempfile::TempDir, Monitor) {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SegmentStore::open(dir.path()).unwrap());
    let policy = build_policy(&PolicyConfig::default());
    let router = Arc::new(AgentSessionRouter::new(agent, "user"));
    let correlator = Arc::new(Correlator::new(store.clone(), policy, router));
    (dir, Monitor::new(Arc::new(Config::default()), correlator, store))
}

// ── tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn below_threshold_stores_without_forwarding() {
    let agent = ScriptedAgent::new();
    let (_dir, correlator) = pipeline(agent.clone(), PolicyConfig::default());

    let outcome = correlator
        .handle_segment(&record("seg-1", "sess-1", 0, 2))
        .await
        .unwrap();

    assert!(matches!(outcome, SegmentOutcome::Stored { is_new: true, .. }));
    assert!(agent.calls().is_empty());
    assert!(!correlator.store().get("seg-1").unwrap().sent);
}

#[tokio::test]
async fn threshold_crossing_forwards_and_marks_sent() {
    let agent = ScriptedAgent::new();
    let (_dir, correlator) = pipeline(agent.clone(), PolicyConfig::default());

    correlator
        .handle_segment(&record("seg-1", "sess-1", 0, 2))
        .await
        .unwrap();
    let outcome = correlator
        .handle_segment(&record("seg-2", "sess-1", 10, 2))
        .await
        .unwrap();

    match outcome {
        SegmentOutcome::Forwarded { reply, messages } => {
            assert!(reply.created);
            assert_eq!(reply.agent_session_id, "agent-sess-1");
            assert_eq!(messages, 4);
        }
        other => panic!("expected forward, got {other:?}"),
    }

    assert_eq!(agent.calls(), vec!["create"]);
    assert!(correlator.store().get("seg-1").unwrap().sent);
    assert!(correlator.store().get("seg-2").unwrap().sent);

    let transcript = &agent.transcripts()[0];
    assert!(transcript.starts_with("Please analyze and evaluate the following conversation:"));
    assert!(transcript.contains("User: seg-1 msg 0"));
    assert!(transcript.contains("Assistant: seg-2 msg 1"));
}

#[tokio::test]
async fn second_trigger_continues_the_same_agent_session() {
    let agent = ScriptedAgent::new();
    let (_dir, correlator) = pipeline(agent.clone(), PolicyConfig::default());

    correlator
        .handle_segment(&record("seg-1", "sess-1", 0, 2))
        .await
        .unwrap();
    correlator
        .handle_segment(&record("seg-2", "sess-1", 10, 2))
        .await
        .unwrap();
    let outcome = correlator
        .handle_segment(&record("seg-3", "sess-1", 20, 2))
        .await
        .unwrap();

    match outcome {
        SegmentOutcome::Forwarded { reply, .. } => {
            assert!(!reply.created);
            assert_eq!(reply.agent_session_id, "agent-sess-1");
            assert_eq!(reply.reply.as_deref(), Some(r#"{"status":"ok"}"#));
        }
        other => panic!("expected forward, got {other:?}"),
    }

    assert_eq!(agent.calls(), vec!["create", "chat:agent-sess-1"]);
}

#[tokio::test]
async fn delta_mode_forwards_only_unsent_segments() {
    let agent = ScriptedAgent::new();
    let cfg = PolicyConfig {
        turns_threshold: 2,
        send_mode: SendMode::Delta,
        ..PolicyConfig::default()
    };
    let (_dir, correlator) = pipeline(agent.clone(), cfg);

    correlator
        .handle_segment(&record("seg-1", "sess-1", 0, 2))
        .await
        .unwrap();
    correlator
        .handle_segment(&record("seg-2", "sess-1", 10, 2))
        .await
        .unwrap();

    // The second forward must only carry seg-2's messages.
    let transcripts = agent.transcripts();
    assert_eq!(transcripts.len(), 2);
    assert!(!transcripts[1].contains("seg-1 msg"));
    assert!(transcripts[1].contains("seg-2 msg 0"));
}

#[tokio::test]
async fn empty_delta_selection_skips_the_remote_call() {
    let agent = ScriptedAgent::new();
    let cfg = PolicyConfig {
        turns_threshold: 2,
        send_mode: SendMode::Delta,
        ..PolicyConfig::default()
    };
    let (_dir, correlator) = pipeline(agent.clone(), cfg);

    let rec = record("seg-1", "sess-1", 0, 2);
    correlator.handle_segment(&rec).await.unwrap();
    assert_eq!(agent.calls().len(), 1);

    // Redelivery after the forward: everything is already sent, so the
    // trigger fires but delta selects nothing.
    let outcome = correlator.handle_segment(&rec).await.unwrap();
    assert!(matches!(outcome, SegmentOutcome::SkippedEmptySelection));
    assert_eq!(agent.calls().len(), 1, "no second remote call");
}

#[tokio::test]
async fn agent_failure_leaves_state_retryable() {
    let agent = ScriptedAgent::new();
    let (_dir, correlator) = pipeline(agent.clone(), PolicyConfig::default());

    correlator
        .handle_segment(&record("seg-1", "sess-1", 0, 2))
        .await
        .unwrap();

    agent.fail_next();
    let err = correlator
        .handle_segment(&record("seg-2", "sess-1", 10, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AgentRejected { status: 503, .. }));

    // Nothing was marked sent, and both segments are still stored.
    assert!(!correlator.store().get("seg-1").unwrap().sent);
    assert!(!correlator.store().get("seg-2").unwrap().sent);

    // The next segment re-evaluates and the forward goes through.
    let outcome = correlator
        .handle_segment(&record("seg-3", "sess-1", 20, 1))
        .await
        .unwrap();
    assert!(matches!(outcome, SegmentOutcome::Forwarded { .. }));
    assert_eq!(agent.calls(), vec!["create"]);
}

#[tokio::test]
async fn concurrent_same_key_deliveries_create_one_session() {
    let agent = ScriptedAgent::slow();
    let (_dir, correlator) = pipeline(agent.clone(), PolicyConfig::default());

    let a = {
        let correlator = correlator.clone();
        tokio::spawn(async move {
            correlator
                .handle_segment(&record("seg-1", "sess-1", 0, 4))
                .await
        })
    };
    let b = {
        let correlator = correlator.clone();
        tokio::spawn(async move {
            correlator
                .handle_segment(&record("seg-2", "sess-1", 10, 4))
                .await
        })
    };

    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    assert_eq!(
        agent.creates.load(Ordering::SeqCst),
        1,
        "the key lock must prevent a second createSession"
    );
}

#[tokio::test]
async fn redelivery_of_identical_segments_never_retriggers_below_threshold() {
    let agent = ScriptedAgent::new();
    let (_dir, correlator) = pipeline(agent.clone(), PolicyConfig::default());

    let rec = record("seg-1", "sess-1", 0, 3);
    for _ in 0..4 {
        let outcome = correlator.handle_segment(&rec).await.unwrap();
        assert!(matches!(outcome, SegmentOutcome::Stored { .. }));
    }

    assert!(agent.calls().is_empty());
    assert_eq!(correlator.store().segment_count(), 1);
}

#[tokio::test]
async fn invalid_record_is_rejected_before_persisting() {
    let agent = ScriptedAgent::new();
    let (_dir, correlator) = pipeline(agent.clone(), PolicyConfig::default());

    let mut rec = record("seg-1", "sess-1", 0, 2);
    rec.session_id = String::new();

    let err = correlator.handle_segment(&rec).await.unwrap_err();
    assert!(matches!(err, Error::Malformed(_)));
    assert_eq!(correlator.store().segment_count(), 0);
}

#[tokio::test]
async fn periodic_check_with_builtin_policy_is_a_noop() {
    let agent = ScriptedAgent::new();
    let (_dir, correlator) = pipeline(agent.clone(), PolicyConfig::default());

    correlator
        .handle_segment(&record("seg-1", "sess-1", 0, 2))
        .await
        .unwrap();

    assert_eq!(correlator.run_periodic_check().await.unwrap(), 0);
    assert!(agent.calls().is_empty());
}

// ── consume loop ────────────────────────────────────────────────────

#[tokio::test]
async fn shutdown_during_forward_stops_before_next_delivery() {
    let agent = ScriptedAgent::slow();
    let (_dir, monitor) = monitor_pipeline(agent.clone());

    let payloads = vec![
        serde_json::to_vec(&record("seg-1", "sess-1", 0, 4)).unwrap(),
        serde_json::to_vec(&record("seg-2", "sess-1", 10, 4)).unwrap(),
    ];
    let mut stream = futures_util::stream::iter(payloads);

    // The signal lands while the first forward is still in flight. The
    // loop must observe it on its next pass rather than consuming the
    // second delivery.
    monitor
        .consume(&mut stream, tokio::time::sleep(Duration::from_millis(10)))
        .await;

    assert_eq!(agent.calls(), vec!["create"]);
    assert!(stream.next().await.is_some());
}

#[tokio::test]
async fn malformed_payloads_are_dropped_and_the_loop_continues() {
    let agent = ScriptedAgent::new();
    let (_dir, monitor) = monitor_pipeline(agent.clone());

    let payloads = vec![
        b"not a segment".to_vec(),
        serde_json::to_vec(&record("seg-1", "sess-1", 0, 4)).unwrap(),
    ];
    let mut stream = futures_util::stream::iter(payloads);

    monitor.consume(&mut stream, std::future::pending::<()>()).await;

    assert_eq!(agent.calls(), vec!["create"]);
}
