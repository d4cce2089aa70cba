//! The canonical turn-count policy.
//!
//! Fires once the total message count across a session's segments reaches
//! the configured threshold. The total is recomputed from the store on
//! every evaluation — a maintained counter would drift under bus
//! redelivery, the recompute cannot.

use async_trait::async_trait;

use cm_domain::config::{PolicyConfig, SendMode};
use cm_domain::error::Result;
use cm_domain::trace::TraceEvent;
use cm_domain::{CorrelationKey, Message, Segment};
use cm_store::SegmentStore;

use crate::TriggerPolicy;

pub struct TurnCountPolicy {
    turns_threshold: u32,
    send_mode: SendMode,
    window_size: usize,
}

impl TurnCountPolicy {
    pub fn new(cfg: &PolicyConfig) -> Self {
        Self {
            turns_threshold: cfg.turns_threshold,
            send_mode: cfg.send_mode,
            window_size: cfg.window_size,
        }
    }
}

#[async_trait]
impl TriggerPolicy for TurnCountPolicy {
    fn name(&self) -> &str {
        "turn-count"
    }

    async fn should_trigger(&self, key: &CorrelationKey, store: &SegmentStore) -> Result<bool> {
        let segments = store.list_by_session(&key.session_id, &key.agent_id);
        let total_turns: usize = segments.iter().map(|s| s.messages.len()).sum();
        let fired = total_turns >= self.turns_threshold as usize;

        tracing::debug!(
            session_id = %key.session_id,
            agent_id = %key.agent_id,
            total_turns,
            threshold = self.turns_threshold,
            send_mode = ?self.send_mode,
            "trigger evaluated"
        );
        TraceEvent::TriggerEvaluated {
            session_id: key.session_id.clone(),
            agent_id: key.agent_id.clone(),
            total_turns,
            fired,
        }
        .emit();

        Ok(fired)
    }

    fn select_messages(&self, segments: &[Segment]) -> Vec<Message> {
        match self.send_mode {
            SendMode::All => segments.iter().flat_map(|s| s.messages.clone()).collect(),
            SendMode::Delta => segments
                .iter()
                .filter(|s| !s.sent)
                .flat_map(|s| s.messages.clone())
                .collect(),
            SendMode::Window => {
                // Tag each message with its owning segment's timestamp,
                // order by that tag, keep the trailing window. The sort
                // is stable, so intra-segment order survives ties.
                let mut tagged: Vec<(chrono::DateTime<chrono::Utc>, Message)> = segments
                    .iter()
                    .flat_map(|s| s.messages.iter().map(|m| (s.timestamp, m.clone())))
                    .collect();
                tagged.sort_by_key(|(ts, _)| *ts);

                let skip = tagged.len().saturating_sub(self.window_size);
                tagged.into_iter().skip(skip).map(|(_, m)| m).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use cm_domain::SegmentRecord;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn message(content: &str, at: i64) -> Message {
        Message {
            sender: "user".into(),
            content: content.into(),
            timestamp: ts(at),
        }
    }

    fn record(id: &str, at: i64, contents: &[&str]) -> SegmentRecord {
        SegmentRecord {
            id: id.into(),
            session_id: "sess-1".into(),
            agent_id: "agent-1".into(),
            timestamp: ts(at),
            messages: contents
                .iter()
                .enumerate()
                .map(|(i, c)| message(c, at + i as i64))
                .collect(),
        }
    }

    fn policy(mode: SendMode) -> TurnCountPolicy {
        TurnCountPolicy::new(&PolicyConfig {
            send_mode: mode,
            window_size: 2,
            ..PolicyConfig::default()
        })
    }

    fn store() -> (tempfile::TempDir, SegmentStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SegmentStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn fires_only_once_threshold_is_reached() {
        let (_dir, store) = store();
        let policy = policy(SendMode::All);
        let key = CorrelationKey::new("sess-1", "agent-1");

        store.upsert(&record("seg-1", 0, &["a", "b"])).unwrap();
        assert!(!policy.should_trigger(&key, &store).await.unwrap());

        store.upsert(&record("seg-2", 10, &["c", "d"])).unwrap();
        assert!(policy.should_trigger(&key, &store).await.unwrap());
    }

    #[tokio::test]
    async fn redelivery_below_threshold_never_fires() {
        let (_dir, store) = store();
        let policy = policy(SendMode::All);
        let key = CorrelationKey::new("sess-1", "agent-1");

        let rec = record("seg-1", 0, &["a", "b"]);
        for _ in 0..5 {
            store.upsert(&rec).unwrap();
            assert!(!policy.should_trigger(&key, &store).await.unwrap());
        }
    }

    #[test]
    fn all_vs_delta_selection() {
        let (_dir, store) = store();
        store.upsert(&record("seg-1", 0, &["a", "b"])).unwrap();
        store.upsert(&record("seg-2", 10, &["c"])).unwrap();
        store.mark_sent("sess-1", "agent-1").unwrap();
        store.upsert(&record("seg-3", 20, &["d", "e"])).unwrap();

        let segments = store.list_by_session("sess-1", "agent-1");

        let all: Vec<String> = policy(SendMode::All)
            .select_messages(&segments)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(all, vec!["a", "b", "c", "d", "e"]);

        let delta: Vec<String> = policy(SendMode::Delta)
            .select_messages(&segments)
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(delta, vec!["d", "e"]);
    }

    #[test]
    fn window_selects_latest_across_segments() {
        let (_dir, store) = store();
        store.upsert(&record("seg-1", 0, &["a", "b"])).unwrap();
        store.upsert(&record("seg-2", 10, &["c"])).unwrap();
        store.upsert(&record("seg-3", 20, &["d", "e"])).unwrap();

        let segments = store.list_by_session("sess-1", "agent-1");
        let window: Vec<String> = policy(SendMode::Window)
            .select_messages(&segments)
            .into_iter()
            .map(|m| m.content)
            .collect();

        // window_size = 2: the two messages of the latest segment, in
        // ascending time order.
        assert_eq!(window, vec!["d", "e"]);
    }

    #[test]
    fn delta_with_everything_sent_is_empty() {
        let (_dir, store) = store();
        store.upsert(&record("seg-1", 0, &["a", "b"])).unwrap();
        store.mark_sent("sess-1", "agent-1").unwrap();

        let segments = store.list_by_session("sess-1", "agent-1");
        assert!(policy(SendMode::Delta).select_messages(&segments).is_empty());
    }

    #[tokio::test]
    async fn periodic_check_returns_no_candidates() {
        let (_dir, store) = store();
        store.upsert(&record("seg-1", 0, &["a"])).unwrap();
        let candidates = policy(SendMode::All).periodic_check(&store).await.unwrap();
        assert!(candidates.is_empty());
    }
}
