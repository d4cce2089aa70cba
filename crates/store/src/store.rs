//! Monitor-owned segment store.
//!
//! Persists every conversation segment keyed by its globally unique `id`
//! in `segments.json` under the configured state directory. Redelivery of
//! an `id` is an idempotent in-place update, never a duplicate row. Rows
//! are never deleted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::RwLock;

use cm_domain::error::{Error, Result};
use cm_domain::trace::TraceEvent;
use cm_domain::{CorrelationKey, Segment, SegmentRecord};

/// Outcome of an upsert: whether the row was new, and its refreshed
/// turn count.
#[derive(Debug, Clone, Copy)]
pub struct Upserted {
    pub is_new: bool,
    pub turn_count: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Segment store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Segment store backed by a JSON file.
///
/// All mutations are write-through: the row is persisted to disk before
/// the call returns success, and rolled back in memory if the write
/// fails, so a successful return always means durable.
pub struct SegmentStore {
    segments_path: PathBuf,
    inner: RwLock<Inner>,
}

struct Inner {
    segments: HashMap<String, Segment>,
    next_seq: u64,
}

impl SegmentStore {
    /// Load or create the store at `state_dir/segments.json`.
    pub fn open(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir).map_err(Error::Io)?;

        let segments_path = state_dir.join("segments.json");
        let segments: HashMap<String, Segment> = if segments_path.exists() {
            let raw = std::fs::read_to_string(&segments_path).map_err(Error::Io)?;
            match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    tracing::warn!(
                        path = %segments_path.display(),
                        error = %e,
                        "segments file is corrupt, starting empty"
                    );
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        let next_seq = segments.values().map(|s| s.seq + 1).max().unwrap_or(0);

        tracing::info!(
            segments = segments.len(),
            path = %segments_path.display(),
            "segment store loaded"
        );

        Ok(Self {
            segments_path,
            inner: RwLock::new(Inner { segments, next_seq }),
        })
    }

    /// Insert or update the row for `record.id`.
    ///
    /// Last-write-wins on content (`messages`, `timestamp`, `turn_count`),
    /// while `sent`, `seq`, and `created_at` survive the update — `sent`
    /// is only ever set by the forward path and never cleared here.
    pub fn upsert(&self, record: &SegmentRecord) -> Result<Upserted> {
        let now = Utc::now();
        let mut inner = self.inner.write();

        let (row, is_new) = match inner.segments.get(&record.id) {
            Some(existing) => {
                let mut row = existing.clone();
                row.timestamp = record.timestamp;
                row.messages = record.messages.clone();
                row.turn_count = record.messages.len();
                row.updated_at = now;
                (row, false)
            }
            None => {
                let row = Segment {
                    id: record.id.clone(),
                    session_id: record.session_id.clone(),
                    agent_id: record.agent_id.clone(),
                    timestamp: record.timestamp,
                    messages: record.messages.clone(),
                    sent: false,
                    turn_count: record.messages.len(),
                    seq: inner.next_seq,
                    created_at: now,
                    updated_at: now,
                };
                (row, true)
            }
        };

        let turn_count = row.turn_count;
        let prev = inner.segments.insert(record.id.clone(), row);
        if is_new {
            inner.next_seq += 1;
        }

        if let Err(e) = persist(&self.segments_path, &inner.segments) {
            // Roll back so memory never claims more than disk holds.
            match prev {
                Some(p) => {
                    inner.segments.insert(record.id.clone(), p);
                }
                None => {
                    inner.segments.remove(&record.id);
                    inner.next_seq -= 1;
                }
            }
            return Err(e);
        }

        TraceEvent::SegmentPersisted {
            segment_id: record.id.clone(),
            session_id: record.session_id.clone(),
            agent_id: record.agent_id.clone(),
            turn_count,
            is_new,
        }
        .emit();

        Ok(Upserted { is_new, turn_count })
    }

    /// The session aggregate: every segment matching the key, ascending
    /// by `timestamp`, ties broken by insertion order.
    ///
    /// Recomputed from the map on every call; nothing is cached.
    pub fn list_by_session(&self, session_id: &str, agent_id: &str) -> Vec<Segment> {
        let inner = self.inner.read();
        let mut segments: Vec<Segment> = inner
            .segments
            .values()
            .filter(|s| s.session_id == session_id && s.agent_id == agent_id)
            .cloned()
            .collect();
        segments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        segments
    }

    /// Set `sent = true` on every segment currently matching the key.
    ///
    /// Returns how many rows changed. Rows inserted after the caller's
    /// read snapshot can be over-marked; under the per-key lock the
    /// window is empty for bus deliveries.
    pub fn mark_sent(&self, session_id: &str, agent_id: &str) -> Result<usize> {
        let now = Utc::now();
        let mut inner = self.inner.write();

        let mut changed = Vec::new();
        for segment in inner.segments.values_mut() {
            if segment.session_id == session_id && segment.agent_id == agent_id && !segment.sent {
                segment.sent = true;
                segment.updated_at = now;
                changed.push(segment.id.clone());
            }
        }

        if changed.is_empty() {
            return Ok(0);
        }

        if let Err(e) = persist(&self.segments_path, &inner.segments) {
            for id in &changed {
                if let Some(segment) = inner.segments.get_mut(id) {
                    segment.sent = false;
                }
            }
            return Err(e);
        }

        TraceEvent::SegmentsMarkedSent {
            session_id: session_id.to_owned(),
            agent_id: agent_id.to_owned(),
            count: changed.len(),
        }
        .emit();

        Ok(changed.len())
    }

    /// Look up one segment by id.
    pub fn get(&self, id: &str) -> Option<Segment> {
        self.inner.read().segments.get(id).cloned()
    }

    /// Distinct correlation keys currently present in the store.
    pub fn list_keys(&self) -> Vec<CorrelationKey> {
        let inner = self.inner.read();
        let mut keys: Vec<CorrelationKey> = inner.segments.values().map(|s| s.key()).collect();
        keys.sort_by(|a, b| {
            a.session_id
                .cmp(&b.session_id)
                .then(a.agent_id.cmp(&b.agent_id))
        });
        keys.dedup();
        keys
    }

    /// Total number of stored segments.
    pub fn segment_count(&self) -> usize {
        self.inner.read().segments.len()
    }

    /// Persist the current state to disk (used at shutdown).
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.read();
        persist(&self.segments_path, &inner.segments)
    }
}

fn persist(path: &Path, segments: &HashMap<String, Segment>) -> Result<()> {
    let json = serde_json::to_string_pretty(segments)
        .map_err(|e| Error::Store(format!("serializing segments: {e}")))?;
    std::fs::write(path, json).map_err(|e| Error::Store(format!("writing {}: {e}", path.display())))
}
