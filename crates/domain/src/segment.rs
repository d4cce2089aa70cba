//! Segment and message shapes.
//!
//! `SegmentRecord` is the wire shape delivered on the bus (camelCase JSON);
//! `Segment` is the stored row the segment store keeps per record `id`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One message inside a conversation segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Render the sender as a transcript role. Only `"user"` maps to
    /// `User`; every other sender is treated as the assistant side.
    pub fn role(&self) -> &'static str {
        if self.sender == "user" {
            "User"
        } else {
            "Assistant"
        }
    }
}

/// The wire shape of one conversation segment as published on the bus.
///
/// All fields are required; a payload missing any of them is malformed
/// and gets dropped by the ingestion loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRecord {
    pub id: String,
    pub session_id: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl SegmentRecord {
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey {
            session_id: self.session_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }

    /// Reject records whose required identifiers are present but empty.
    /// Missing fields are already caught at deserialization.
    pub fn validate(&self) -> crate::Result<()> {
        if self.id.is_empty() {
            return Err(crate::Error::Malformed("empty segment id".into()));
        }
        if self.session_id.is_empty() {
            return Err(crate::Error::Malformed("empty sessionId".into()));
        }
        if self.agent_id.is_empty() {
            return Err(crate::Error::Malformed("empty agentId".into()));
        }
        Ok(())
    }
}

/// A stored conversation segment.
///
/// `seq` is a monotonic insertion counter assigned once on first insert;
/// it breaks ordering ties between segments with identical timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub session_id: String,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Message>,
    /// Flips to true only after a successful downstream forward covering
    /// this segment. Never cleared by upsert.
    #[serde(default)]
    pub sent: bool,
    /// Message count at persist time.
    pub turn_count: usize,
    pub seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Segment {
    pub fn key(&self) -> CorrelationKey {
        CorrelationKey {
            session_id: self.session_id.clone(),
            agent_id: self.agent_id.clone(),
        }
    }
}

/// The pair identifying one logical conversation session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationKey {
    pub session_id: String,
    pub agent_id: String,
}

impl CorrelationKey {
    pub fn new(session_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            agent_id: agent_id.into(),
        }
    }
}

/// Display is used as the lock-map and session-router key.
impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.session_id, self.agent_id)
    }
}
