use serde::Serialize;

/// Structured trace events emitted across all ConvMonitor crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SegmentPersisted {
        segment_id: String,
        session_id: String,
        agent_id: String,
        turn_count: usize,
        is_new: bool,
    },
    TriggerEvaluated {
        session_id: String,
        agent_id: String,
        total_turns: usize,
        fired: bool,
    },
    AgentCall {
        endpoint: String,
        status: u16,
        duration_ms: u64,
    },
    AgentSessionCreated {
        session_key: String,
        agent_session_id: String,
    },
    ForwardCompleted {
        session_key: String,
        messages: usize,
        created_session: bool,
    },
    SegmentsMarkedSent {
        session_id: String,
        agent_id: String,
        count: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "cm_event");
    }
}
