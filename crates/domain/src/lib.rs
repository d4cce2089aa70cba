//! Shared domain types for ConvMonitor.
//!
//! Everything the other crates have in common lives here: the segment and
//! message shapes, the correlation key, the shared error type, structured
//! trace events, and the configuration model.

pub mod config;
pub mod error;
pub mod segment;
pub mod trace;

pub use error::{Error, Result};
pub use segment::{CorrelationKey, Message, Segment, SegmentRecord};
