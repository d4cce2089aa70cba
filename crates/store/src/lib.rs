//! Durable keyed storage for conversation segments.

mod store;

pub use store::{SegmentStore, Upserted};
