//! Small shared utilities: timestamps, id generation, config fingerprints.

mod fingerprint;
mod ids;
mod timestamps;

pub use fingerprint::definition_fingerprint;
pub use ids::{execution_id, node_execution_id, record_id};
pub use timestamps::{iso_timestamp, now_utc, Timestamp};
