//! Acquisition
//!
//! Captures telemetry from the device into a session-owned sample store.

mod framed;
mod poller;
mod store;

pub use framed::spawn_framed;
pub use poller::Acquisition;
pub use store::{SampleStore, SessionInfo, Snapshot};

use serde::{Deserialize, Serialize};

/// Why an acquisition task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// Caller asked it to stop
    Shutdown,
    /// The stream ended on a record boundary
    StreamClosed,
}

/// Totals reported when an acquisition task ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionSummary {
    /// Records decoded and stored
    pub frames: u64,
    /// Bytes read from the stream
    pub bytes: u64,
    /// Partial-record bytes dropped at shutdown
    pub discarded_bytes: usize,
    /// How the task ended
    pub end: EndReason,
}
