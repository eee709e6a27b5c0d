//! The typed JSON-shaped records sent to subscribers.

use fnv::FnvHashMap;
use serde::Serialize;

/// The driver-keyed payload carried by both `karting_data` and the cached
/// replay sent to a newly attached subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct KartingDataPayload {
    pub circuit_id: String,
    pub drivers: FnvHashMap<String, FnvHashMap<String, String>>,
    pub column_order: Vec<String>,
    pub message_count: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusPayload {
    pub timing_connected: bool,
    pub attempt: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum DownstreamMessage {
    #[serde(rename = "karting_data")]
    KartingData(KartingDataPayload),
    #[serde(rename = "cached_data")]
    CachedData {
        data: KartingDataPayload,
        column_order: Option<Vec<String>>,
    },
    #[serde(rename = "status_update")]
    StatusUpdate {
        circuit_id: String,
        status: StatusPayload,
    },
    #[serde(rename = "error")]
    Error { circuit_id: String, error: String },
    #[serde(rename = "pong")]
    Pong { timestamp: u64 },
}

impl DownstreamMessage {
    /// Builds the `cached_data` wrapper replayed to a newly attached
    /// subscriber.
    pub fn cached(payload: KartingDataPayload) -> Self {
        let column_order = Some(payload.column_order.clone());
        DownstreamMessage::CachedData {
            data: payload,
            column_order,
        }
    }

    pub fn pong(timestamp: u64) -> Self {
        DownstreamMessage::Pong { timestamp }
    }
}
