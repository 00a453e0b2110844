// components/progress_feed/src/lib.rs
mod parser;

pub use parser::{ProgressTracker, ASSUMED_TRACK_SECONDS, DEFAULT_THROTTLE};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Pipeline phase a progress event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Downloading,
    Processing,
    Error,
    FileStart,
    FileChunk,
    FileComplete,
}

/// One structured progress update for a job.
///
/// Percentage is non-decreasing per (job, phase); see [`ProgressTracker`]
/// for how raw subprocess output is normalized into these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub phase: Phase,
    pub percent: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Total artifact size, set on [`Phase::FileStart`] events only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
}

impl ProgressEvent {
    pub fn new(job_id: Uuid, phase: Phase, percent: f32) -> Self {
        Self {
            job_id,
            phase,
            percent,
            message: None,
            total_bytes: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_total_bytes(mut self, total: u64) -> Self {
        self.total_bytes = Some(total);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_shape() {
        let id = Uuid::new_v4();
        let event = ProgressEvent::new(id, Phase::Downloading, 42.5);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "downloading");
        assert_eq!(json["percent"], 42.5);
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_event_roundtrip_with_message() {
        let event = ProgressEvent::new(Uuid::new_v4(), Phase::FileChunk, 10.0)
            .with_message("chunk 1 of 10");

        let json = serde_json::to_string(&event).unwrap();
        let decoded: ProgressEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }
}
