//! Core data types shared across the monitoring pipeline.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A recorded anomaly event tied to a waveform position.
///
/// `index` is the position in the session's amplitude sequence at the moment
/// the event fired. Serialized field names match the on-disk metadata format
/// (`ts`, not `timestamp_ms`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub index: usize,
    pub db: i32,
    #[serde(rename = "ts")]
    pub timestamp_ms: u64,
}

impl Marker {
    pub fn new(index: usize, db: i32, timestamp_ms: u64) -> Self {
        Self {
            index,
            db,
            timestamp_ms,
        }
    }
}

/// A persisted recording session: paired audio and metadata files sharing a
/// timestamp-derived base name (`REC_<epoch_ms>`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub base_name: String,
    pub audio_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl SessionInfo {
    /// Recover the recording start time from the `REC_<epoch_ms>` base name.
    /// Returns `None` for files that were not named by this application.
    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        let millis: i64 = self.base_name.strip_prefix("REC_")?.parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorded_at_parses_epoch_base_name() {
        let info = SessionInfo {
            base_name: "REC_1700000000000".to_string(),
            audio_path: PathBuf::from("REC_1700000000000.wav"),
            metadata_path: PathBuf::from("REC_1700000000000.json"),
        };
        let ts = info.recorded_at().unwrap();
        assert_eq!(ts.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn recorded_at_rejects_foreign_names() {
        let info = SessionInfo {
            base_name: "voicememo".to_string(),
            audio_path: PathBuf::from("voicememo.wav"),
            metadata_path: PathBuf::from("voicememo.json"),
        };
        assert!(info.recorded_at().is_none());
    }
}
