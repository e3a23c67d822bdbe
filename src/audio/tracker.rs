//! Threshold policy for anomaly markers.

use crate::models::Marker;
use crate::waveform::WaveformModel;
use log::info;

/// Default decibel threshold above which a block is flagged.
pub const DEFAULT_DB_THRESHOLD: i32 = 65;

/// Stateless threshold check. Every block whose raw dB exceeds the threshold
/// produces one marker at the amplitude just appended for that block; there
/// is no hysteresis or debounce, so sustained loud sections mark every block.
#[derive(Debug, Clone, Copy)]
pub struct MarkerTracker {
    threshold_db: i32,
}

impl MarkerTracker {
    pub fn new(threshold_db: i32) -> Self {
        Self { threshold_db }
    }

    /// Apply the policy for one analyzed block. The block's amplitude must
    /// already be appended to `model`; the marker references its index.
    /// Returns the marker if one was raised.
    pub fn observe(&self, model: &mut WaveformModel, db: i32, elapsed_ms: u64) -> Option<Marker> {
        if db <= self.threshold_db {
            return None;
        }
        let index = model.last_index()?;
        let marker = Marker::new(index, db, elapsed_ms);
        model.push_marker(marker);
        info!(
            "anomaly: {} dB at {:.1}s (sample {})",
            db,
            elapsed_ms as f64 / 1000.0,
            index
        );
        Some(marker)
    }
}

impl Default for MarkerTracker {
    fn default() -> Self {
        Self::new(DEFAULT_DB_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marks_only_blocks_above_threshold() {
        let tracker = MarkerTracker::default();
        let mut model = WaveformModel::new();

        for (db, elapsed_ms) in [(40, 0u64), (70, 500), (50, 1000)] {
            model.push_amplitude(0.2);
            tracker.observe(&mut model, db, elapsed_ms);
        }

        assert_eq!(model.len(), 3);
        assert_eq!(model.markers(), &[Marker::new(1, 70, 500)]);
    }

    #[test]
    fn threshold_is_strictly_exceeded() {
        let tracker = MarkerTracker::new(65);
        let mut model = WaveformModel::new();
        model.push_amplitude(0.3);
        assert!(tracker.observe(&mut model, 65, 100).is_none());
        assert!(tracker.observe(&mut model, 66, 200).is_some());
    }

    #[test]
    fn every_qualifying_block_marks() {
        let tracker = MarkerTracker::new(65);
        let mut model = WaveformModel::new();
        for ms in [0u64, 100, 200] {
            model.push_amplitude(0.9);
            tracker.observe(&mut model, 90, ms);
        }
        assert_eq!(model.markers().len(), 3);
    }

    #[test]
    fn no_marker_before_first_amplitude() {
        let tracker = MarkerTracker::default();
        let mut model = WaveformModel::new();
        assert!(tracker.observe(&mut model, 99, 0).is_none());
        assert!(model.markers().is_empty());
    }
}
