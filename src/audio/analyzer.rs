//! Block-level loudness analysis.
//!
//! Converts a captured block of signed 16-bit PCM samples into an RMS
//! amplitude and an integer decibel value. The decibel reference divisor
//! (0.1) is a calibration constant carried over from the original device
//! profile and must not change, or saved sessions stop comparing against
//! live readings.

/// Decibel value reported for silence, where `log10` is undefined.
pub const SILENCE_FLOOR_DB: i32 = -100;

/// Minimum decibel value shown to the user. Display only; thresholding
/// always operates on the raw value.
pub const DISPLAY_DB_MIN: i32 = 30;

/// Calibration constants for the analyzer. Explicit so tests and alternate
/// profiles can supply their own instead of recompiling.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Reference divisor for the dB conversion.
    pub reference_amplitude: f64,
    /// Value reported when the block is pure silence.
    pub floor_db: i32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            reference_amplitude: 0.1,
            floor_db: SILENCE_FLOOR_DB,
        }
    }
}

/// One analyzed block: raw RMS, the normalized waveform amplitude, and the
/// raw (unclamped) decibel value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelReading {
    pub rms: f64,
    pub amplitude: f32,
    pub db: i32,
}

/// Pure per-block analyzer. Stateless; the same block always produces the
/// same reading.
#[derive(Debug, Clone, Copy)]
pub struct LevelAnalyzer {
    config: AnalyzerConfig,
}

impl LevelAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyze one block of signed 16-bit samples.
    ///
    /// `rms = sqrt(sum(s_i^2) / N)`, `db = floor(20 * log10(rms / ref))`.
    /// An empty or all-zero block yields the configured floor instead of a
    /// NaN from `log10(0)`.
    pub fn analyze(&self, block: &[i16]) -> LevelReading {
        if block.is_empty() {
            return LevelReading {
                rms: 0.0,
                amplitude: 0.0,
                db: self.config.floor_db,
            };
        }

        let sum_squares: f64 = block.iter().map(|&s| s as f64 * s as f64).sum();
        let rms = (sum_squares / block.len() as f64).sqrt();

        let db = if rms > 0.0 {
            let value = 20.0 * (rms / self.config.reference_amplitude).log10();
            value.floor() as i32
        } else {
            self.config.floor_db
        };

        LevelReading {
            rms,
            amplitude: (rms / 32768.0) as f32,
            db,
        }
    }
}

impl Default for LevelAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}

/// Clamp a raw decibel value for display.
pub fn display_db(db: i32) -> i32 {
    db.max(DISPLAY_DB_MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_block_yields_exact_db() {
        let analyzer = LevelAnalyzer::default();
        // rms = 1000, db = 20 * log10(1000 / 0.1) = 80
        let block = vec![1000i16; 512];
        let reading = analyzer.analyze(&block);
        assert!((reading.rms - 1000.0).abs() < 1e-9);
        assert_eq!(reading.db, 80);
        assert!((reading.amplitude - 1000.0 / 32768.0).abs() < 1e-7);
    }

    #[test]
    fn sign_does_not_affect_rms() {
        let analyzer = LevelAnalyzer::default();
        let positive = analyzer.analyze(&[1000, 1000]);
        let mixed = analyzer.analyze(&[1000, -1000]);
        assert_eq!(positive, mixed);
    }

    #[test]
    fn full_scale_block() {
        let analyzer = LevelAnalyzer::default();
        let reading = analyzer.analyze(&[i16::MAX; 64]);
        // 20 * log10(32767 / 0.1) = 110.30..., floored
        assert_eq!(reading.db, 110);
    }

    #[test]
    fn silence_hits_floor_without_panicking() {
        let analyzer = LevelAnalyzer::default();
        let reading = analyzer.analyze(&[0i16; 256]);
        assert_eq!(reading.db, SILENCE_FLOOR_DB);
        assert_eq!(reading.amplitude, 0.0);
        assert_eq!(reading.rms, 0.0);
    }

    #[test]
    fn empty_block_is_treated_as_silence() {
        let analyzer = LevelAnalyzer::default();
        let reading = analyzer.analyze(&[]);
        assert_eq!(reading.db, SILENCE_FLOOR_DB);
    }

    #[test]
    fn analysis_is_deterministic() {
        let analyzer = LevelAnalyzer::default();
        let block: Vec<i16> = (0..480).map(|i| ((i * 37) % 7000) as i16 - 3500).collect();
        assert_eq!(analyzer.analyze(&block), analyzer.analyze(&block));
    }

    #[test]
    fn display_clamps_quiet_values_only() {
        assert_eq!(display_db(-100), 30);
        assert_eq!(display_db(12), 30);
        assert_eq!(display_db(70), 70);
    }
}
