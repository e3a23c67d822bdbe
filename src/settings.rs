//! Monitor tunables persistence using dconf
//!
//! Settings are stored in dconf under `/com/acousticguard/monitor/` and
//! assembled once into an explicit `MonitorConfig`; nothing reads dconf
//! mid-capture.

use crate::audio::{AnalyzerConfig, CaptureConfig, DEFAULT_DB_THRESHOLD};
use crate::session::codec::DEFAULT_SAMPLE_RATE;
use crate::waveform::DEFAULT_LIVE_WINDOW;
use log::error;

const DCONF_PATH: &str = "/com/acousticguard/monitor/";

/// Keys for dconf settings
mod keys {
    pub const DB_THRESHOLD: &str = "db-threshold";
    pub const SAMPLE_RATE: &str = "sample-rate";
    pub const LIVE_WINDOW: &str = "live-window";
}

fn get_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    let full_key = format!("{}{}", DCONF_PATH, key);
    dconf_rs::get_string(&full_key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn set_value(key: &str, value: &str) {
    let full_key = format!("{}{}", DCONF_PATH, key);
    if let Err(e) = dconf_rs::set_string(&full_key, value) {
        error!("Failed to save {} to dconf: {}", key, e);
    }
}

/// Get the anomaly threshold in dB (defaults to 65)
pub fn get_db_threshold() -> i32 {
    get_parsed(keys::DB_THRESHOLD, DEFAULT_DB_THRESHOLD)
}

/// Set the anomaly threshold in dB
pub fn set_db_threshold(threshold: i32) {
    set_value(keys::DB_THRESHOLD, &threshold.to_string());
}

/// Get the capture sample rate (defaults to 44100)
pub fn get_sample_rate() -> u32 {
    get_parsed(keys::SAMPLE_RATE, DEFAULT_SAMPLE_RATE)
}

/// Get the live waveform window size in samples (defaults to 1000)
pub fn get_live_window() -> usize {
    get_parsed(keys::LIVE_WINDOW, DEFAULT_LIVE_WINDOW)
}

/// All monitor tunables, resolved once at startup.
#[derive(Debug, Clone, Copy)]
pub struct MonitorConfig {
    pub db_threshold: i32,
    pub sample_rate: u32,
    pub live_window: usize,
}

impl MonitorConfig {
    /// Resolve from dconf, falling back to the defaults for unset keys.
    pub fn load() -> Self {
        Self {
            db_threshold: get_db_threshold(),
            sample_rate: get_sample_rate(),
            live_window: get_live_window(),
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            channels: 1,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            db_threshold: DEFAULT_DB_THRESHOLD,
            sample_rate: DEFAULT_SAMPLE_RATE,
            live_window: DEFAULT_LIVE_WINDOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_calibration() {
        let config = MonitorConfig::default();
        assert_eq!(config.db_threshold, 65);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.live_window, 1000);
    }
}
