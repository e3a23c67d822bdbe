//! Audio capture, analysis, and playback using PipeWire
//!
//! This module provides:
//! - Microphone capture at 44.1kHz mono 16-bit
//! - Per-block RMS/decibel analysis and threshold marker tracking
//! - Session playback with position tracking and fraction-based seeking

pub mod analyzer;
mod capture;
pub mod playback;
mod tracker;

pub use analyzer::{display_db, AnalyzerConfig, LevelAnalyzer, LevelReading};
pub use capture::{AudioCapture, CaptureConfig, CaptureState, CaptureSummary, LevelEvent};
pub use playback::{progress_fraction, seek_target_ms, AudioPlayer, POLL_INTERVAL};
pub use tracker::{MarkerTracker, DEFAULT_DB_THRESHOLD};
