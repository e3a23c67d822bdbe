//! Command implementations.
//!
//! `run_monitor` is the single consumer of the capture channel: it owns the
//! waveform model, the live window, and the marker tracker, applying level
//! events in arrival order. The other runners operate on persisted sessions.

use crate::audio::{
    display_db, progress_fraction, AudioCapture, AudioPlayer, LevelEvent, MarkerTracker,
    POLL_INTERVAL,
};
use crate::session::SessionStore;
use crate::settings::MonitorConfig;
use crate::waveform::{LiveWindow, WaveGeometry, WaveformModel};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, select, unbounded};
use log::{debug, info};
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

/// Width of the textual waveform strip printed during playback.
const VIEW_COLUMNS: usize = 64;

/// Running decibel statistics for one monitoring session.
#[derive(Debug, Default, Clone, Copy)]
struct LevelStats {
    count: u64,
    sum: i64,
    min: i32,
    max: i32,
}

impl LevelStats {
    fn observe(&mut self, db: i32) {
        if self.count == 0 {
            self.min = db;
            self.max = db;
        } else {
            self.min = self.min.min(db);
            self.max = self.max.max(db);
        }
        self.count += 1;
        self.sum += db as i64;
    }

    fn summary(&self) -> String {
        if self.count == 0 {
            return "no blocks captured".to_string();
        }
        format!(
            "min {} dB, max {} dB, avg {} dB over {} blocks",
            self.min,
            self.max,
            self.sum / self.count as i64,
            self.count
        )
    }
}

fn apply_event(
    event: LevelEvent,
    model: &mut WaveformModel,
    window: &mut LiveWindow,
    tracker: &MarkerTracker,
    stats: &mut LevelStats,
) {
    model.push_amplitude(event.amplitude);
    window.push(event.amplitude);
    stats.observe(event.db);
    tracker.observe(model, event.db, event.elapsed_ms);
    debug!(
        "block at {} ms: {} dB (display {}), window {}/{} ({} evicted)",
        event.elapsed_ms,
        event.db,
        display_db(event.db),
        window.len(),
        window.total_seen(),
        window.evicted()
    );
}

/// Read the capture temp file, removing it whether or not the read worked.
fn read_temp_pcm(path: &std::path::Path) -> std::io::Result<Vec<u8>> {
    let pcm = std::fs::read(path);
    let _ = std::fs::remove_file(path);
    pcm
}

/// Capture until Enter (or the requested duration), then persist the session.
pub fn run_monitor(
    store: &SessionStore,
    config: MonitorConfig,
    duration_secs: Option<u64>,
) -> Result<()> {
    let (events_tx, events_rx) = unbounded::<LevelEvent>();

    let pcm_path =
        std::env::temp_dir().join(format!("acousticguard-{}.pcm", std::process::id()));
    let mut capture = AudioCapture::new(config.capture_config());
    capture
        .start(pcm_path.clone(), events_tx)
        .map_err(|e| anyhow!(e))
        .context("failed to start capture")?;
    debug!("capture state: {:?}", capture.state());

    let deadline = duration_secs.map(|s| Instant::now() + Duration::from_secs(s));
    let (stop_tx, stop_rx) = bounded::<()>(1);
    // Held so the stop channel stays open in timed mode.
    let mut stop_tx = Some(stop_tx);
    if deadline.is_none() {
        println!(
            "Monitoring (threshold {} dB), press Enter to stop.",
            config.db_threshold
        );
        if let Some(tx) = stop_tx.take() {
            thread::spawn(move || {
                let mut line = String::new();
                let _ = std::io::stdin().read_line(&mut line);
                let _ = tx.send(());
            });
        }
    } else {
        println!(
            "Monitoring for {}s (threshold {} dB).",
            duration_secs.unwrap_or(0),
            config.db_threshold
        );
    }

    let mut model = WaveformModel::new();
    let mut window = LiveWindow::new(config.live_window);
    let tracker = MarkerTracker::new(config.db_threshold);
    let mut stats = LevelStats::default();

    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        select! {
            recv(events_rx) -> event => match event {
                Ok(event) => apply_event(event, &mut model, &mut window, &tracker, &mut stats),
                // Capture thread went away; stop() below reports why.
                Err(_) => break,
            },
            recv(stop_rx) -> _ => break,
            default(Duration::from_millis(50)) => {}
        }
    }

    let summary = match capture.stop() {
        Ok(summary) => summary,
        Err(e) => {
            let _ = std::fs::remove_file(&pcm_path);
            return Err(anyhow!(e)).context("capture failed");
        }
    };

    // In-flight blocks finished before stop() returned; fold them in.
    for event in events_rx.try_iter() {
        apply_event(event, &mut model, &mut window, &tracker, &mut stats);
    }

    let pcm = read_temp_pcm(&summary.pcm_path)
        .with_context(|| format!("failed to read {}", summary.pcm_path.display()))?;
    let session = store
        .save(&pcm, summary.sample_rate, &model)
        .context("failed to save session")?;

    let seconds = summary.bytes_written as f64 / 2.0 / summary.sample_rate as f64;
    info!(
        "saved {} ({:.1}s, {} markers, {})",
        session.base_name,
        seconds,
        model.markers().len(),
        stats.summary()
    );
    println!(
        "Saved {} with {} anomaly markers.",
        session.base_name,
        model.markers().len()
    );
    Ok(())
}

/// List saved sessions, newest first.
pub fn run_list(store: &SessionStore) -> Result<()> {
    let sessions = store.list().context("failed to list sessions")?;
    if sessions.is_empty() {
        println!("No sessions in {}.", store.sessions_dir().display());
        return Ok(());
    }

    for info in sessions {
        let model = store.load_waveform(&info);
        let when = info
            .recorded_at()
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown time".to_string());
        println!(
            "{}  {}  {} samples, {} markers",
            info.base_name,
            when,
            model.len(),
            model.markers().len()
        );
    }
    Ok(())
}

/// Print a session's anomaly markers, newest first.
pub fn run_show(store: &SessionStore, base_name: &str) -> Result<()> {
    let info = store.find(base_name)?;
    let model = store.load_waveform(&info);

    println!(
        "{}: {} samples, {} markers",
        info.base_name,
        model.len(),
        model.markers().len()
    );
    for marker in model.markers().iter().rev() {
        println!(
            "Anomaly: {}dB at {}s (sample {})",
            marker.db,
            marker.timestamp_ms / 1000,
            marker.index
        );
    }
    Ok(())
}

fn glyph_rank(glyph: u8) -> u8 {
    match glyph {
        b'#' => 3,
        b'|' => 2,
        b'.' => 1,
        _ => 0,
    }
}

/// Textual amplitude and marker strips for a session, one glyph per column.
fn waveform_strips(model: &WaveformModel) -> (String, String) {
    // Height 2.0 puts half extents in [0, 0.8] for a full-scale amplitude.
    let geometry = model.render_geometry(VIEW_COLUMNS as f32, 2.0);

    let mut wave = vec![b' '; VIEW_COLUMNS];
    for bar in &geometry.bars {
        let col = (bar.x as usize).min(VIEW_COLUMNS - 1);
        let glyph = match bar.half_extent {
            h if h > 0.4 => b'#',
            h if h > 0.1 => b'|',
            h if h > 0.01 => b'.',
            _ => b' ',
        };
        // Keep the loudest glyph per column
        if glyph_rank(glyph) > glyph_rank(wave[col]) {
            wave[col] = glyph;
        }
    }

    let mut markers = vec![b'-'; VIEW_COLUMNS];
    for x in &geometry.marker_xs {
        let col = (*x as usize).min(VIEW_COLUMNS - 1);
        markers[col] = b'!';
    }

    (
        String::from_utf8_lossy(&wave).into_owned(),
        String::from_utf8_lossy(&markers).into_owned(),
    )
}

/// Play a session, polling the transport every 100 ms to move the cursor.
pub fn run_play(store: &SessionStore, base_name: &str, seek: Option<f32>) -> Result<()> {
    let info = store.find(base_name)?;
    let model = store.load_waveform(&info);
    let (samples, sample_rate) = store
        .load_audio(&info)
        .with_context(|| format!("failed to load audio for {}", base_name))?;

    let mut player = AudioPlayer::new();
    player.load(samples, sample_rate);
    let state = player.shared_state();
    if let Some(fraction) = seek {
        state.seek(fraction);
    }

    println!("Playing {} ({} ms)", info.base_name, state.duration_ms());
    if !model.is_empty() {
        let (wave, markers) = waveform_strips(&model);
        println!("wave:    {}", wave);
        println!("markers: {}", markers);
    }

    player.play().map_err(|e| anyhow!(e))?;

    let mut stdout = std::io::stdout();
    while player.is_running() {
        let progress = progress_fraction(state.position_ms(), state.duration_ms());
        let cursor = WaveGeometry::cursor_x(progress, VIEW_COLUMNS as f32) as usize;
        let mut line = vec![b' '; VIEW_COLUMNS];
        line[cursor.min(VIEW_COLUMNS - 1)] = b'^';
        print!(
            "\rcursor:  {} {:5.1}%",
            String::from_utf8_lossy(&line),
            progress * 100.0
        );
        let _ = stdout.flush();
        thread::sleep(POLL_INTERVAL);
    }
    println!();

    player.stop();
    Ok(())
}

/// Show the persisted monitor settings, or change them.
pub fn run_config(threshold_db: Option<i32>) -> Result<()> {
    if let Some(threshold) = threshold_db {
        crate::settings::set_db_threshold(threshold);
        println!("Anomaly threshold set to {} dB.", threshold);
        return Ok(());
    }

    let config = MonitorConfig::load();
    println!("threshold:   {} dB", config.db_threshold);
    println!("sample rate: {} Hz", config.sample_rate);
    println!("live window: {} samples", config.live_window);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_pcm_is_removed_after_read() {
        let path = std::env::temp_dir().join(format!(
            "acousticguard-read-{}.pcm",
            std::process::id()
        ));
        std::fs::write(&path, [1u8, 2, 3, 4]).unwrap();

        let pcm = read_temp_pcm(&path).unwrap();
        assert_eq!(pcm, [1, 2, 3, 4]);
        assert!(!path.exists());
    }

    #[test]
    fn missing_temp_pcm_reports_the_read_error() {
        let path = std::env::temp_dir().join("acousticguard-missing.pcm");
        assert!(read_temp_pcm(&path).is_err());
    }
}
