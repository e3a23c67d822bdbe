//! Waveform data model.
//!
//! Two views back the scrolling waveform: `WaveformModel` is the durable,
//! append-only record of a whole session (every amplitude, every marker,
//! absolute indices), and `LiveWindow` is the bounded FIFO ring shown while
//! capture is running. The window tracks how many samples it has evicted so
//! durable marker indices can be translated into window coordinates; markers
//! that scroll off the left edge disappear from the live view but stay in the
//! durable record.

#![allow(dead_code)]

use crate::models::Marker;

/// Default number of samples kept in the live view.
pub const DEFAULT_LIVE_WINDOW: usize = 1000;

/// Fraction of the half-height a full-scale amplitude occupies.
const VERTICAL_SCALE: f32 = 0.8;

/// Geometry for one rendered amplitude bar: a vertical line at `x` extending
/// `half_extent` above and below the centerline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveBar {
    pub x: f32,
    pub half_extent: f32,
}

/// Pure render geometry for a waveform viewport. This is data for a drawing
/// surface, not drawing calls; the cursor is placed separately from a
/// playback progress fraction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaveGeometry {
    pub bars: Vec<WaveBar>,
    /// X position of each visible marker, in insertion order.
    pub marker_xs: Vec<f32>,
}

impl WaveGeometry {
    /// X position of the playback cursor for a progress fraction in [0, 1].
    pub fn cursor_x(progress: f32, viewport_width: f32) -> f32 {
        progress.clamp(0.0, 1.0) * viewport_width
    }
}

fn bar_geometry(amplitudes: &[f32], viewport_width: f32, viewport_height: f32) -> Vec<WaveBar> {
    if amplitudes.is_empty() {
        return Vec::new();
    }
    let step = viewport_width / amplitudes.len() as f32;
    let center = viewport_height / 2.0;
    amplitudes
        .iter()
        .enumerate()
        .map(|(i, &amp)| WaveBar {
            x: i as f32 * step,
            half_extent: amp * center * VERTICAL_SCALE,
        })
        .collect()
}

/// The durable amplitude/marker record for one session.
///
/// Single writer: during capture only the monitor loop appends, and a loaded
/// session replaces the whole model at once. Amplitudes are normalized RMS
/// values in [0, 1]; marker indices are absolute positions in `amplitudes`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WaveformModel {
    amplitudes: Vec<f32>,
    markers: Vec<Marker>,
}

impl WaveformModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a model from persisted data.
    pub fn from_parts(amplitudes: Vec<f32>, markers: Vec<Marker>) -> Self {
        Self {
            amplitudes,
            markers,
        }
    }

    pub fn amplitudes(&self) -> &[f32] {
        &self.amplitudes
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Append one amplitude and return its index.
    pub fn push_amplitude(&mut self, amplitude: f32) -> usize {
        self.amplitudes.push(amplitude);
        self.amplitudes.len() - 1
    }

    /// Append a marker. Callers insert in non-decreasing timestamp order;
    /// the single-writer capture path guarantees it.
    pub fn push_marker(&mut self, marker: Marker) {
        debug_assert!(marker.index < self.amplitudes.len());
        self.markers.push(marker);
    }

    /// Index of the most recently appended amplitude, if any.
    pub fn last_index(&self) -> Option<usize> {
        self.amplitudes.len().checked_sub(1)
    }

    pub fn clear(&mut self) {
        self.amplitudes.clear();
        self.markers.clear();
    }

    /// Wholesale swap used when loading a session.
    pub fn replace(&mut self, amplitudes: Vec<f32>, markers: Vec<Marker>) {
        self.amplitudes = amplitudes;
        self.markers = markers;
    }

    /// Geometry for the full session, every amplitude visible. Used for
    /// loaded sessions where marker indices are always in range.
    pub fn render_geometry(&self, viewport_width: f32, viewport_height: f32) -> WaveGeometry {
        if self.amplitudes.is_empty() {
            return WaveGeometry::default();
        }
        let bars = bar_geometry(&self.amplitudes, viewport_width, viewport_height);
        let step = viewport_width / self.amplitudes.len() as f32;
        let marker_xs = self
            .markers
            .iter()
            .map(|m| m.index as f32 * step)
            .collect();
        WaveGeometry { bars, marker_xs }
    }
}

/// Bounded most-recent-samples view used during live capture.
#[derive(Debug, Clone)]
pub struct LiveWindow {
    samples: Vec<f32>,
    cap: usize,
    evicted: usize,
}

impl LiveWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            samples: Vec::with_capacity(cap.max(1)),
            cap: cap.max(1),
            evicted: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples that have scrolled off the left edge.
    pub fn evicted(&self) -> usize {
        self.evicted
    }

    /// Total samples observed since the last clear.
    pub fn total_seen(&self) -> usize {
        self.evicted + self.samples.len()
    }

    pub fn push(&mut self, amplitude: f32) {
        self.samples.push(amplitude);
        if self.samples.len() > self.cap {
            self.samples.remove(0);
            self.evicted += 1;
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.evicted = 0;
    }

    /// Geometry for the live view. Markers carry absolute session indices;
    /// only those still inside the window are visible.
    pub fn render_geometry(
        &self,
        markers: &[Marker],
        viewport_width: f32,
        viewport_height: f32,
    ) -> WaveGeometry {
        let bars = bar_geometry(&self.samples, viewport_width, viewport_height);
        if self.samples.is_empty() {
            return WaveGeometry::default();
        }
        let step = viewport_width / self.samples.len() as f32;
        let marker_xs = markers
            .iter()
            .filter_map(|m| m.index.checked_sub(self.evicted))
            .filter(|&rel| rel < self.samples.len())
            .map(|rel| rel as f32 * step)
            .collect();
        WaveGeometry { bars, marker_xs }
    }
}

impl Default for LiveWindow {
    fn default() -> Self {
        Self::new(DEFAULT_LIVE_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_appends_in_order() {
        let mut model = WaveformModel::new();
        assert_eq!(model.push_amplitude(0.1), 0);
        assert_eq!(model.push_amplitude(0.2), 1);
        assert_eq!(model.amplitudes(), &[0.1, 0.2]);
        assert_eq!(model.last_index(), Some(1));
    }

    #[test]
    fn replace_swaps_wholesale() {
        let mut model = WaveformModel::new();
        model.push_amplitude(0.5);
        model.push_marker(Marker::new(0, 70, 100));
        model.replace(vec![0.1, 0.2, 0.3], vec![Marker::new(2, 80, 900)]);
        assert_eq!(model.amplitudes(), &[0.1, 0.2, 0.3]);
        assert_eq!(model.markers(), &[Marker::new(2, 80, 900)]);
    }

    #[test]
    fn full_geometry_places_bars_at_step_multiples() {
        let mut model = WaveformModel::new();
        for amp in [0.0, 0.25, 0.5, 1.0] {
            model.push_amplitude(amp);
        }
        model.push_marker(Marker::new(2, 70, 500));

        let geo = model.render_geometry(400.0, 200.0);
        assert_eq!(geo.bars.len(), 4);
        let xs: Vec<f32> = geo.bars.iter().map(|b| b.x).collect();
        assert_eq!(xs, vec![0.0, 100.0, 200.0, 300.0]);
        // half extent = amp * height/2 * 0.8
        assert_eq!(geo.bars[3].half_extent, 80.0);
        assert_eq!(geo.marker_xs, vec![200.0]);
    }

    #[test]
    fn empty_model_renders_empty_geometry() {
        let model = WaveformModel::new();
        let geo = model.render_geometry(400.0, 200.0);
        assert!(geo.bars.is_empty());
        assert!(geo.marker_xs.is_empty());
    }

    #[test]
    fn window_evicts_oldest_and_counts() {
        let mut window = LiveWindow::new(3);
        for i in 0..5 {
            window.push(i as f32 / 10.0);
        }
        assert_eq!(window.len(), 3);
        assert_eq!(window.evicted(), 2);
        assert_eq!(window.total_seen(), 5);
    }

    #[test]
    fn evicted_markers_leave_live_view_but_stay_durable() {
        let mut model = WaveformModel::new();
        let mut window = LiveWindow::new(2);
        for i in 0..4 {
            model.push_amplitude(0.5);
            window.push(0.5);
            if i == 0 {
                model.push_marker(Marker::new(0, 70, 0));
            }
        }
        // Index 0 was evicted from the window (cap 2, 4 pushes).
        let geo = window.render_geometry(model.markers(), 100.0, 50.0);
        assert!(geo.marker_xs.is_empty());
        assert_eq!(model.markers().len(), 1);
    }

    #[test]
    fn visible_marker_maps_to_window_coordinates() {
        let mut model = WaveformModel::new();
        let mut window = LiveWindow::new(2);
        for i in 0..3 {
            let idx = model.push_amplitude(0.5);
            window.push(0.5);
            if i == 2 {
                model.push_marker(Marker::new(idx, 72, 300));
            }
        }
        // Window holds samples 1 and 2; marker at absolute 2 is relative 1.
        let geo = window.render_geometry(model.markers(), 100.0, 50.0);
        assert_eq!(geo.marker_xs, vec![50.0]);
    }

    #[test]
    fn cursor_position_clamps_progress() {
        assert_eq!(WaveGeometry::cursor_x(0.5, 200.0), 100.0);
        assert_eq!(WaveGeometry::cursor_x(-0.2, 200.0), 0.0);
        assert_eq!(WaveGeometry::cursor_x(1.7, 200.0), 200.0);
    }
}
