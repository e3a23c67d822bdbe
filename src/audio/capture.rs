//! Microphone capture using PipeWire.
//!
//! One dedicated thread runs the PipeWire loop. Each captured block is
//! analyzed and its PCM bytes appended to the session's temp file on that
//! thread; the resulting `LevelEvent`s cross to the monitor loop over a
//! channel. The monitor loop is the only context that touches the waveform
//! model, so no lock guards it.

use crate::audio::analyzer::{AnalyzerConfig, LevelAnalyzer};
use crate::session::codec::DEFAULT_SAMPLE_RATE;
use crossbeam_channel::Sender;
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// One analyzed capture block, handed from the capture thread to the
/// monitor loop. `db` is the raw value; display clamping happens later.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelEvent {
    pub amplitude: f32,
    pub db: i32,
    pub elapsed_ms: u64,
}

/// Current state of audio capture
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Capturing,
    Error,
}

/// Audio capture configuration
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Requested sample rate (default: 44100)
    pub sample_rate: u32,
    /// Number of channels (default: 1 for mono)
    pub channels: u32,
    pub analyzer: AnalyzerConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            analyzer: AnalyzerConfig::default(),
        }
    }
}

/// Shared state for audio capture - thread-safe
#[derive(Clone)]
pub struct SharedCaptureState {
    inner: Arc<Mutex<CaptureStateInner>>,
}

struct CaptureStateInner {
    state: CaptureState,
    error: Option<String>,
    /// Negotiated sample rate; the WAV header uses this, not the request.
    sample_rate: u32,
    blocks: u64,
    bytes_written: u64,
}

impl SharedCaptureState {
    fn new(sample_rate: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureStateInner {
                state: CaptureState::Idle,
                error: None,
                sample_rate,
                blocks: 0,
                bytes_written: 0,
            })),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().unwrap().state
    }

    pub fn error(&self) -> Option<String> {
        self.inner.lock().unwrap().error.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.lock().unwrap().sample_rate
    }

    pub fn bytes_written(&self) -> u64 {
        self.inner.lock().unwrap().bytes_written
    }

    pub fn blocks(&self) -> u64 {
        self.inner.lock().unwrap().blocks
    }

    fn set_state(&self, state: CaptureState) {
        self.inner.lock().unwrap().state = state;
    }

    fn set_error(&self, error: String) {
        let mut inner = self.inner.lock().unwrap();
        inner.error = Some(error);
        inner.state = CaptureState::Error;
    }

    fn set_sample_rate(&self, rate: u32) {
        if rate > 0 {
            self.inner.lock().unwrap().sample_rate = rate;
        }
    }

    fn add_block(&self, bytes: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.blocks += 1;
        inner.bytes_written += bytes;
    }
}

/// What a finished capture produced: the raw PCM file and the rate it was
/// actually recorded at.
#[derive(Debug, Clone)]
pub struct CaptureSummary {
    pub pcm_path: PathBuf,
    pub sample_rate: u32,
    pub bytes_written: u64,
    pub blocks: u64,
}

/// Audio capture manager using PipeWire
pub struct AudioCapture {
    config: CaptureConfig,
    state: SharedCaptureState,
    is_running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    sender: Option<pw::channel::Sender<CaptureCommand>>,
    pcm_path: Option<PathBuf>,
}

enum CaptureCommand {
    Stop,
}

impl AudioCapture {
    pub fn new(config: CaptureConfig) -> Self {
        let state = SharedCaptureState::new(config.sample_rate);
        Self {
            config,
            state,
            is_running: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            sender: None,
            pcm_path: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> CaptureState {
        self.state.state()
    }

    /// Start capturing into `pcm_path`, emitting one `LevelEvent` per block
    /// on `events`.
    pub fn start(&mut self, pcm_path: PathBuf, events: Sender<LevelEvent>) -> Result<(), String> {
        if self.is_running.load(Ordering::SeqCst) {
            return Err("Capture already running".to_string());
        }

        let file = File::create(&pcm_path)
            .map_err(|e| format!("Failed to create PCM file {}: {}", pcm_path.display(), e))?;
        let writer = Arc::new(Mutex::new(BufWriter::new(file)));

        self.state = SharedCaptureState::new(self.config.sample_rate);
        self.state.set_state(CaptureState::Capturing);
        self.is_running.store(true, Ordering::SeqCst);
        self.pcm_path = Some(pcm_path);

        let config = self.config.clone();
        let state = self.state.clone();
        let is_running = self.is_running.clone();

        // Create channel for stopping the loop
        let (sender, receiver) = pw::channel::channel::<CaptureCommand>();
        self.sender = Some(sender);

        let handle = thread::spawn(move || {
            if let Err(e) = run_capture_loop(config, state.clone(), writer, events, receiver) {
                state.set_error(e);
            }
            is_running.store(false, Ordering::SeqCst);
        });

        self.thread_handle = Some(handle);
        Ok(())
    }

    /// Stop capturing. The in-flight block finishes before the loop exits.
    pub fn stop(&mut self) -> Result<CaptureSummary, String> {
        if self.thread_handle.is_none() {
            return Err("Capture not running".to_string());
        }

        // Send stop command
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(CaptureCommand::Stop);
        }

        // Wait for thread to finish
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }

        self.is_running.store(false, Ordering::SeqCst);

        if let Some(error) = self.state.error() {
            return Err(error);
        }
        self.state.set_state(CaptureState::Idle);

        let pcm_path = self
            .pcm_path
            .take()
            .ok_or_else(|| "Capture produced no PCM file".to_string())?;
        Ok(CaptureSummary {
            pcm_path,
            sample_rate: self.state.sample_rate(),
            bytes_written: self.state.bytes_written(),
            blocks: self.state.blocks(),
        })
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        if self.is_running.load(Ordering::SeqCst) {
            let _ = self.stop();
        }
    }
}

/// Run the PipeWire capture loop in a background thread
fn run_capture_loop(
    config: CaptureConfig,
    state: SharedCaptureState,
    writer: Arc<Mutex<BufWriter<File>>>,
    events: Sender<LevelEvent>,
    receiver: pw::channel::Receiver<CaptureCommand>,
) -> Result<(), String> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| format!("Failed to create PipeWire main loop: {}", e))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| format!("Failed to create PipeWire context: {}", e))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| format!("Failed to connect to PipeWire: {}", e))?;

    // Set up channel receiver to stop the loop
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        CaptureCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    // User data for the stream callbacks
    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        state: SharedCaptureState,
        analyzer: LevelAnalyzer,
        writer: Arc<Mutex<BufWriter<File>>>,
        events: Sender<LevelEvent>,
        started: Instant,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    let user_data = UserData {
        format: Default::default(),
        state: state.clone(),
        analyzer: LevelAnalyzer::new(config.analyzer),
        writer: writer.clone(),
        events,
        started: Instant::now(),
        mainloop_weak: mainloop.downgrade(),
    };

    // Create capture stream
    let props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Production",
        *pw::keys::APP_NAME => "AcousticGuard Monitor",
    };

    let stream = pw::stream::StreamBox::new(&core, "acousticguard-capture", props)
        .map_err(|e| format!("Failed to create PipeWire stream: {}", e))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }

            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };

            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }

            if user_data.format.parse(param).is_ok() {
                user_data.state.set_sample_rate(user_data.format.rate());
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let n_samples = data.chunk().size() as usize / std::mem::size_of::<i16>();

            let Some(raw) = data.data() else {
                return;
            };

            // Take channel 0 of each frame as the mono block.
            let mut block = Vec::with_capacity(n_samples / n_channels);
            for i in (0..n_samples).step_by(n_channels) {
                let start = i * 2;
                let end = start + 2;
                if end <= raw.len() {
                    block.push(i16::from_le_bytes([raw[start], raw[start + 1]]));
                }
            }
            if block.is_empty() {
                return;
            }

            // Append PCM bytes first; a slow disk backpressures capture
            // rather than dropping the block.
            {
                let mut writer = user_data.writer.lock().unwrap();
                for &sample in &block {
                    if let Err(e) = writer.write_all(&sample.to_le_bytes()) {
                        user_data.state.set_error(format!("PCM write failed: {}", e));
                        if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                            mainloop.quit();
                        }
                        return;
                    }
                }
            }
            user_data.state.add_block(block.len() as u64 * 2);

            let reading = user_data.analyzer.analyze(&block);
            let event = LevelEvent {
                amplitude: reading.amplitude,
                db: reading.db,
                elapsed_ms: user_data.started.elapsed().as_millis() as u64,
            };
            if user_data.events.send(event).is_err() {
                // Consumer went away; nothing left to monitor.
                if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                    mainloop.quit();
                }
            }
        })
        .register()
        .map_err(|e| format!("Failed to register stream listener: {}", e))?;

    // Request S16LE mono at the configured rate
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::S16LE);
    audio_info.set_rate(config.sample_rate);
    audio_info.set_channels(config.channels);

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| format!("Failed to serialize audio format: {:?}", e))?
    .0
    .into_inner();

    let mut params = [Pod::from_bytes(&values).unwrap()];

    // Connect the stream
    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT
                | pw::stream::StreamFlags::MAP_BUFFERS
                | pw::stream::StreamFlags::RT_PROCESS,
            &mut params,
        )
        .map_err(|e| format!("Failed to connect stream: {}", e))?;

    // Run until stopped
    mainloop.run();

    writer
        .lock()
        .unwrap()
        .flush()
        .map_err(|e| format!("Failed to flush PCM file: {}", e))?;

    Ok(())
}
