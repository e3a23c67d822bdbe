//! Session persistence and discovery.
//!
//! Each session is two co-located files sharing a `REC_<epoch_ms>` base
//! name: `<base>.wav` (canonical PCM container) and `<base>.json` (waveform
//! metadata). Files are written whole to a temp name and renamed into place,
//! so a failed save never leaves a corrupt header behind. Discovery is a
//! directory scan over `.wav` files; the metadata path is derived from the
//! base name.

use crate::models::SessionInfo;
use crate::session::codec::{self, CodecError};
use crate::waveform::WaveformModel;
use chrono::Utc;
use log::warn;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub struct SessionStore {
    sessions_dir: PathBuf,
}

impl SessionStore {
    /// Store rooted at the default data directory.
    pub fn new() -> Self {
        let sessions_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("acousticguard")
            .join("sessions");
        Self { sessions_dir }
    }

    pub fn with_dir(dir: impl AsRef<Path>) -> Self {
        Self {
            sessions_dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    fn ensure_dir(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.sessions_dir)
    }

    fn info_for(&self, base_name: &str) -> SessionInfo {
        SessionInfo {
            base_name: base_name.to_string(),
            audio_path: self.sessions_dir.join(format!("{}.wav", base_name)),
            metadata_path: self.sessions_dir.join(format!("{}.json", base_name)),
        }
    }

    /// Persist a finished session. Both files are on disk before this
    /// returns, so a subsequent `list` never sees a half-written session.
    pub fn save(
        &self,
        pcm: &[u8],
        sample_rate: u32,
        model: &WaveformModel,
    ) -> Result<SessionInfo, CodecError> {
        self.ensure_dir()?;

        let mut millis = Utc::now().timestamp_millis();
        let mut info = self.info_for(&format!("REC_{}", millis));
        while info.audio_path.exists() {
            millis += 1;
            info = self.info_for(&format!("REC_{}", millis));
        }

        let wav = codec::pcm_to_wav(pcm, sample_rate)?;
        write_atomic(&info.audio_path, &wav)?;

        let json = codec::encode_metadata(model)?;
        write_atomic(&info.metadata_path, json.as_bytes())?;

        Ok(info)
    }

    /// List persisted sessions, newest first.
    pub fn list(&self) -> Result<Vec<SessionInfo>, CodecError> {
        self.ensure_dir()?;

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.sessions_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.to_string_lossy().to_lowercase() == "wav")
                    .unwrap_or(false)
            })
            .collect();

        // Sort by modification time, newest first
        paths.sort_by(|a, b| {
            let a_time = a.metadata().and_then(|m| m.modified()).ok();
            let b_time = b.metadata().and_then(|m| m.modified()).ok();
            b_time.cmp(&a_time)
        });

        Ok(paths
            .iter()
            .filter_map(|path| path.file_stem())
            .map(|stem| self.info_for(&stem.to_string_lossy()))
            .collect())
    }

    /// Look up a session by base name.
    pub fn find(&self, base_name: &str) -> Result<SessionInfo, CodecError> {
        let info = self.info_for(base_name);
        if !info.audio_path.exists() {
            return Err(CodecError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no session named {}", base_name),
            )));
        }
        Ok(info)
    }

    /// Load a session's waveform metadata. A missing or malformed metadata
    /// file degrades to an empty model so the audio stays playable.
    pub fn load_waveform(&self, info: &SessionInfo) -> WaveformModel {
        let json = match fs::read_to_string(&info.metadata_path) {
            Ok(json) => json,
            Err(e) => {
                warn!(
                    "no metadata for {} ({}); loading audio only",
                    info.base_name, e
                );
                return WaveformModel::new();
            }
        };

        match codec::decode_metadata(&json) {
            Ok(model) => model,
            Err(e) => {
                warn!(
                    "unusable metadata for {} ({}); loading audio only",
                    info.base_name, e
                );
                WaveformModel::new()
            }
        }
    }

    /// Decode a session's audio into normalized samples plus its sample rate.
    pub fn load_audio(&self, info: &SessionInfo) -> Result<(Vec<f32>, u32), CodecError> {
        let file = fs::File::open(&info.audio_path)?;
        codec::decode_wav(BufReader::new(file))
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Write the whole buffer to a temp name, then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Marker;

    fn scratch_store(name: &str) -> SessionStore {
        let dir = std::env::temp_dir()
            .join("acousticguard-tests")
            .join(format!("{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        SessionStore::with_dir(dir)
    }

    fn sample_model() -> WaveformModel {
        WaveformModel::from_parts(
            vec![0.01, 0.8, 0.02],
            vec![Marker::new(1, 70, 500)],
        )
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = scratch_store("roundtrip");
        let pcm: Vec<u8> = (0..200i16).flat_map(|s| s.to_le_bytes()).collect();
        let model = sample_model();

        let info = store.save(&pcm, 44100, &model).unwrap();
        assert!(info.audio_path.exists());
        assert!(info.metadata_path.exists());

        let loaded = store.load_waveform(&info);
        assert_eq!(loaded, model);

        let (samples, rate) = store.load_audio(&info).unwrap();
        assert_eq!(rate, 44100);
        assert_eq!(samples.len(), pcm.len() / 2);

        let listed = store.list().unwrap();
        assert!(listed.iter().any(|s| s.base_name == info.base_name));
    }

    #[test]
    fn missing_metadata_degrades_to_empty_model() {
        let store = scratch_store("no-metadata");
        let info = store.save(&[0, 0, 0, 0], 44100, &sample_model()).unwrap();
        fs::remove_file(&info.metadata_path).unwrap();

        let loaded = store.load_waveform(&info);
        assert!(loaded.is_empty());
        assert!(loaded.markers().is_empty());
        // Audio stays loadable.
        assert!(store.load_audio(&info).is_ok());
    }

    #[test]
    fn malformed_metadata_degrades_to_empty_model() {
        let store = scratch_store("bad-metadata");
        let info = store.save(&[0, 0], 44100, &sample_model()).unwrap();
        fs::write(&info.metadata_path, "{\"amplitudes\": 12}").unwrap();

        let loaded = store.load_waveform(&info);
        assert!(loaded.is_empty());
    }

    #[test]
    fn listing_ignores_other_files() {
        let store = scratch_store("listing");
        store.save(&[0, 0], 44100, &WaveformModel::new()).unwrap();
        fs::write(store.sessions_dir().join("notes.txt"), "x").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].base_name.starts_with("REC_"));
    }

    #[test]
    fn consecutive_saves_get_distinct_names() {
        let store = scratch_store("distinct");
        let a = store.save(&[0, 0], 44100, &WaveformModel::new()).unwrap();
        let b = store.save(&[0, 0], 44100, &WaveformModel::new()).unwrap();
        assert_ne!(a.base_name, b.base_name);
    }

    #[test]
    fn find_reports_missing_sessions() {
        let store = scratch_store("find");
        assert!(matches!(
            store.find("REC_0"),
            Err(CodecError::Io(_))
        ));
    }
}
