//! Session encode/decode: WAV container and JSON metadata.
//!
//! The WAV side wraps raw 16-bit mono PCM in the canonical 44-byte RIFF
//! header (ChunkSize = 36 + data length, Subchunk2Size = data length, all
//! little-endian) so any standard reader can open a saved session. Encoding
//! goes through hound over an in-memory cursor, which keeps the byte layout
//! testable without touching disk. The metadata side is a two-key JSON
//! object, `amplitudes` and `markers`, decoded all-or-nothing.

use crate::models::Marker;
use crate::waveform::WaveformModel;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Cursor, Read};

/// Sample rate sessions are captured and encoded at.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

/// Canonical RIFF/WAVE header length for plain 16-bit PCM.
pub const WAV_HEADER_LEN: usize = 44;

/// Failures in the encode/decode layer. `Io` covers file and container
/// trouble; `MalformedMetadata` is specifically a JSON shape problem, which
/// the load path downgrades to an empty waveform instead of an error.
#[derive(Debug)]
pub enum CodecError {
    Io(std::io::Error),
    MalformedMetadata(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Io(e) => write!(f, "i/o error: {}", e),
            CodecError::MalformedMetadata(msg) => write!(f, "malformed metadata: {}", msg),
        }
    }
}

impl std::error::Error for CodecError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CodecError::Io(e) => Some(e),
            CodecError::MalformedMetadata(_) => None,
        }
    }
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        CodecError::Io(e)
    }
}

impl From<hound::Error> for CodecError {
    fn from(e: hound::Error) -> Self {
        match e {
            hound::Error::IoError(io) => CodecError::Io(io),
            other => CodecError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                other.to_string(),
            )),
        }
    }
}

/// Wrap raw little-endian 16-bit mono PCM bytes in a WAV container.
///
/// The payload is copied verbatim after the header, whatever its length;
/// the header's chunk sizes always describe the full byte count, including
/// a trailing odd byte.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>, CodecError> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    // hound emits the canonical header for an empty payload; splice in the
    // real byte count and append the payload verbatim.
    let mut cursor = Cursor::new(Vec::with_capacity(WAV_HEADER_LEN + pcm.len()));
    WavWriter::new(&mut cursor, spec)?.finalize()?;

    let mut wav = cursor.into_inner();
    wav[4..8].copy_from_slice(&(36 + pcm.len() as u32).to_le_bytes());
    wav[40..44].copy_from_slice(&(pcm.len() as u32).to_le_bytes());
    wav.extend_from_slice(pcm);
    Ok(wav)
}

/// Decode WAV audio into normalized f32 samples plus the container's sample
/// rate. Integer samples are scaled by 2^(bits-1); float WAVs pass through.
pub fn decode_wav<R: Read>(reader: R) -> Result<(Vec<f32>, u32), CodecError> {
    let reader = WavReader::new(reader)?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;

    let samples: Result<Vec<f32>, hound::Error> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect(),
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect()
        }
    };

    Ok((samples?, sample_rate))
}

/// On-disk metadata shape: `{"amplitudes": [...], "markers": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
struct SessionMetadata {
    amplitudes: Vec<f32>,
    markers: Vec<Marker>,
}

/// Serialize a waveform model to the metadata JSON, preserving array order.
pub fn encode_metadata(model: &WaveformModel) -> Result<String, CodecError> {
    let metadata = SessionMetadata {
        amplitudes: model.amplitudes().to_vec(),
        markers: model.markers().to_vec(),
    };
    serde_json::to_string(&metadata).map_err(|e| CodecError::MalformedMetadata(e.to_string()))
}

/// Parse metadata JSON into a fresh model. All-or-nothing: a missing key or
/// wrong-shaped element fails without producing a partial model.
pub fn decode_metadata(json: &str) -> Result<WaveformModel, CodecError> {
    let metadata: SessionMetadata =
        serde_json::from_str(json).map_err(|e| CodecError::MalformedMetadata(e.to_string()))?;
    Ok(WaveformModel::from_parts(
        metadata.amplitudes,
        metadata.markers,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ])
    }

    #[test]
    fn wav_header_matches_canonical_layout() {
        let pcm: Vec<u8> = (0u8..16).collect();
        let wav = pcm_to_wav(&pcm, DEFAULT_SAMPLE_RATE).unwrap();

        assert_eq!(wav.len(), WAV_HEADER_LEN + pcm.len());
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4), 36 + pcm.len() as u32);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(&wav[12..16], b"fmt ");
        assert_eq!(u32_at(&wav, 16), 16); // Subchunk1Size
        assert_eq!(u16_at(&wav, 20), 1); // AudioFormat = PCM
        assert_eq!(u16_at(&wav, 22), 1); // NumChannels
        assert_eq!(u32_at(&wav, 24), 44100);
        assert_eq!(u32_at(&wav, 28), 44100 * 2); // ByteRate
        assert_eq!(u16_at(&wav, 32), 2); // BlockAlign
        assert_eq!(u16_at(&wav, 34), 16); // BitsPerSample
        assert_eq!(&wav[36..40], b"data");
        assert_eq!(u32_at(&wav, 40), pcm.len() as u32);
    }

    #[test]
    fn stripping_header_recovers_payload() {
        let pcm: Vec<u8> = (0..2048u32).flat_map(|i| (i as i16).to_le_bytes()).collect();
        let wav = pcm_to_wav(&pcm, DEFAULT_SAMPLE_RATE).unwrap();
        assert_eq!(&wav[WAV_HEADER_LEN..], &pcm[..]);
    }

    #[test]
    fn odd_length_payload_round_trips_verbatim() {
        let pcm = [1u8, 2, 3];
        let wav = pcm_to_wav(&pcm, DEFAULT_SAMPLE_RATE).unwrap();
        assert_eq!(u32_at(&wav, 4), 36 + 3);
        assert_eq!(u32_at(&wav, 40), 3);
        assert_eq!(&wav[WAV_HEADER_LEN..], &pcm);
    }

    #[test]
    fn empty_payload_still_gets_full_header() {
        let wav = pcm_to_wav(&[], 22050).unwrap();
        assert_eq!(wav.len(), WAV_HEADER_LEN);
        assert_eq!(u32_at(&wav, 4), 36);
        assert_eq!(u32_at(&wav, 24), 22050);
        assert_eq!(u32_at(&wav, 40), 0);
    }

    #[test]
    fn decode_wav_normalizes_int_samples() {
        let samples = [0i16, 16384, -16384, i16::MAX];
        let pcm: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let wav = pcm_to_wav(&pcm, DEFAULT_SAMPLE_RATE).unwrap();

        let (decoded, rate) = decode_wav(Cursor::new(wav)).unwrap();
        assert_eq!(rate, DEFAULT_SAMPLE_RATE);
        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded[0], 0.0);
        assert_eq!(decoded[1], 0.5);
        assert_eq!(decoded[2], -0.5);
        assert!((decoded[3] - 32767.0 / 32768.0).abs() < 1e-7);
    }

    #[test]
    fn metadata_round_trips_exactly() {
        let model = WaveformModel::from_parts(
            vec![0.0, 0.125, 0.7071067, 0.0305175],
            vec![Marker::new(1, 72, 480), Marker::new(3, 68, 1440)],
        );

        let json = encode_metadata(&model).unwrap();
        let decoded = decode_metadata(&json).unwrap();

        assert_eq!(decoded.amplitudes(), model.amplitudes());
        assert_eq!(decoded.markers(), model.markers());
    }

    #[test]
    fn metadata_keys_appear_in_wire_format() {
        let mut model = WaveformModel::new();
        model.push_amplitude(0.25);
        let json = encode_metadata(&model).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("amplitudes").is_some());
        assert!(value.get("markers").is_some());
    }

    #[test]
    fn marker_serializes_with_ts_field() {
        let json = serde_json::to_string(&Marker::new(4, 71, 2500)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["index"], 4);
        assert_eq!(value["db"], 71);
        assert_eq!(value["ts"], 2500);
    }

    #[test]
    fn missing_keys_are_malformed() {
        for json in [
            "{}",
            r#"{"amplitudes": []}"#,
            r#"{"markers": []}"#,
            r#"{"amplitudes": [0.1], "markers": [{"index": 0}]}"#,
            "not json at all",
        ] {
            match decode_metadata(json) {
                Err(CodecError::MalformedMetadata(_)) => {}
                other => panic!("expected MalformedMetadata for {:?}, got {:?}", json, other),
            }
        }
    }

    #[test]
    fn decode_wav_rejects_garbage() {
        let result = decode_wav(Cursor::new(vec![0u8; 16]));
        assert!(matches!(result, Err(CodecError::Io(_))));
    }
}
