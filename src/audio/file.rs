use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, info, warn};

use crate::error::AudioError;

/// Decoded audio, one sample vector per channel
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Number of samples per channel
    pub fn frame_count(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Turns compressed audio bytes into per-channel float samples
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, AudioError>;

    /// Get decoder name for logging
    fn name(&self) -> &str;
}

/// Multi-format decoder backed by symphonia (WAV, MP3, FLAC, OGG, M4A, ...)
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecoder {
    extension_hint: Option<String>,
}

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that tells the prober which container to expect
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension_hint: Some(extension.into()),
        }
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedAudio, AudioError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = &self.extension_hint {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::Decode(format!("unrecognized audio container: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Decode("no audio track found".to_string()))?;

        let track_id = track.id;
        let mut sample_rate = track.codec_params.sample_rate;
        let declared_channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Decode(format!("unsupported codec: {}", e)))?;

        let mut channels: Vec<Vec<f32>> = vec![Vec::new(); declared_channels];

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(AudioError::Decode(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable audio packet: {}", e);
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            let count = spec.channels.count();
            if count == 0 {
                continue;
            }

            if channels.len() != count {
                if channels.iter().any(|c| !c.is_empty()) {
                    return Err(AudioError::Decode(
                        "channel layout changed mid-stream".to_string(),
                    ));
                }
                channels = vec![Vec::new(); count];
            }
            sample_rate.get_or_insert(spec.rate);

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            // De-interleave samples into channels
            for frame in sample_buf.samples().chunks_exact(count) {
                for (ch, sample) in frame.iter().enumerate() {
                    channels[ch].push(*sample);
                }
            }
        }

        let sample_rate = sample_rate
            .ok_or_else(|| AudioError::Decode("stream does not report a sample rate".to_string()))?;

        if channels.is_empty() {
            channels.push(Vec::new());
        }

        debug!(
            "Decoded {} channel(s) at {}Hz, {} frames",
            channels.len(),
            sample_rate,
            channels[0].len()
        );

        Ok(DecodedAudio {
            sample_rate,
            channels,
        })
    }

    fn name(&self) -> &str {
        "symphonia"
    }
}

/// An audio file loaded from disk and decoded
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub audio: DecodedAudio,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AudioError> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let bytes = std::fs::read(path)?;

        let decoder = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => SymphoniaDecoder::with_extension(ext),
            None => SymphoniaDecoder::new(),
        };
        let audio = decoder.decode(&bytes)?;

        let duration_seconds = audio.duration_seconds();
        let channels = audio.channels.len() as u16;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} frames",
            duration_seconds,
            audio.sample_rate,
            channels,
            audio.frame_count()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: audio.sample_rate,
            channels,
            audio,
        })
    }
}
