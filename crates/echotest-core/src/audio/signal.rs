//! Reference signal loading
//!
//! Downloads the reference WAV over HTTP and decodes it to mono `f32` samples.
//! Multi-channel files are down-mixed by averaging each frame; integer formats
//! are normalized to [-1.0, 1.0).

use super::buffer::AudioBuffer;
use async_trait::async_trait;
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

/// Errors while retrieving or decoding the reference signal
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Download failed with status {0}")]
    Status(u16),

    #[error("WAV decode failed: {0}")]
    Decode(#[from] hound::Error),

    #[error("Reference signal is empty")]
    Empty,
}

/// Supplies the reference buffer for a sweep
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<AudioBuffer, SignalError>;
}

/// Fetches a WAV file over HTTP
#[derive(Debug, Clone)]
pub struct HttpWavSource {
    client: reqwest::Client,
}

impl HttpWavSource {
    pub fn new() -> Result<Self, SignalError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SignalSource for HttpWavSource {
    async fn fetch(&self, url: &str) -> Result<AudioBuffer, SignalError> {
        tracing::info!(url, "Downloading reference signal");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SignalError::Status(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        let buffer = decode_wav(&bytes)?;
        tracing::info!(
            samples = buffer.len(),
            sample_rate = buffer.sample_rate(),
            "Reference signal decoded"
        );
        Ok(buffer)
    }
}

/// Decode an in-memory WAV file to a mono buffer
pub fn decode_wav(bytes: &[u8]) -> Result<AudioBuffer, SignalError> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    if interleaved.is_empty() {
        return Err(SignalError::Empty);
    }

    let mono = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(AudioBuffer::new(mono, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(spec: hound::WavSpec, write: impl FnOnce(&mut hound::WavWriter<&mut Cursor<Vec<u8>>>)) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            write(&mut writer);
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_mono_i16() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, |w| {
            for s in [0i16, 16384, -16384, i16::MIN] {
                w.write_sample(s).unwrap();
            }
        });

        let buffer = decode_wav(&bytes).unwrap();
        assert_eq!(buffer.sample_rate(), 24000);
        assert_eq!(buffer.samples(), &[0.0, 0.5, -0.5, -1.0]);
    }

    #[test]
    fn test_decode_stereo_float_downmix() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let bytes = wav_bytes(spec, |w| {
            for s in [0.5f32, 0.25, -1.0, 1.0] {
                w.write_sample(s).unwrap();
            }
        });

        let buffer = decode_wav(&bytes).unwrap();
        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(buffer.samples(), &[0.375, 0.0]);
    }

    #[test]
    fn test_decode_empty_is_error() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, |_| {});
        assert!(matches!(decode_wav(&bytes), Err(SignalError::Empty)));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        assert!(matches!(
            decode_wav(b"definitely not a wav file"),
            Err(SignalError::Decode(_))
        ));
    }
}
