//! Synchronized playback and loopback recording
//!
//! Provides high-level interface for:
//! - Enumerating audio devices
//! - Playing a reference slice while recording the default input
//! - Reporting the current default device names
//!
//! ## Rendezvous
//!
//! Playback and recording each run on a dedicated thread that builds and owns its
//! cpal stream (streams are not `Send`). Both threads meet at a start barrier so
//! the streams begin playing as close together as the platform allows, and each
//! reports completion through a oneshot channel. The caller awaits both channels
//! before touching the recording, so no metric is ever computed while either
//! stream is still running.

use super::buffer::AudioBuffer;
use crate::device::{DeviceInfo, DeviceInfoProvider};
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};
use std::sync::{Arc, Barrier};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Extra time allowed beyond the trial duration before a stream counts as stalled
const WATCHDOG_GRACE: Duration = Duration::from_secs(5);

/// Errors that can occur while playing or recording
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("No output device available")]
    NoOutputDevice,

    #[error("No input device available")]
    NoInputDevice,

    #[error("Failed to query device config: {0}")]
    Config(String),

    #[error("Failed to open stream: {0}")]
    StreamError(String),

    #[error("Device stalled: no completion within {0:?}")]
    Timeout(Duration),

    #[error("{0} worker exited without reporting")]
    WorkerLost(&'static str),

    #[error("Failed to spawn {0} worker: {1}")]
    Spawn(&'static str, std::io::Error),
}

/// Plays a reference slice and records the input device at the same time
#[async_trait]
pub trait PlaybackRecorder: Send + Sync {
    /// Play the first `duration` of `reference` while recording `duration` of input
    ///
    /// Resolves only once both playback and recording have stopped. The returned
    /// buffer has exactly `duration * sample_rate` samples at the reference rate.
    async fn play_and_record(
        &self,
        reference: &AudioBuffer,
        duration: Duration,
    ) -> Result<AudioBuffer, DeviceError>;
}

/// Summary of one audio device for listings
#[derive(Debug, Clone)]
pub struct DeviceListing {
    /// Device name
    pub name: String,
    /// Whether this is the default input device
    pub is_default_input: bool,
    /// Whether this is the default output device
    pub is_default_output: bool,
    /// Number of input channels
    pub input_channels: u16,
    /// Number of output channels
    pub output_channels: u16,
}

/// Playback recorder backed by the default cpal host
#[derive(Debug, Default, Clone)]
pub struct CpalPlaybackRecorder;

impl CpalPlaybackRecorder {
    pub fn new() -> Self {
        Self
    }

    /// List devices on the default host
    pub fn list_devices() -> Result<Vec<DeviceListing>, DeviceError> {
        let host = cpal::default_host();
        let default_input = host.default_input_device().and_then(|d| d.name().ok());
        let default_output = host.default_output_device().and_then(|d| d.name().ok());

        let devices = host
            .devices()
            .map_err(|e| DeviceError::Config(e.to_string()))?
            .map(|device| {
                let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
                DeviceListing {
                    is_default_input: default_input.as_deref() == Some(name.as_str()),
                    is_default_output: default_output.as_deref() == Some(name.as_str()),
                    input_channels: device
                        .default_input_config()
                        .map(|c| c.channels())
                        .unwrap_or(0),
                    output_channels: device
                        .default_output_config()
                        .map(|c| c.channels())
                        .unwrap_or(0),
                    name,
                }
            })
            .collect();

        Ok(devices)
    }
}

#[async_trait]
impl PlaybackRecorder for CpalPlaybackRecorder {
    async fn play_and_record(
        &self,
        reference: &AudioBuffer,
        duration: Duration,
    ) -> Result<AudioBuffer, DeviceError> {
        let sample_rate = reference.sample_rate();
        let frames = reference.frames_for(duration);
        let playback = reference.head(frames).to_vec();
        let watchdog = duration + WATCHDOG_GRACE;
        let start = Arc::new(Barrier::new(2));

        tokio::task::spawn_blocking(move || check_rate_support(sample_rate))
            .await
            .map_err(|_| DeviceError::WorkerLost("rate check"))??;

        tracing::info!(
            frames,
            sample_rate,
            playback_len = playback.len(),
            "Starting playback and recording"
        );

        let (play_tx, play_rx) = oneshot::channel();
        let (rec_tx, rec_rx) = oneshot::channel();

        let play_start = Arc::clone(&start);
        std::thread::Builder::new()
            .name("echo-playback".into())
            .spawn(move || {
                let _ = play_tx.send(run_playback(playback, sample_rate, &play_start, watchdog));
            })
            .map_err(|e| DeviceError::Spawn("playback", e))?;

        let rec_start = Arc::clone(&start);
        if let Err(e) = std::thread::Builder::new()
            .name("echo-record".into())
            .spawn(move || {
                let _ = rec_tx.send(run_recording(frames, sample_rate, &rec_start, watchdog));
            })
        {
            // Release the playback worker so it does not wait forever at the barrier
            start.wait();
            let _ = play_rx.await;
            return Err(DeviceError::Spawn("record", e));
        }

        let (played, recorded) = tokio::join!(play_rx, rec_rx);
        let recorded = recorded.map_err(|_| DeviceError::WorkerLost("record"))?;
        played.map_err(|_| DeviceError::WorkerLost("playback"))??;
        let samples = recorded?;

        tracing::info!(recorded = samples.len(), "Playback and recording finished");
        Ok(AudioBuffer::new(samples, sample_rate))
    }
}

/// Fail early when either default device cannot run f32 streams at `sample_rate`
fn check_rate_support(sample_rate: u32) -> Result<(), DeviceError> {
    let host = cpal::default_host();

    let output = host
        .default_output_device()
        .ok_or(DeviceError::NoOutputDevice)?;
    let channels = output
        .default_output_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?
        .channels();
    let ranges: Vec<_> = output
        .supported_output_configs()
        .map_err(|e| DeviceError::Config(e.to_string()))?
        .collect();
    ensure_rate("Output", &output.name().unwrap_or_default(), &ranges, channels, sample_rate)?;

    let input = host
        .default_input_device()
        .ok_or(DeviceError::NoInputDevice)?;
    let channels = input
        .default_input_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?
        .channels();
    let ranges: Vec<_> = input
        .supported_input_configs()
        .map_err(|e| DeviceError::Config(e.to_string()))?
        .collect();
    ensure_rate("Input", &input.name().unwrap_or_default(), &ranges, channels, sample_rate)
}

fn ensure_rate(
    direction: &str,
    device: &str,
    ranges: &[SupportedStreamConfigRange],
    channels: u16,
    sample_rate: u32,
) -> Result<(), DeviceError> {
    if supports_rate(ranges, channels, sample_rate) {
        return Ok(());
    }
    let offered: Vec<String> = ranges
        .iter()
        .filter(|r| r.channels() == channels && r.sample_format() == SampleFormat::F32)
        .map(|r| format!("{}-{} Hz", r.min_sample_rate().0, r.max_sample_rate().0))
        .collect();
    Err(DeviceError::Config(format!(
        "{} device '{}' does not support {} Hz with {} channel(s) (offers: {})",
        direction,
        device,
        sample_rate,
        channels,
        if offered.is_empty() {
            "no f32 configs".to_string()
        } else {
            offered.join(", ")
        }
    )))
}

/// Whether any f32 range with `channels` channels covers `sample_rate`
fn supports_rate(ranges: &[SupportedStreamConfigRange], channels: u16, sample_rate: u32) -> bool {
    ranges.iter().any(|r| {
        r.channels() == channels
            && r.sample_format() == SampleFormat::F32
            && r.min_sample_rate().0 <= sample_rate
            && sample_rate <= r.max_sample_rate().0
    })
}

/// Read position in the playback slice
///
/// Completion is signalled only after one full device buffer of silence has
/// followed the last sample, so dropping the stream cannot cut the tail off.
struct PlaybackCursor {
    samples: Vec<f32>,
    position: usize,
    finished: bool,
}

impl PlaybackCursor {
    fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            position: 0,
            finished: false,
        }
    }

    /// Fill one interleaved device buffer; true exactly once, when playback is complete
    fn fill(&mut self, data: &mut [f32], channels: usize) -> bool {
        let drained = self.position >= self.samples.len();
        for frame in data.chunks_mut(channels.max(1)) {
            frame.fill(self.samples.get(self.position).copied().unwrap_or(0.0));
            if self.position < self.samples.len() {
                self.position += 1;
            }
        }
        if drained && !self.finished {
            self.finished = true;
            return true;
        }
        false
    }
}

fn stream_config(channels: u16, sample_rate: u32) -> StreamConfig {
    StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    }
}

/// Play `samples` on the default output, blocking until the slice and one buffer of silence are out
fn run_playback(
    samples: Vec<f32>,
    sample_rate: u32,
    start: &Barrier,
    watchdog: Duration,
) -> Result<(), DeviceError> {
    let (done_tx, done_rx) = crossbeam_channel::bounded::<Result<(), DeviceError>>(2);
    let stream = build_output_stream(samples, sample_rate, done_tx);

    // Always meet the recorder at the barrier, even when setup failed
    start.wait();
    let stream = stream?;
    stream
        .play()
        .map_err(|e| DeviceError::StreamError(e.to_string()))?;

    let result = done_rx
        .recv_timeout(watchdog)
        .unwrap_or(Err(DeviceError::Timeout(watchdog)));
    drop(stream);
    tracing::debug!(ok = result.is_ok(), "Playback stream closed");
    result
}

fn build_output_stream(
    samples: Vec<f32>,
    sample_rate: u32,
    done_tx: crossbeam_channel::Sender<Result<(), DeviceError>>,
) -> Result<Stream, DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(DeviceError::NoOutputDevice)?;
    let default = device
        .default_output_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?;
    let channels = default.channels();
    let config = stream_config(channels, sample_rate);
    let num_channels = channels as usize;

    tracing::info!(
        device = %device.name().unwrap_or_default(),
        channels,
        sample_rate,
        "Opening output stream"
    );

    let error_tx = done_tx.clone();
    let mut cursor = PlaybackCursor::new(samples);

    device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if cursor.fill(data, num_channels) {
                    let _ = done_tx.try_send(Ok(()));
                }
            },
            move |err| {
                tracing::error!("Output stream error: {}", err);
                let _ = error_tx.try_send(Err(DeviceError::StreamError(err.to_string())));
            },
            None,
        )
        .map_err(|e| DeviceError::StreamError(e.to_string()))
}

/// Record `frames` samples of channel 0 from the default input
fn run_recording(
    frames: usize,
    sample_rate: u32,
    start: &Barrier,
    watchdog: Duration,
) -> Result<Vec<f32>, DeviceError> {
    let (done_tx, done_rx) = crossbeam_channel::bounded::<Result<Vec<f32>, DeviceError>>(2);
    let stream = build_input_stream(frames, sample_rate, done_tx);

    start.wait();
    let stream = stream?;
    if frames == 0 {
        return Ok(Vec::new());
    }
    stream
        .play()
        .map_err(|e| DeviceError::StreamError(e.to_string()))?;

    let result = done_rx
        .recv_timeout(watchdog)
        .unwrap_or(Err(DeviceError::Timeout(watchdog)));
    drop(stream);
    tracing::debug!(ok = result.is_ok(), "Input stream closed");
    result
}

fn build_input_stream(
    frames: usize,
    sample_rate: u32,
    done_tx: crossbeam_channel::Sender<Result<Vec<f32>, DeviceError>>,
) -> Result<Stream, DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(DeviceError::NoInputDevice)?;
    let default = device
        .default_input_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?;
    let channels = default.channels();
    let config = stream_config(channels, sample_rate);
    let num_channels = channels as usize;

    tracing::info!(
        device = %device.name().unwrap_or_default(),
        channels,
        sample_rate,
        "Opening input stream"
    );

    let error_tx = done_tx.clone();
    let mut captured: Vec<f32> = Vec::with_capacity(frames);
    let mut finished = false;

    device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if finished {
                    return;
                }
                let remaining = frames - captured.len();
                captured.extend(
                    data.chunks(num_channels)
                        .filter_map(|frame| frame.first().copied())
                        .take(remaining),
                );
                if captured.len() >= frames {
                    finished = true;
                    let _ = done_tx.try_send(Ok(std::mem::take(&mut captured)));
                }
            },
            move |err| {
                tracing::error!("Input stream error: {}", err);
                let _ = error_tx.try_send(Err(DeviceError::StreamError(err.to_string())));
            },
            None,
        )
        .map_err(|e| DeviceError::StreamError(e.to_string()))
}

/// Device names from the default cpal host
#[derive(Debug, Default, Clone)]
pub struct CpalDeviceInfo;

impl DeviceInfoProvider for CpalDeviceInfo {
    fn current(&self) -> DeviceInfo {
        let host = cpal::default_host();
        let fallback = DeviceInfo::default();
        DeviceInfo {
            output_device_name: host
                .default_output_device()
                .and_then(|d| d.name().ok())
                .unwrap_or(fallback.output_device_name),
            input_device_name: host
                .default_input_device()
                .and_then(|d| d.name().ok())
                .unwrap_or(fallback.input_device_name),
        }
    }
}
