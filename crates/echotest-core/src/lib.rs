//! Echotest Core - Playback/record engine, echo metrics, volume sweep and reporting
//!
//! This library measures acoustic echo-cancellation performance of an output/input
//! device pair. A known reference signal is played while the loopback is recorded,
//! echo metrics are derived from the pair, and each trial is persisted locally and
//! delivered to a webhook. The sweep repeats this across several output volumes and
//! always restores the original volume afterwards.

pub mod audio;
pub mod device;
pub mod report;
pub mod sweep;

pub use audio::analyzer::{EchoAnalyzer, Metrics};
pub use audio::buffer::AudioBuffer;
pub use audio::engine::{CpalPlaybackRecorder, DeviceError, PlaybackRecorder};
pub use audio::signal::{HttpWavSource, SignalError, SignalSource};
pub use device::{DeviceInfo, DeviceInfoProvider, SystemInfo, SystemInfoProvider, VolumeController};
pub use report::{ReportPipeline, ResultSink};
pub use sweep::{Sweep, SweepConfig, SweepError, SweepReport, SweepState};

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default sample rate of the reference asset (24kHz)
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

/// Default trial duration in seconds
pub const DEFAULT_DURATION_SECS: u32 = 10;

/// Default output volume levels visited by a sweep, in order
pub const DEFAULT_VOLUME_LEVELS: [u8; 3] = [75, 88, 100];

/// Volume assumed when the current output volume cannot be read
pub const FALLBACK_VOLUME: u8 = 50;
