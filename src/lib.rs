//! Echotest - acoustic echo-cancellation test across output volume levels
//!
//! This library re-exports the playback/record engine, echo metrics, volume sweep
//! and reporting from `echotest-core`, and adds the pieces that only make sense
//! for the command line tool: persistent configuration and the platform volume
//! and host-metadata backends.

pub mod config;
pub mod platform;

pub use echotest_core::{audio, device, report, sweep};

pub use echotest_core::{
    AudioBuffer, CpalPlaybackRecorder, EchoAnalyzer, HttpWavSource, Metrics, ReportPipeline,
    Sweep, SweepConfig, SweepError, SweepReport, SweepState,
};
pub use echotest_core::{DEFAULT_DURATION_SECS, DEFAULT_SAMPLE_RATE, DEFAULT_VOLUME_LEVELS, VERSION};
