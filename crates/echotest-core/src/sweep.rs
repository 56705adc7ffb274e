//! Volume sweep state machine
//!
//! Runs one echo trial per configured output volume, strictly in order:
//!
//! ```text
//! Idle -> CapturingBaseline -> { SetVolume -> Settle -> Probe -> Record -> Compute -> Report } x N
//!      -> Restoring -> Done
//! ```
//!
//! The output volume found before the sweep is held by a [`VolumeOverride`] and
//! written back exactly once on every exit path: normal completion, an error
//! from any trial, a panic, or the sweep future being dropped.

use crate::audio::analyzer::{EchoAnalyzer, Metrics};
use crate::audio::buffer::AudioBuffer;
use crate::audio::engine::{DeviceError, PlaybackRecorder};
use crate::device::{DeviceInfoProvider, VolumeController, VolumeError};
use crate::report::{ReportError, ResultSink};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

/// Wait after a volume change before probing devices
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// Wait after each trial before the next one starts
pub const DEFAULT_INTER_TRIAL: Duration = Duration::from_millis(1500);

/// Errors that end a sweep
#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Sample rate mismatch: reference is {actual} Hz, expected {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("No volume levels configured")]
    NoLevels,

    #[error("Volume level {0}% is out of range (0-100)")]
    InvalidLevel(u8),

    #[error("Trial duration must be non-zero")]
    InvalidDuration,

    #[error("Failed to set volume to {level}%: {source}")]
    SetVolume { level: u8, source: VolumeError },

    #[error("Playback/record failed at {level}%: {source}")]
    Device { level: u8, source: DeviceError },

    #[error("Reporting failed at {level}%: {source}")]
    Report { level: u8, source: ReportError },

    #[error("Failed to restore original volume: {0}")]
    Restore(VolumeError),

    #[error("Blocking worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Run a blocking collaborator call (subprocess, device query) on the blocking pool
async fn blocking<T, F>(f: F) -> Result<T, SweepError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(f).await?)
}

/// Sweep parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SweepConfig {
    /// Output volumes to visit, in order
    pub levels: Vec<u8>,
    /// Length of each playback/record trial
    pub duration: Duration,
    /// Sample rate the reference signal must have
    pub sample_rate: u32,
    /// Wait after setting the volume
    pub settle: Duration,
    /// Wait after each trial
    pub inter_trial: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            levels: crate::DEFAULT_VOLUME_LEVELS.to_vec(),
            duration: Duration::from_secs(crate::DEFAULT_DURATION_SECS as u64),
            sample_rate: crate::DEFAULT_SAMPLE_RATE,
            settle: DEFAULT_SETTLE,
            inter_trial: DEFAULT_INTER_TRIAL,
        }
    }
}

impl SweepConfig {
    /// Check the configuration before anything touches the device
    pub fn validate(&self) -> Result<(), SweepError> {
        if self.levels.is_empty() {
            return Err(SweepError::NoLevels);
        }
        if let Some(&level) = self.levels.iter().find(|&&l| l > 100) {
            return Err(SweepError::InvalidLevel(level));
        }
        if self.duration.is_zero() {
            return Err(SweepError::InvalidDuration);
        }
        Ok(())
    }
}

/// Sweep state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    CapturingBaseline,
    SetVolume(u8),
    Settle(u8),
    Probe(u8),
    Record(u8),
    Compute(u8),
    Report(u8),
    Restoring,
    Done,
}

/// Result of one trial
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub metrics: Metrics,
    /// Whether the webhook accepted the result
    pub delivered: bool,
}

/// Result of a completed sweep
#[derive(Debug, Clone)]
pub struct SweepReport {
    /// Volume found before the sweep, and restored after it
    pub original_volume: u8,
    pub trials: Vec<TrialOutcome>,
}

/// Scoped override of the output volume
///
/// Captures the current volume on creation and writes it back when
/// [`restore`](Self::restore) is called or, failing that, when dropped.
///
/// Every write holds `writes`, so a restore issued while a [`set`](Self::set)
/// is still running on the blocking pool lands after it.
pub struct VolumeOverride {
    controller: Arc<dyn VolumeController>,
    writes: Arc<Mutex<()>>,
    original: u8,
    restored: bool,
}

impl VolumeOverride {
    /// Capture the current volume, falling back to 50% if it cannot be read
    pub fn capture(controller: Arc<dyn VolumeController>) -> Self {
        let original = match controller.get() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback = crate::FALLBACK_VOLUME,
                    "Failed to read current volume, assuming fallback"
                );
                crate::FALLBACK_VOLUME
            }
        };
        tracing::info!(original, "Captured original volume");
        Self {
            controller,
            writes: Arc::new(Mutex::new(())),
            original,
            restored: false,
        }
    }

    pub fn original(&self) -> u8 {
        self.original
    }

    /// Set the output volume for the duration of the override
    pub async fn set(&self, percent: u8) -> Result<(), SweepError> {
        tracing::info!(percent, "Setting output volume");
        let controller = Arc::clone(&self.controller);
        let writes = Arc::clone(&self.writes);
        blocking(move || {
            let _write = writes.lock().unwrap_or_else(|e| e.into_inner());
            controller.set(percent)
        })
        .await?
        .map_err(|source| SweepError::SetVolume {
            level: percent,
            source,
        })
    }

    /// Write the original volume back and consume the override
    pub fn restore(mut self) -> Result<(), VolumeError> {
        self.restored = true;
        self.write_back()
    }

    fn write_back(&self) -> Result<(), VolumeError> {
        tracing::info!(original = self.original, "Restoring original volume");
        let _write = self.writes.lock().unwrap_or_else(|e| e.into_inner());
        self.controller.set(self.original)
    }
}

impl Drop for VolumeOverride {
    fn drop(&mut self) {
        if !self.restored {
            self.restored = true;
            if let Err(e) = self.write_back() {
                tracing::error!(error = %e, "Failed to restore original volume");
            }
        }
    }
}

/// Volume sweep over a set of collaborators
pub struct Sweep {
    config: SweepConfig,
    volume: Arc<dyn VolumeController>,
    devices: Arc<dyn DeviceInfoProvider>,
    recorder: Arc<dyn PlaybackRecorder>,
    sink: Arc<dyn ResultSink>,
    analyzer: EchoAnalyzer,
    state: SweepState,
    history: Vec<SweepState>,
}

impl Sweep {
    pub fn new(
        config: SweepConfig,
        volume: Arc<dyn VolumeController>,
        devices: Arc<dyn DeviceInfoProvider>,
        recorder: Arc<dyn PlaybackRecorder>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        let analyzer = EchoAnalyzer::new(config.sample_rate);
        Self {
            config,
            volume,
            devices,
            recorder,
            sink,
            analyzer,
            state: SweepState::Idle,
            history: vec![SweepState::Idle],
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> SweepState {
        self.state
    }

    /// Every state entered so far, in order
    pub fn history(&self) -> &[SweepState] {
        &self.history
    }

    fn transition(&mut self, next: SweepState) {
        tracing::debug!(from = ?self.state, to = ?next, "Sweep transition");
        self.state = next;
        self.history.push(next);
    }

    /// Run the full sweep against `reference`
    ///
    /// Fails before any volume change if the reference sample rate differs from
    /// the configured rate or the configuration is invalid. Once the original
    /// volume has been captured it is restored regardless of outcome.
    pub async fn run(&mut self, reference: &AudioBuffer) -> Result<SweepReport, SweepError> {
        if reference.sample_rate() != self.config.sample_rate {
            return Err(SweepError::SampleRateMismatch {
                expected: self.config.sample_rate,
                actual: reference.sample_rate(),
            });
        }
        self.config.validate()?;

        self.transition(SweepState::CapturingBaseline);
        let guard = VolumeOverride::capture(Arc::clone(&self.volume));
        let original_volume = guard.original();

        let result = self.run_levels(&guard, reference).await;

        self.transition(SweepState::Restoring);
        let restored = guard.restore();
        self.transition(SweepState::Done);

        match (result, restored) {
            (Ok(trials), Ok(())) => Ok(SweepReport {
                original_volume,
                trials,
            }),
            (Ok(_), Err(e)) => Err(SweepError::Restore(e)),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(restore_err)) => {
                tracing::error!(error = %restore_err, "Failed to restore original volume");
                Err(e)
            }
        }
    }

    async fn run_levels(
        &mut self,
        guard: &VolumeOverride,
        reference: &AudioBuffer,
    ) -> Result<Vec<TrialOutcome>, SweepError> {
        let levels = self.config.levels.clone();
        let mut trials = Vec::with_capacity(levels.len());

        for level in levels {
            self.transition(SweepState::SetVolume(level));
            guard.set(level).await?;

            self.transition(SweepState::Settle(level));
            tokio::time::sleep(self.config.settle).await;

            self.transition(SweepState::Probe(level));
            let provider = Arc::clone(&self.devices);
            let devices = blocking(move || provider.current()).await?;

            self.transition(SweepState::Record(level));
            let recorded = self
                .recorder
                .play_and_record(reference, self.config.duration)
                .await
                .map_err(|source| SweepError::Device { level, source })?;

            self.transition(SweepState::Compute(level));
            let playback = reference.head(recorded.len());
            let metrics = self.analyzer.analyze(playback, &recorded, &devices, level);
            tracing::info!(
                volume = level,
                erl_db = metrics.erl_db,
                erle_db = metrics.erle_db,
                tclw_db = metrics.tclw_db,
                tail_s = metrics.echo_tail_length_s,
                latency_s = metrics.latency_s,
                output = %metrics.output_device,
                input = %metrics.input_device,
                "Trial finished"
            );

            self.transition(SweepState::Report(level));
            let delivered = self
                .sink
                .report(&metrics)
                .await
                .map_err(|source| SweepError::Report { level, source })?;
            if !delivered {
                tracing::warn!(volume = level, "Result was not delivered to the webhook");
            }
            trials.push(TrialOutcome { metrics, delivered });

            tracing::info!(delay = ?self.config.inter_trial, "Waiting before next trial");
            tokio::time::sleep(self.config.inter_trial).await;
        }

        Ok(trials)
    }
}
