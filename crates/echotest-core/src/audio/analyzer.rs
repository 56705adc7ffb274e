//! Echo metric computation
//!
//! Derives echo-return figures from a playback slice and the loopback recording
//! made while it played. The figures are simplified proxies:
//!
//! ```text
//! ERL   = 10 * log10(E_playback / E_recorded)     (100 when E_recorded == 0)
//! ERLE  = ERL + 5
//! TCLw  = max(0, 30 - ERL)
//! ```
//!
//! Latency is the position of the first recorded sample above 0.01, and the echo
//! tail is the distance from the end of the recording back to the last sample
//! above 0.001. A search that finds nothing reports 0, so a silent recording and
//! an immediate onset look the same.

use super::buffer::{energy, AudioBuffer};
use crate::device::DeviceInfo;
use chrono::{DateTime, Local};
use serde::{Serialize, Serializer};

/// ERL reported when the recording carries no energy at all
pub const ERL_SILENCE_SENTINEL_DB: f64 = 100.0;

/// Fixed offset between ERL and ERLE
pub const ERLE_OFFSET_DB: f64 = 5.0;

/// Reference level TCLw is measured down from
pub const TCLW_REFERENCE_DB: f64 = 30.0;

/// Absolute amplitude a recorded sample must exceed to count as signal onset
pub const LATENCY_THRESHOLD: f32 = 0.01;

/// Absolute amplitude a recorded sample must exceed to count as echo tail
pub const TAIL_THRESHOLD: f32 = 0.001;

/// Echo metrics for one trial at one output volume
///
/// Values are kept unrounded; serialization rounds dB figures to 2 decimals and
/// second figures to 3 decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Local>,
    #[serde(rename = "ERL_dB", serialize_with = "round2")]
    pub erl_db: f64,
    #[serde(rename = "ERLE_dB", serialize_with = "round2")]
    pub erle_db: f64,
    #[serde(rename = "TCLw_dB", serialize_with = "round2")]
    pub tclw_db: f64,
    #[serde(rename = "Echo_Tail_Length_s", serialize_with = "round3")]
    pub echo_tail_length_s: f64,
    #[serde(rename = "Latency_s", serialize_with = "round3")]
    pub latency_s: f64,
    #[serde(rename = "Output_Device")]
    pub output_device: String,
    #[serde(rename = "Input_Device")]
    pub input_device: String,
    #[serde(rename = "Volume_Percent")]
    pub volume_percent: u8,
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format("%Y-%m-%d %H:%M:%S"))
}

fn round2<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    serialize_rounded(*value, 2, s)
}

fn round3<S: Serializer>(value: &f64, s: S) -> Result<S::Ok, S::Error> {
    serialize_rounded(*value, 3, s)
}

/// JSON has no infinity or NaN, so those are written as the strings
/// `"Infinity"`, `"-Infinity"` and `"NaN"` instead of `null`
fn serialize_rounded<S: Serializer>(value: f64, decimals: i32, s: S) -> Result<S::Ok, S::Error> {
    if value.is_finite() {
        s.serialize_f64(round_to(value, decimals))
    } else if value.is_nan() {
        s.serialize_str("NaN")
    } else if value > 0.0 {
        s.serialize_str("Infinity")
    } else {
        s.serialize_str("-Infinity")
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// Echo analyzer for a fixed sample rate
#[derive(Debug, Clone)]
pub struct EchoAnalyzer {
    sample_rate: u32,
}

impl EchoAnalyzer {
    /// Create an analyzer for buffers recorded at `sample_rate` Hz
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Compute metrics stamped with the current local time
    pub fn analyze(
        &self,
        playback: &[f32],
        recorded: &AudioBuffer,
        devices: &DeviceInfo,
        volume_percent: u8,
    ) -> Metrics {
        self.analyze_at(Local::now(), playback, recorded, devices, volume_percent)
    }

    /// Compute metrics for an aligned playback/recording pair
    ///
    /// # Arguments
    /// * `playback` - Reference samples that were played; truncated to the recording length
    /// * `recorded` - Loopback recording made during playback
    /// * `devices` - Device names at the time of the trial
    /// * `volume_percent` - Output volume the trial ran at
    pub fn analyze_at(
        &self,
        timestamp: DateTime<Local>,
        playback: &[f32],
        recorded: &AudioBuffer,
        devices: &DeviceInfo,
        volume_percent: u8,
    ) -> Metrics {
        let recorded = recorded.samples();
        let playback = &playback[..playback.len().min(recorded.len())];

        let erl_db = echo_return_loss(energy(playback), energy(recorded));
        let rate = self.sample_rate as f64;

        Metrics {
            timestamp,
            erl_db,
            erle_db: erl_db + ERLE_OFFSET_DB,
            tclw_db: (TCLW_REFERENCE_DB - erl_db).max(0.0),
            echo_tail_length_s: first_above(recorded.iter().rev(), TAIL_THRESHOLD) as f64 / rate,
            latency_s: first_above(recorded.iter(), LATENCY_THRESHOLD) as f64 / rate,
            output_device: devices.output_device_name.clone(),
            input_device: devices.input_device_name.clone(),
            volume_percent,
        }
    }
}

/// ERL in dB from the two energies, or the silence sentinel
///
/// A silent playback slice against a non-silent recording gives `-inf`.
pub fn echo_return_loss(playback_energy: f64, recorded_energy: f64) -> f64 {
    if recorded_energy != 0.0 {
        10.0 * (playback_energy / recorded_energy).log10()
    } else {
        ERL_SILENCE_SENTINEL_DB
    }
}

/// Index of the first sample whose magnitude exceeds `threshold`, 0 if none does
fn first_above<'a>(samples: impl Iterator<Item = &'a f32>, threshold: f32) -> usize {
    samples
        .enumerate()
        .find(|(_, x)| x.abs() > threshold)
        .map(|(i, _)| i)
        .unwrap_or(0)
}
