//! E2E tests for echo metric computation
//!
//! Drives the analyzer with synthetic playback/loopback pairs and checks the
//! fixed relationships between ERL, ERLE and TCLw, plus the onset and tail scans.

use approx::assert_relative_eq;
use echotest::audio::analyzer::{echo_return_loss, ERL_SILENCE_SENTINEL_DB};
use echotest::device::DeviceInfo;
use echotest::{AudioBuffer, EchoAnalyzer};

const RATE: u32 = 24000;

fn devices() -> DeviceInfo {
    DeviceInfo {
        output_device_name: "USB Speakerphone".to_string(),
        input_device_name: "USB Speakerphone".to_string(),
    }
}

/// Sine tone used as the reference signal
fn tone(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 1000.0 * i as f32 / RATE as f32).sin())
        .collect()
}

/// Loopback: `delay` samples of silence, then the reference at `gain`
fn loopback(reference: &[f32], delay: usize, gain: f32) -> AudioBuffer {
    let mut samples = vec![0.0f32; delay];
    samples.extend(reference.iter().map(|x| x * gain));
    samples.truncate(reference.len());
    AudioBuffer::new(samples, RATE)
}

#[test]
fn test_documented_example() {
    // playback_energy = 10.0, recorded_energy = 0.1
    assert_relative_eq!(echo_return_loss(10.0, 0.1), 20.0, epsilon = 1e-9);
}

#[test]
fn test_all_zero_recording() {
    let analyzer = EchoAnalyzer::new(RATE);
    let reference = tone(RATE as usize);
    let recorded = AudioBuffer::silence(reference.len(), RATE);

    let m = analyzer.analyze(&reference, &recorded, &devices(), 100);

    assert_eq!(m.erl_db, ERL_SILENCE_SENTINEL_DB);
    assert_eq!(m.erle_db, 105.0);
    assert_eq!(m.tclw_db, 0.0);
}

#[test]
fn test_relationships_hold_across_gains() {
    let analyzer = EchoAnalyzer::new(RATE);
    let reference = tone(RATE as usize / 2);

    for gain in [0.0001f32, 0.003, 0.03, 0.1, 0.5, 1.0, 2.0] {
        let recorded = loopback(&reference, 0, gain);
        let m = analyzer.analyze(&reference, &recorded, &devices(), 75);

        assert_eq!(m.erle_db, m.erl_db + 5.0, "gain {}", gain);
        assert_eq!(m.tclw_db, (30.0 - m.erl_db).max(0.0), "gain {}", gain);
        assert!(m.tclw_db >= 0.0, "gain {}", gain);
        assert_relative_eq!(m.erl_db, -20.0 * (gain as f64).log10(), epsilon = 1e-3);
    }
}

#[test]
fn test_loud_echo_has_positive_tclw() {
    let analyzer = EchoAnalyzer::new(RATE);
    let reference = tone(RATE as usize);

    // gain 0.1 -> ERL 20 dB -> TCLw 10 dB
    let m = analyzer.analyze(&reference, &loopback(&reference, 0, 0.1), &devices(), 88);
    assert_relative_eq!(m.erl_db, 20.0, epsilon = 1e-3);
    assert_relative_eq!(m.erle_db, 25.0, epsilon = 1e-3);
    assert_relative_eq!(m.tclw_db, 10.0, epsilon = 1e-3);
}

#[test]
fn test_latency_from_delayed_loopback() {
    let analyzer = EchoAnalyzer::new(RATE);
    let reference = tone(RATE as usize);
    // 240 samples = 10ms at 24kHz
    let recorded = loopback(&reference, 240, 0.5);

    let m = analyzer.analyze(&reference, &recorded, &devices(), 75);

    // First sample of the tone above 0.01 after the gap lands shortly after 10ms
    assert!(m.latency_s >= 0.010, "latency {}", m.latency_s);
    assert!(m.latency_s < 0.011, "latency {}", m.latency_s);
}

#[test]
fn test_tail_counts_trailing_quiet_samples() {
    let analyzer = EchoAnalyzer::new(RATE);
    let mut samples = tone(RATE as usize);
    // Last half second is silent
    let quiet = RATE as usize / 2;
    let len = samples.len();
    for s in &mut samples[len - quiet..] {
        *s = 0.0;
    }
    let recorded = AudioBuffer::new(samples.clone(), RATE);

    let m = analyzer.analyze(&samples, &recorded, &devices(), 75);

    // Walking back from the end, the first loud sample sits just before the silent block
    assert!(m.echo_tail_length_s >= 0.5, "tail {}", m.echo_tail_length_s);
    assert!(m.echo_tail_length_s < 0.51, "tail {}", m.echo_tail_length_s);
}

#[test]
fn test_inputs_not_mutated() {
    let analyzer = EchoAnalyzer::new(RATE);
    let reference = tone(1000);
    let recorded = loopback(&reference, 10, 0.2);
    let before = (reference.clone(), recorded.clone());

    let first = analyzer.analyze(&reference, &recorded, &devices(), 75);
    let second = analyzer.analyze_at(first.timestamp, &reference, &recorded, &devices(), 75);

    assert_eq!(before, (reference, recorded));
    assert_eq!(first, second);
}
