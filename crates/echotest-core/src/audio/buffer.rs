//! Mono sample buffer with its sample rate

use std::time::Duration;

/// Ordered mono samples at a fixed sample rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from samples and a sample rate in Hz
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// A buffer of `len` zero samples
    pub fn silence(len: usize, sample_rate: u32) -> Self {
        Self::new(vec![0.0; len], sample_rate)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    /// Number of samples covering `duration` at this buffer's rate
    pub fn frames_for(&self, duration: Duration) -> usize {
        frames_for(duration, self.sample_rate)
    }

    /// The first `len` samples (or all of them if the buffer is shorter)
    pub fn head(&self, len: usize) -> &[f32] {
        &self.samples[..len.min(self.samples.len())]
    }

    /// Sum of squared samples
    pub fn energy(&self) -> f64 {
        energy(&self.samples)
    }
}

/// Number of samples covering `duration` at `sample_rate`
pub fn frames_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_secs_f64() * sample_rate as f64) as usize
}

/// Sum of squared samples, accumulated in f64
pub fn energy(samples: &[f32]) -> f64 {
    samples.iter().map(|&x| (x as f64) * (x as f64)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_for_duration() {
        let buffer = AudioBuffer::silence(10, 24000);
        assert_eq!(buffer.frames_for(Duration::from_secs(10)), 240_000);
        assert_eq!(buffer.frames_for(Duration::from_millis(500)), 12_000);
    }

    #[test]
    fn test_head_clamps_to_length() {
        let buffer = AudioBuffer::new(vec![0.1, 0.2, 0.3], 8000);
        assert_eq!(buffer.head(2), &[0.1, 0.2]);
        assert_eq!(buffer.head(10).len(), 3);
    }

    #[test]
    fn test_energy() {
        let buffer = AudioBuffer::new(vec![1.0, -2.0, 0.5], 8000);
        assert!((buffer.energy() - 5.25).abs() < 1e-12);
        assert_eq!(AudioBuffer::silence(100, 8000).energy(), 0.0);
    }
}
