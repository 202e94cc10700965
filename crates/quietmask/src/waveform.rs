//! Sample buffers entering and leaving the denoiser.

use crate::constants::SAMPLE_RATE_HZ;
use crate::error::DenoiseError;

/// Interleaved `f32` samples with their rate and channel count.
///
/// The denoiser only accepts mono at [`SAMPLE_RATE_HZ`]; the fields are carried
/// so that unreduced input is rejected instead of silently misread.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f32>,
    sample_rate_hz: u32,
    channels: u16,
}

impl Waveform {
    #[must_use]
    pub fn new(samples: Vec<f32>, sample_rate_hz: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate_hz,
            channels,
        }
    }

    /// Mono buffer at the analysis rate.
    #[must_use]
    pub fn mono(samples: Vec<f32>) -> Self {
        Self::new(samples, SAMPLE_RATE_HZ, 1)
    }

    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    #[must_use]
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    #[must_use]
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    #[must_use]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate_hz == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / (self.sample_rate_hz as f32 * f32::from(self.channels))
    }

    /// Check that this buffer can enter the core unchanged.
    pub(crate) fn validate_for_analysis(&self) -> Result<(), DenoiseError> {
        if self.channels != 1 {
            return Err(DenoiseError::UnsupportedChannels(self.channels));
        }
        if self.sample_rate_hz != SAMPLE_RATE_HZ {
            return Err(DenoiseError::SampleRateMismatch {
                expected: SAMPLE_RATE_HZ,
                got: self.sample_rate_hz,
            });
        }
        if self.samples.is_empty() {
            return Err(DenoiseError::EmptyWaveform);
        }
        if let Some(index) = self.samples.iter().position(|v| !v.is_finite()) {
            return Err(DenoiseError::NonFiniteInput { index });
        }
        Ok(())
    }
}
