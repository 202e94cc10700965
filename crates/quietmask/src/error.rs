//! Per-call failures surfaced by the denoising core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DenoiseError {
    #[error("intensity must be within [0, 1], got {0}")]
    InvalidIntensity(f32),
    #[error("waveform is empty")]
    EmptyWaveform,
    #[error("waveform must be mono, got {0} channels")]
    UnsupportedChannels(u16),
    #[error("waveform sample rate is {got} Hz, expected {expected} Hz")]
    SampleRateMismatch { expected: u32, got: u32 },
    #[error("spectrogram has no bins or no frames")]
    EmptySpectrogram,
    #[error("waveform contains a non-finite sample at index {index}")]
    NonFiniteInput { index: usize },
    #[error("non-finite values produced by {stage}")]
    NonFinite { stage: &'static str },
    #[error("shape mismatch in {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("fft error: {0}")]
    Fft(#[from] realfft::FftError),
    #[error("invalid denoise config: {0}")]
    InvalidConfig(&'static str),
}

/// Fail with [`DenoiseError::NonFinite`] if any value is NaN or infinite.
pub(crate) fn ensure_finite(values: &[f32], stage: &'static str) -> Result<(), DenoiseError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(DenoiseError::NonFinite { stage })
    }
}
