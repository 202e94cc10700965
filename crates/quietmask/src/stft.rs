//! Short-time Fourier analysis and overlap-add resynthesis.
//!
//! Mirrors `torch.stft` / `torch.istft` as used when the mask network was
//! trained:
//! - periodic Hann window, `N_FFT = 512`, `HOP_LENGTH = 128`
//! - centered frames with reflect padding of `N_FFT / 2` on both sides
//! - one-sided spectrum (`N_FREQ = 257` bins)
//! - inverse divides by the summed squared-window envelope
//!
//! Magnitudes are stored `log1p`-compressed; phase is kept as-is and is never
//! touched by masking.

use std::f32::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::constants::{HOP_LENGTH, N_FFT, N_FREQ};
use crate::error::DenoiseError;
use crate::grid::{Grid, Mask};

/// Envelope values below this are treated as uncovered (same floor as torch).
const ENVELOPE_FLOOR: f32 = 1e-11;

/// Log-magnitude and phase of one analyzed buffer, frame-aligned.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    magnitude: Grid,
    phase: Grid,
}

impl Spectrogram {
    /// Pair a log1p magnitude grid with a phase grid of the same shape.
    pub fn new(magnitude: Grid, phase: Grid) -> Result<Self, DenoiseError> {
        if magnitude.shape() != phase.shape() {
            return Err(DenoiseError::ShapeMismatch {
                what: "spectrogram phase",
                expected: magnitude.shape(),
                got: phase.shape(),
            });
        }
        Ok(Self { magnitude, phase })
    }

    /// `log1p(|X|)`.
    #[must_use]
    pub fn magnitude(&self) -> &Grid {
        &self.magnitude
    }

    /// `arg(X)` in `(-pi, pi]`.
    #[must_use]
    pub fn phase(&self) -> &Grid {
        &self.phase
    }

    #[must_use]
    pub fn n_frames(&self) -> usize {
        self.magnitude.n_frames()
    }

    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.magnitude.shape()
    }
}

/// Number of centered frames produced for `len` samples.
#[must_use]
pub fn frame_count(len: usize) -> usize {
    1 + len / HOP_LENGTH
}

fn build_hann_window() -> Vec<f32> {
    (0..N_FFT)
        .map(|i| {
            // Periodic Hann: 0.5*(1-cos(2*pi*i/N))
            let angle = 2.0 * PI * (i as f32) / (N_FFT as f32);
            0.5 * (1.0 - angle.cos())
        })
        .collect()
}

/// Pad `N_FFT / 2` samples on both sides.
///
/// Reflect padding needs more than `N_FFT / 2` samples; shorter buffers are
/// zero-padded instead.
fn center_pad(samples: &[f32]) -> Vec<f32> {
    let pad = N_FFT / 2;
    let len = samples.len();
    let mut out = vec![0.0f32; len + 2 * pad];
    out[pad..pad + len].copy_from_slice(samples);
    if len > pad {
        for i in 0..pad {
            out[i] = samples[pad - i];
            out[pad + len + i] = samples[len - 2 - i];
        }
    }
    out
}

/// Forward/inverse STFT with FFT plans built once and shared.
#[derive(Clone)]
pub struct SpectralTransform {
    window: Vec<f32>,
    forward: Arc<dyn RealToComplex<f32>>,
    inverse: Arc<dyn ComplexToReal<f32>>,
}

impl std::fmt::Debug for SpectralTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectralTransform")
            .field("n_fft", &N_FFT)
            .field("hop_length", &HOP_LENGTH)
            .finish_non_exhaustive()
    }
}

impl Default for SpectralTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectralTransform {
    #[must_use]
    pub fn new() -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            window: build_hann_window(),
            forward: planner.plan_fft_forward(N_FFT),
            inverse: planner.plan_fft_inverse(N_FFT),
        }
    }

    /// Analyze `samples` into a `N_FREQ x frame_count(len)` spectrogram.
    pub fn analyze(&self, samples: &[f32]) -> Result<Spectrogram, DenoiseError> {
        if samples.is_empty() {
            return Err(DenoiseError::EmptyWaveform);
        }

        let padded = center_pad(samples);
        let n_frames = frame_count(samples.len());

        let mut magnitude = Grid::filled(N_FREQ, n_frames, 0.0);
        let mut phase = Grid::filled(N_FREQ, n_frames, 0.0);
        let mag_out = magnitude.as_mut_slice();
        let phase_out = phase.as_mut_slice();

        let mut frame = self.forward.make_input_vec();
        let mut spectrum = self.forward.make_output_vec();
        let mut scratch = self.forward.make_scratch_vec();

        for t in 0..n_frames {
            let start = t * HOP_LENGTH;
            for (i, out) in frame.iter_mut().enumerate() {
                *out = padded[start + i] * self.window[i];
            }
            self.forward
                .process_with_scratch(&mut frame, &mut spectrum, &mut scratch)?;

            for (k, bin) in spectrum.iter().enumerate() {
                mag_out[k * n_frames + t] = bin.norm().ln_1p();
                let angle = bin.im.atan2(bin.re);
                // atan2 yields -pi for (-0.0, x < 0); keep the half-open range.
                phase_out[k * n_frames + t] = if angle <= -PI { PI } else { angle };
            }
        }

        Spectrogram::new(magnitude, phase)
    }

    /// Resynthesize exactly `target_length` samples from an unmodified spectrogram.
    pub fn synthesize(
        &self,
        spec: &Spectrogram,
        target_length: usize,
    ) -> Result<Vec<f32>, DenoiseError> {
        self.overlap_add(spec, None, target_length)
    }

    /// Resynthesize with the linear magnitude scaled bin-by-bin by `mask`.
    pub fn synthesize_masked(
        &self,
        spec: &Spectrogram,
        mask: &Mask,
        target_length: usize,
    ) -> Result<Vec<f32>, DenoiseError> {
        if mask.shape() != spec.shape() {
            return Err(DenoiseError::ShapeMismatch {
                what: "mask",
                expected: spec.shape(),
                got: mask.shape(),
            });
        }
        self.overlap_add(spec, Some(mask), target_length)
    }

    fn overlap_add(
        &self,
        spec: &Spectrogram,
        mask: Option<&Mask>,
        target_length: usize,
    ) -> Result<Vec<f32>, DenoiseError> {
        let (n_freq, n_frames) = spec.shape();
        if n_freq != N_FREQ || n_frames == 0 {
            return Err(DenoiseError::ShapeMismatch {
                what: "spectrogram",
                expected: (N_FREQ, n_frames.max(1)),
                got: (n_freq, n_frames),
            });
        }

        let full_len = N_FFT + HOP_LENGTH * (n_frames - 1);
        let mut signal = vec![0.0f32; full_len];
        let mut envelope = vec![0.0f32; full_len];

        let mut spectrum = self.inverse.make_input_vec();
        let mut frame = self.inverse.make_output_vec();
        let mut scratch = self.inverse.make_scratch_vec();
        let scale = 1.0 / N_FFT as f32;

        let log_mag = spec.magnitude();
        let phase = spec.phase();
        for t in 0..n_frames {
            for (k, bin) in spectrum.iter_mut().enumerate() {
                let gain = mask.map_or(1.0, |m| m.get(k, t));
                let m = log_mag.get(k, t).exp_m1() * gain;
                let (sin, cos) = phase.get(k, t).sin_cos();
                *bin = Complex::new(m * cos, m * sin);
            }
            // DC and Nyquist must be real for a real-valued inverse.
            spectrum[0].im = 0.0;
            spectrum[N_FREQ - 1].im = 0.0;

            self.inverse
                .process_with_scratch(&mut spectrum, &mut frame, &mut scratch)?;

            let start = t * HOP_LENGTH;
            for (i, &sample) in frame.iter().enumerate() {
                let w = self.window[i];
                signal[start + i] += sample * scale * w;
                envelope[start + i] += w * w;
            }
        }

        let offset = N_FFT / 2;
        let out = (0..target_length)
            .map(|i| {
                let idx = offset + i;
                match envelope.get(idx) {
                    Some(&env) if env > ENVELOPE_FLOOR => signal[idx] / env,
                    _ => 0.0,
                }
            })
            .collect();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn chirp(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / 16_000.0;
                0.6 * (2.0 * std::f32::consts::PI * (220.0 + 900.0 * t) * t).sin()
                    + 0.2 * (i as f32 * 0.37).cos()
            })
            .collect()
    }

    fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f32::max)
    }

    #[test]
    fn frame_and_bin_counts() {
        let stft = SpectralTransform::new();
        let spec = stft.analyze(&vec![0.1f32; 16_000]).expect("analyze");
        assert_eq!(spec.shape(), (N_FREQ, 1 + 16_000 / HOP_LENGTH));
        assert_eq!(N_FREQ, 257);
    }

    #[test]
    fn round_trip_without_mask() {
        let stft = SpectralTransform::new();
        for len in [16_000usize, 4_001, 513, 300] {
            let x = chirp(len);
            let spec = stft.analyze(&x).expect("analyze");
            let y = stft.synthesize(&spec, x.len()).expect("synthesize");
            assert_eq!(y.len(), x.len());
            let err = max_abs_diff(&x, &y);
            assert!(err < 1e-4, "len={len} max err {err}");
        }
    }

    #[test]
    fn unit_mask_matches_plain_synthesis() {
        let stft = SpectralTransform::new();
        let x = chirp(2_048);
        let spec = stft.analyze(&x).expect("analyze");
        let (f, t) = spec.shape();
        let ones = Grid::filled(f, t, 1.0);
        let a = stft.synthesize(&spec, x.len()).expect("plain");
        let b = stft.synthesize_masked(&spec, &ones, x.len()).expect("masked");
        assert_eq!(a, b);
    }

    #[test]
    fn zero_mask_silences_output() {
        let stft = SpectralTransform::new();
        let x = chirp(4_096);
        let spec = stft.analyze(&x).expect("analyze");
        let (f, t) = spec.shape();
        let y = stft
            .synthesize_masked(&spec, &Grid::filled(f, t, 0.0), x.len())
            .expect("masked");
        assert!(y.iter().all(|v| v.abs() < 1e-7));
    }

    #[test]
    fn shorter_than_half_window_still_yields_a_frame() {
        let stft = SpectralTransform::new();
        let x = chirp(37);
        let spec = stft.analyze(&x).expect("analyze");
        assert_eq!(spec.n_frames(), 1);
        let y = stft.synthesize(&spec, x.len()).expect("synthesize");
        assert_eq!(y.len(), 37);
        assert!(max_abs_diff(&x, &y) < 1e-4);
    }

    #[test]
    fn target_length_is_honored_exactly() {
        let stft = SpectralTransform::new();
        let x = chirp(1_000);
        let spec = stft.analyze(&x).expect("analyze");
        // Default istft length would be (frames - 1) * hop = 896 here.
        assert_eq!(stft.synthesize(&spec, 1_000).expect("exact").len(), 1_000);
        assert_eq!(stft.synthesize(&spec, 1_200).expect("longer").len(), 1_200);
    }

    #[test]
    fn phase_is_wrapped() {
        let stft = SpectralTransform::new();
        let spec = stft.analyze(&chirp(3_000)).expect("analyze");
        let (lo, hi) = spec.phase().min_max();
        assert!(lo > -std::f32::consts::PI - 1e-6);
        assert!(hi <= std::f32::consts::PI + 1e-6);
        let (mag_lo, _) = spec.magnitude().min_max();
        assert!(mag_lo >= 0.0);
    }

    #[test]
    fn mismatched_mask_is_rejected() {
        let stft = SpectralTransform::new();
        let spec = stft.analyze(&chirp(1_024)).expect("analyze");
        let err = stft
            .synthesize_masked(&spec, &Grid::filled(N_FREQ, 2, 1.0), 1_024)
            .expect_err("shape mismatch");
        assert!(matches!(err, DenoiseError::ShapeMismatch { .. }));
    }

    #[test]
    fn empty_input_is_rejected() {
        let stft = SpectralTransform::new();
        assert!(matches!(
            stft.analyze(&[]),
            Err(DenoiseError::EmptyWaveform)
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn round_trip_holds_for_arbitrary_buffers(
            x in proptest::collection::vec(-1.0f32..1.0, 1..3_000)
        ) {
            let stft = SpectralTransform::new();
            let spec = stft.analyze(&x).expect("analyze");
            let y = stft.synthesize(&spec, x.len()).expect("synthesize");
            prop_assert_eq!(y.len(), x.len());
            prop_assert!(max_abs_diff(&x, &y) < 1e-4);
        }
    }
}
