//! Whole-buffer denoising: normalize, segment, mask, resynthesize, merge.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::constants::{SAMPLE_RATE_HZ, SEGMENT_HOP_SAMPLES, SEGMENT_SAMPLES};
use crate::error::{DenoiseError, ensure_finite};
use crate::intensity::{Intensity, blend_inplace};
use crate::model::ModelBundle;
use crate::normalize::{peak, peak_normalize};
use crate::segment::{OverlapAccumulator, plan_segments};
use crate::stft::SpectralTransform;
use crate::unet::MaskEstimator;
use crate::waveform::Waveform;

/// Segmentation parameters for long inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenoiseConfig {
    pub segment_samples: usize,
    pub hop_samples: usize,
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            segment_samples: SEGMENT_SAMPLES,
            hop_samples: SEGMENT_HOP_SAMPLES,
        }
    }
}

impl DenoiseConfig {
    /// Segments of `seconds` at the analysis rate with 50% overlap.
    pub fn with_segment_seconds(seconds: f32) -> Result<Self, DenoiseError> {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Err(DenoiseError::InvalidConfig(
                "segment length must be a positive number of seconds",
            ));
        }
        let segment_samples = (seconds * SAMPLE_RATE_HZ as f32).round() as usize;
        let config = Self {
            segment_samples,
            hop_samples: (segment_samples / 2).max(1),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DenoiseError> {
        if self.segment_samples == 0 {
            return Err(DenoiseError::InvalidConfig("segment_samples must be > 0"));
        }
        if self.hop_samples == 0 {
            return Err(DenoiseError::InvalidConfig("hop_samples must be > 0"));
        }
        if self.hop_samples > self.segment_samples {
            return Err(DenoiseError::InvalidConfig(
                "hop_samples must not exceed segment_samples",
            ));
        }
        Ok(())
    }
}

/// Shareable denoiser: immutable network, FFT plans and segmentation config.
///
/// `denoise` takes `&self`; one instance can serve concurrent callers.
#[derive(Debug, Clone)]
pub struct Denoiser {
    estimator: Arc<MaskEstimator>,
    transform: SpectralTransform,
    config: DenoiseConfig,
}

impl Denoiser {
    pub fn new(bundle: &ModelBundle, config: DenoiseConfig) -> Result<Self, DenoiseError> {
        Self::from_estimator(Arc::clone(&bundle.estimator), config)
    }

    pub fn from_estimator(
        estimator: Arc<MaskEstimator>,
        config: DenoiseConfig,
    ) -> Result<Self, DenoiseError> {
        config.validate()?;
        Ok(Self {
            estimator,
            transform: SpectralTransform::new(),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> DenoiseConfig {
        self.config
    }

    #[must_use]
    pub fn estimator(&self) -> &MaskEstimator {
        &self.estimator
    }

    /// Denoise `input` at `intensity` in `[0, 1]`.
    ///
    /// The result has exactly as many samples as the input and is
    /// peak-normalized. Intensity is validated before any spectral work.
    pub fn denoise(&self, input: &Waveform, intensity: f32) -> Result<Waveform, DenoiseError> {
        let intensity = Intensity::new(intensity)?;
        self.denoise_with(input, intensity)
    }

    pub fn denoise_with(
        &self,
        input: &Waveform,
        intensity: Intensity,
    ) -> Result<Waveform, DenoiseError> {
        input.validate_for_analysis()?;
        let started = Instant::now();

        let mut samples = input.samples().to_vec();
        if peak(&samples) == 0.0 {
            warn!(samples = samples.len(), "input is digital silence");
        }
        peak_normalize(&mut samples);

        let spans = plan_segments(
            samples.len(),
            self.config.segment_samples,
            self.config.hop_samples,
        );
        info!(
            samples = samples.len(),
            segments = spans.len(),
            intensity = intensity.value(),
            "denoising"
        );

        let mut acc = OverlapAccumulator::new(samples.len());
        for (idx, span) in spans.iter().enumerate() {
            let segment = &samples[span.start..span.end()];
            let cleaned = self.process_segment(segment, intensity)?;
            debug!(
                segment = idx,
                start = span.start,
                len = span.len,
                "segment reconstructed"
            );
            acc.add(span.start, &cleaned);
        }

        let mut out = acc.finish();
        ensure_finite(&out, "overlap-add merge")?;
        peak_normalize(&mut out);

        info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "denoise complete"
        );
        Ok(Waveform::mono(out))
    }

    fn process_segment(
        &self,
        samples: &[f32],
        intensity: Intensity,
    ) -> Result<Vec<f32>, DenoiseError> {
        let spec = self.transform.analyze(samples)?;
        ensure_finite(spec.magnitude().as_slice(), "spectral analysis")?;

        let mut mask = self.estimator.estimate(spec.magnitude())?;
        blend_inplace(&mut mask, intensity);

        let out = self
            .transform
            .synthesize_masked(&spec, &mask, samples.len())?;
        ensure_finite(&out, "spectral synthesis")?;
        Ok(out)
    }
}
