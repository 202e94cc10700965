//! Peak amplitude normalization.

use crate::constants::MERGE_EPS;

/// Largest absolute sample value, `0.0` for an empty buffer.
#[must_use]
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, &v| m.max(v.abs()))
}

/// Scale so the peak is (just under) 1.0: `x / (max|x| + 1e-8)`.
///
/// Silence stays silence; the epsilon keeps the division finite.
pub fn peak_normalize(samples: &mut [f32]) {
    let scale = 1.0 / (peak(samples) + MERGE_EPS);
    for v in samples {
        *v *= scale;
    }
}
