//! Blending the predicted mask with the identity mask.

use crate::error::DenoiseError;
use crate::grid::Mask;

/// Denoising strength in `[0, 1]`: `0` leaves the signal untouched, `1` applies
/// the predicted mask as-is.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Intensity(f32);

impl Intensity {
    pub const FULL: Self = Self(1.0);
    pub const OFF: Self = Self(0.0);

    pub fn new(value: f32) -> Result<Self, DenoiseError> {
        if (0.0..=1.0).contains(&value) {
            Ok(Self(value))
        } else {
            Err(DenoiseError::InvalidIntensity(value))
        }
    }

    #[must_use]
    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Intensity {
    fn default() -> Self {
        Self::FULL
    }
}

impl TryFrom<f32> for Intensity {
    type Error = DenoiseError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// `mask' = i * mask + (1 - i)`, in place. Exact at both ends of the range.
pub fn blend_inplace(mask: &mut Mask, intensity: Intensity) {
    let i = intensity.value();
    if i == 1.0 {
        return;
    }
    if i == 0.0 {
        mask.as_mut_slice().fill(1.0);
        return;
    }
    let keep = 1.0 - i;
    for v in mask.as_mut_slice() {
        *v = (i * *v + keep).min(1.0);
    }
}

#[must_use]
pub fn blend(mask: &Mask, intensity: Intensity) -> Mask {
    let mut out = mask.clone();
    blend_inplace(&mut out, intensity);
    out
}
