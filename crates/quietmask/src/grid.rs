//! Frequency-major time-frequency grids (magnitude, phase, mask).

/// A `n_freq x n_frames` grid stored frequency-major: `data[f * n_frames + t]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    n_freq: usize,
    n_frames: usize,
    data: Vec<f32>,
}

/// Per-bin suppression gain in `[0, 1]`, same shape as the magnitude it masks.
pub type Mask = Grid;

impl Grid {
    #[must_use]
    pub fn filled(n_freq: usize, n_frames: usize, value: f32) -> Self {
        Self {
            n_freq,
            n_frames,
            data: vec![value; n_freq * n_frames],
        }
    }

    /// Wrap frequency-major `data`. Returns `None` if the length does not match.
    #[must_use]
    pub fn from_vec(n_freq: usize, n_frames: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == n_freq * n_frames).then_some(Self {
            n_freq,
            n_frames,
            data,
        })
    }

    #[must_use]
    pub fn n_freq(&self) -> usize {
        self.n_freq
    }

    #[must_use]
    pub fn n_frames(&self) -> usize {
        self.n_frames
    }

    /// `(n_freq, n_frames)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.n_freq, self.n_frames)
    }

    #[must_use]
    pub fn get(&self, freq: usize, frame: usize) -> f32 {
        self.data[freq * self.n_frames + frame]
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// One frequency row across all frames.
    #[must_use]
    pub fn row(&self, freq: usize) -> &[f32] {
        &self.data[freq * self.n_frames..(freq + 1) * self.n_frames]
    }

    #[must_use]
    pub fn min_max(&self) -> (f32, f32) {
        self.data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}
