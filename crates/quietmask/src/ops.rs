//! Inference kernels for the mask network.
//!
//! Feature maps are single-batch `[channels, height, width]` row-major buffers:
//! `data[(c * height + y) * width + x]`. Height is the frequency axis and width
//! the frame axis of the spectrogram.

use crate::grid::Grid;

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMap {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    pub data: Vec<f32>,
}

impl FeatureMap {
    #[must_use]
    pub fn zeros(channels: usize, height: usize, width: usize) -> Self {
        Self {
            channels,
            height,
            width,
            data: vec![0.0f32; channels * height * width],
        }
    }

    /// Single-channel map holding `grid`, zero-extended to at least
    /// `min_height x min_width` (extra rows/columns at the bottom/right).
    #[must_use]
    pub fn from_grid_padded(grid: &Grid, min_height: usize, min_width: usize) -> Self {
        let (h, w) = grid.shape();
        let height = h.max(min_height);
        let width = w.max(min_width);
        let mut out = Self::zeros(1, height, width);
        for y in 0..h {
            out.data[y * width..y * width + w].copy_from_slice(grid.row(y));
        }
        out
    }

    /// Top-left `height x width` window of channel 0 as a grid.
    #[must_use]
    pub fn to_grid(&self, height: usize, width: usize) -> Option<Grid> {
        if self.channels == 0 || height > self.height || width > self.width {
            return None;
        }
        let mut data = Vec::with_capacity(height * width);
        for y in 0..height {
            data.extend_from_slice(&self.row(0, y)[..width]);
        }
        Grid::from_vec(height, width, data)
    }

    #[must_use]
    pub fn spatial(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    #[must_use]
    pub fn plane(&self, c: usize) -> &[f32] {
        let n = self.height * self.width;
        &self.data[c * n..(c + 1) * n]
    }

    #[must_use]
    pub fn row(&self, c: usize, y: usize) -> &[f32] {
        let start = (c * self.height + y) * self.width;
        &self.data[start..start + self.width]
    }
}

/// Stride-1 2D convolution with "same" zero padding (`kernel / 2` on each side).
///
/// Weights are `[out_channels, in_channels, kernel, kernel]` contiguous.
#[must_use]
pub fn conv2d_same(
    input: &FeatureMap,
    weight: &[f32],
    bias: &[f32],
    out_channels: usize,
    kernel: usize,
) -> FeatureMap {
    let FeatureMap {
        channels: in_channels,
        height,
        width,
        ..
    } = *input;
    debug_assert_eq!(kernel % 2, 1);
    debug_assert_eq!(weight.len(), out_channels * in_channels * kernel * kernel);
    debug_assert_eq!(bias.len(), out_channels);

    let pad = kernel / 2;
    let mut out = FeatureMap::zeros(out_channels, height, width);
    let plane = height * width;

    for oc in 0..out_channels {
        let out_plane = &mut out.data[oc * plane..(oc + 1) * plane];
        out_plane.fill(bias[oc]);

        for ic in 0..in_channels {
            let in_plane = input.plane(ic);
            let w_base = (oc * in_channels + ic) * kernel * kernel;
            for ky in 0..kernel {
                // Output rows whose source row `y + ky - pad` is in range.
                let y_lo = pad.saturating_sub(ky);
                let y_hi = (height + pad).saturating_sub(ky).min(height);
                for kx in 0..kernel {
                    let w = weight[w_base + ky * kernel + kx];
                    if w == 0.0 {
                        continue;
                    }
                    let x_lo = pad.saturating_sub(kx);
                    let x_hi = (width + pad).saturating_sub(kx).min(width);
                    if x_lo >= x_hi {
                        continue;
                    }
                    for y in y_lo..y_hi {
                        let sy = y + ky - pad;
                        let src_start = sy * width + x_lo + kx - pad;
                        let src = &in_plane[src_start..src_start + (x_hi - x_lo)];
                        let dst = &mut out_plane[y * width + x_lo..y * width + x_hi];
                        for (d, &s) in dst.iter_mut().zip(src) {
                            *d += w * s;
                        }
                    }
                }
            }
        }
    }
    out
}

/// 2x2 stride-2 transposed convolution; doubles both spatial dimensions.
///
/// Weights follow the `ConvTranspose2d` layout `[in_channels, out_channels, 2, 2]`.
#[must_use]
pub fn conv_transpose2d_2x2(
    input: &FeatureMap,
    weight: &[f32],
    bias: &[f32],
    out_channels: usize,
) -> FeatureMap {
    let FeatureMap {
        channels: in_channels,
        height,
        width,
        ..
    } = *input;
    debug_assert_eq!(weight.len(), in_channels * out_channels * 4);
    debug_assert_eq!(bias.len(), out_channels);

    let out_h = height * 2;
    let out_w = width * 2;
    let mut out = FeatureMap::zeros(out_channels, out_h, out_w);
    let out_plane_len = out_h * out_w;

    for oc in 0..out_channels {
        let out_plane = &mut out.data[oc * out_plane_len..(oc + 1) * out_plane_len];
        out_plane.fill(bias[oc]);

        for ic in 0..in_channels {
            let w = &weight[(ic * out_channels + oc) * 4..(ic * out_channels + oc) * 4 + 4];
            for y in 0..height {
                let in_row = input.row(ic, y);
                for ky in 0..2 {
                    let out_row = &mut out_plane[(2 * y + ky) * out_w..(2 * y + ky + 1) * out_w];
                    let (w0, w1) = (w[ky * 2], w[ky * 2 + 1]);
                    for (pair, &v) in out_row.chunks_exact_mut(2).zip(in_row) {
                        pair[0] += v * w0;
                        pair[1] += v * w1;
                    }
                }
            }
        }
    }
    out
}

/// 2x2 max pooling with stride 2; odd trailing rows/columns are dropped.
#[must_use]
pub fn max_pool2d_2x(input: &FeatureMap) -> FeatureMap {
    let out_h = input.height / 2;
    let out_w = input.width / 2;
    let mut out = FeatureMap::zeros(input.channels, out_h, out_w);
    for c in 0..input.channels {
        for y in 0..out_h {
            let r0 = input.row(c, 2 * y);
            let r1 = input.row(c, 2 * y + 1);
            let start = (c * out_h + y) * out_w;
            for (x, out_v) in out.data[start..start + out_w].iter_mut().enumerate() {
                *out_v = r0[2 * x].max(r0[2 * x + 1]).max(r1[2 * x]).max(r1[2 * x + 1]);
            }
        }
    }
    out
}

#[inline]
pub fn leaky_relu_inplace(x: &mut [f32], slope: f32) {
    for v in x {
        if *v < 0.0 {
            *v *= slope;
        }
    }
}

#[inline]
pub fn sigmoid_inplace(x: &mut [f32]) {
    for v in x {
        *v = 1.0 / (1.0 + (-*v).exp());
    }
}

/// Stack `b`'s channels after `a`'s. Spatial sizes must already agree.
#[must_use]
pub fn concat_channels(a: &FeatureMap, b: &FeatureMap) -> FeatureMap {
    debug_assert_eq!(a.spatial(), b.spatial());
    let mut data = Vec::with_capacity(a.data.len() + b.data.len());
    data.extend_from_slice(&a.data);
    data.extend_from_slice(&b.data);
    FeatureMap {
        channels: a.channels + b.channels,
        height: a.height,
        width: a.width,
        data,
    }
}

/// Centered crop to `height x width`, offset `(source - target) / 2` per axis.
#[must_use]
pub fn center_crop(input: &FeatureMap, height: usize, width: usize) -> FeatureMap {
    debug_assert!(height <= input.height && width <= input.width);
    let dy = (input.height - height) / 2;
    let dx = (input.width - width) / 2;
    let mut out = FeatureMap::zeros(input.channels, height, width);
    for c in 0..input.channels {
        for y in 0..height {
            let src = &input.row(c, y + dy)[dx..dx + width];
            let start = (c * height + y) * width;
            out.data[start..start + width].copy_from_slice(src);
        }
    }
    out
}

/// Bilinear resize with half-pixel centers (`align_corners = false`).
#[must_use]
pub fn resize_bilinear(input: &FeatureMap, height: usize, width: usize) -> FeatureMap {
    if input.spatial() == (height, width) {
        return input.clone();
    }
    let ys = source_taps(input.height, height);
    let xs = source_taps(input.width, width);

    let mut out = FeatureMap::zeros(input.channels, height, width);
    for c in 0..input.channels {
        for (y, &(y0, y1, ly)) in ys.iter().enumerate() {
            let r0 = input.row(c, y0);
            let r1 = input.row(c, y1);
            let start = (c * height + y) * width;
            for (x, out_v) in out.data[start..start + width].iter_mut().enumerate() {
                let (x0, x1, lx) = xs[x];
                let top = r0[x0] * (1.0 - lx) + r0[x1] * lx;
                let bottom = r1[x0] * (1.0 - lx) + r1[x1] * lx;
                *out_v = top * (1.0 - ly) + bottom * ly;
            }
        }
    }
    out
}

/// For each output index: the two source indices and the weight of the second.
fn source_taps(in_len: usize, out_len: usize) -> Vec<(usize, usize, f32)> {
    let scale = in_len as f32 / out_len as f32;
    (0..out_len)
        .map(|i| {
            let src = ((i as f32 + 0.5) * scale - 0.5).max(0.0);
            let i0 = (src.floor() as usize).min(in_len - 1);
            let i1 = (i0 + 1).min(in_len - 1);
            (i0, i1, src - i0 as f32)
        })
        .collect()
}
