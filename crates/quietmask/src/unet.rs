//! U-Net mask estimator: log-magnitude spectrogram in, suppression mask out.
//!
//! The plan is straight-line and driven by [`NetworkLayout`]:
//! encoders (conv-bn-lrelu x2, maxpool) -> bottleneck -> decoders
//! (concat skip, conv-bn-lrelu x2, transposed conv) -> 1x1 head -> sigmoid.
//! Batch norms are folded into their convolutions when the weights are loaded.

use crate::error::{DenoiseError, ensure_finite};
use crate::grid::{Grid, Mask};
use crate::layout::{BlockSpec, BlockTail, ConvSpec, NetworkLayout};
use crate::ops::{
    FeatureMap, center_crop, concat_channels, conv_transpose2d_2x2, conv2d_same,
    leaky_relu_inplace, max_pool2d_2x, resize_bilinear, sigmoid_inplace,
};
use crate::weights::{TensorSource, WeightError};

#[derive(Debug, Clone)]
struct Conv {
    weight: Vec<f32>, // [out, in, k, k]
    bias: Vec<f32>,   // [out]
    out_channels: usize,
    kernel: usize,
}

impl Conv {
    fn forward(&self, x: &FeatureMap) -> FeatureMap {
        conv2d_same(x, &self.weight, &self.bias, self.out_channels, self.kernel)
    }
}

#[derive(Debug, Clone)]
enum Tail {
    MaxPool,
    Identity,
    Upsample {
        weight: Vec<f32>, // [c, c, 2, 2]
        bias: Vec<f32>,
        channels: usize,
    },
}

#[derive(Debug, Clone)]
struct Block {
    convs: [Conv; 2],
    tail: Tail,
}

/// Loaded, inference-ready mask network. Immutable once built.
#[derive(Debug, Clone)]
pub struct MaskEstimator {
    layout: NetworkLayout,
    encoders: Vec<Block>,
    bottleneck: Block,
    decoders: Vec<Block>,
    head: Conv,
    leaky_slope: f32,
}

/// Fold inference-mode batch norm into the preceding convolution, in place.
///
/// `y = gamma * (conv(x) + b - mean) / sqrt(var + eps) + beta`
pub(crate) fn fold_batch_norm(
    weight: &mut [f32],
    bias: &mut [f32],
    gamma: &[f32],
    beta: &[f32],
    mean: &[f32],
    var: &[f32],
    eps: f32,
) {
    let out_channels = bias.len();
    let per_out = weight.len() / out_channels;
    for oc in 0..out_channels {
        let scale = gamma[oc] / (var[oc] + eps).sqrt();
        for w in &mut weight[oc * per_out..(oc + 1) * per_out] {
            *w *= scale;
        }
        bias[oc] = (bias[oc] - mean[oc]) * scale + beta[oc];
    }
}

fn load_conv(
    src: &impl TensorSource,
    spec: &ConvSpec,
) -> Result<(Vec<f32>, Vec<f32>), WeightError> {
    let (cin, cout, k) = (spec.in_channels, spec.out_channels, spec.kernel);
    let weight = src.tensor_with_shape(&format!("{}.weight", spec.conv), &[cout, cin, k, k])?;
    let bias = src.tensor_with_shape(&format!("{}.bias", spec.conv), &[cout])?;
    Ok((weight.data, bias.data))
}

fn load_conv_bn(src: &impl TensorSource, spec: &ConvSpec, eps: f32) -> Result<Conv, WeightError> {
    let (mut weight, mut bias) = load_conv(src, spec)?;
    let cout = spec.out_channels;
    let stat = |name: &str| {
        src.tensor_with_shape(&format!("{}.{name}", spec.norm), &[cout])
            .map(|t| t.data)
    };
    let gamma = stat("weight")?;
    let beta = stat("bias")?;
    let mean = stat("running_mean")?;
    let var = stat("running_var")?;
    fold_batch_norm(&mut weight, &mut bias, &gamma, &beta, &mean, &var, eps);
    Ok(Conv {
        weight,
        bias,
        out_channels: cout,
        kernel: spec.kernel,
    })
}

fn load_block(src: &impl TensorSource, spec: &BlockSpec, eps: f32) -> Result<Block, WeightError> {
    let convs = [
        load_conv_bn(src, &spec.convs[0], eps)?,
        load_conv_bn(src, &spec.convs[1], eps)?,
    ];
    let tail = match spec.tail {
        BlockTail::MaxPool => Tail::MaxPool,
        BlockTail::Dropout => Tail::Identity,
        BlockTail::Upsample => {
            let c = spec.out_channels();
            let prefix = spec.tail_prefix();
            let weight = src.tensor_with_shape(&format!("{prefix}.weight"), &[c, c, 2, 2])?;
            let bias = src.tensor_with_shape(&format!("{prefix}.bias"), &[c])?;
            Tail::Upsample {
                weight: weight.data,
                bias: bias.data,
                channels: c,
            }
        }
    };
    Ok(Block { convs, tail })
}

/// Match a skip tensor to the decoder's spatial size: crop when it is at least
/// as large on both axes, bilinear resize otherwise.
fn align_skip(skip: &FeatureMap, height: usize, width: usize) -> FeatureMap {
    if skip.height < height || skip.width < width {
        resize_bilinear(skip, height, width)
    } else if skip.spatial() == (height, width) {
        skip.clone()
    } else {
        center_crop(skip, height, width)
    }
}

impl MaskEstimator {
    /// Build the estimator from named tensors, checking every name and shape the
    /// layout requires.
    pub fn from_source(
        layout: NetworkLayout,
        src: &impl TensorSource,
        batch_norm_eps: f32,
        leaky_slope: f32,
    ) -> Result<Self, WeightError> {
        let encoders = layout
            .encoders()
            .iter()
            .map(|spec| load_block(src, spec, batch_norm_eps))
            .collect::<Result<Vec<_>, _>>()?;
        let bottleneck = load_block(src, layout.bottleneck(), batch_norm_eps)?;
        let decoders = layout
            .decoders()
            .iter()
            .map(|spec| load_block(src, spec, batch_norm_eps))
            .collect::<Result<Vec<_>, _>>()?;
        let (weight, bias) = load_conv(src, layout.head())?;
        let head = Conv {
            weight,
            bias,
            out_channels: 1,
            kernel: 1,
        };

        Ok(Self {
            layout,
            encoders,
            bottleneck,
            decoders,
            head,
            leaky_slope,
        })
    }

    #[must_use]
    pub fn layout(&self) -> &NetworkLayout {
        &self.layout
    }

    /// Number of scalars held after batch-norm folding.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        let conv = |c: &Conv| c.weight.len() + c.bias.len();
        let block = |b: &Block| {
            let tail = match &b.tail {
                Tail::Upsample { weight, bias, .. } => weight.len() + bias.len(),
                Tail::MaxPool | Tail::Identity => 0,
            };
            conv(&b.convs[0]) + conv(&b.convs[1]) + tail
        };
        self.encoders.iter().map(block).sum::<usize>()
            + block(&self.bottleneck)
            + self.decoders.iter().map(block).sum::<usize>()
            + conv(&self.head)
    }

    fn run_block(&self, block: &Block, x: &FeatureMap) -> FeatureMap {
        let mut y = block.convs[0].forward(x);
        leaky_relu_inplace(&mut y.data, self.leaky_slope);
        let mut y = block.convs[1].forward(&y);
        leaky_relu_inplace(&mut y.data, self.leaky_slope);
        match &block.tail {
            Tail::MaxPool => max_pool2d_2x(&y),
            Tail::Identity => y,
            Tail::Upsample {
                weight,
                bias,
                channels,
            } => conv_transpose2d_2x2(&y, weight, bias, *channels),
        }
    }

    /// Predict a mask in `[0, 1]` with exactly the shape of `magnitude`.
    pub fn estimate(&self, magnitude: &Grid) -> Result<Mask, DenoiseError> {
        let (n_freq, n_frames) = magnitude.shape();
        if n_freq == 0 || n_frames == 0 {
            return Err(DenoiseError::EmptySpectrogram);
        }
        ensure_finite(magnitude.as_slice(), "mask estimator input")?;

        let side = self.layout.min_input_side();
        let input = FeatureMap::from_grid_padded(magnitude, side, side);
        let (in_h, in_w) = input.spatial();

        let mut skips: Vec<FeatureMap> = Vec::with_capacity(self.encoders.len());
        for block in &self.encoders {
            let out = self.run_block(block, skips.last().unwrap_or(&input));
            skips.push(out);
        }
        let mut x = self.run_block(&self.bottleneck, skips.last().unwrap_or(&input));

        for (block, skip) in self.decoders.iter().zip(skips.iter().rev()) {
            let skip = align_skip(skip, x.height, x.width);
            x = self.run_block(block, &concat_channels(&x, &skip));
        }

        let mut out = self.head.forward(&x);
        sigmoid_inplace(&mut out.data);
        if out.spatial() != (in_h, in_w) {
            out = resize_bilinear(&out, in_h, in_w);
        }

        let mask = out
            .to_grid(n_freq, n_frames)
            .ok_or(DenoiseError::ShapeMismatch {
                what: "mask",
                expected: (n_freq, n_frames),
                got: out.spatial(),
            })?;
        ensure_finite(mask.as_slice(), "mask estimator")?;
        Ok(mask)
    }
}
