//! Declarative topology of the mask network.
//!
//! Tensor prefixes follow the exported `state_dict` of the reference model:
//! each block is a sequential container where index 0/3 are convolutions, 1/4
//! their batch norms, and 6 the block tail (pool, dropout or transposed conv).

use crate::constants::{BASE_CHANNELS, ENCODER_LEVELS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvSpec {
    pub conv: String,
    pub norm: String,
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockTail {
    /// 2x2 max pooling, stride 2.
    MaxPool,
    /// Training-only; nothing runs at inference and no tensors are stored.
    Dropout,
    /// 2x2 stride-2 transposed convolution keeping the channel count.
    Upsample,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSpec {
    pub name: String,
    pub convs: [ConvSpec; 2],
    pub tail: BlockTail,
}

impl BlockSpec {
    fn new(name: &str, in_channels: usize, out_channels: usize, tail: BlockTail) -> Self {
        let conv = |idx: usize, cin: usize| ConvSpec {
            conv: format!("{name}.{idx}"),
            norm: format!("{name}.{}", idx + 1),
            in_channels: cin,
            out_channels,
            kernel: 3,
        };
        Self {
            name: name.to_string(),
            convs: [conv(0, in_channels), conv(3, out_channels)],
            tail,
        }
    }

    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.convs[1].out_channels
    }

    #[must_use]
    pub fn tail_prefix(&self) -> String {
        format!("{}.6", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkLayout {
    base_channels: usize,
    encoders: Vec<BlockSpec>,
    bottleneck: BlockSpec,
    decoders: Vec<BlockSpec>,
    head: ConvSpec,
}

impl Default for NetworkLayout {
    fn default() -> Self {
        Self::standard()
    }
}

impl NetworkLayout {
    /// The shipped network: widths 16/32/64/128, bottleneck 256.
    #[must_use]
    pub fn standard() -> Self {
        Self::with_base_channels(BASE_CHANNELS)
    }

    #[must_use]
    pub fn with_base_channels(base: usize) -> Self {
        let width = |level: usize| base << level;

        let encoders = (0..ENCODER_LEVELS)
            .map(|level| {
                let cin = if level == 0 { 1 } else { width(level - 1) };
                BlockSpec::new(
                    &format!("enc{}", level + 1),
                    cin,
                    width(level),
                    BlockTail::MaxPool,
                )
            })
            .collect();

        let deepest = width(ENCODER_LEVELS - 1);
        let bottleneck = BlockSpec::new(
            "bottleneck",
            deepest,
            width(ENCODER_LEVELS),
            BlockTail::Dropout,
        );

        // Decoders run deepest first: dec4 takes the bottleneck plus enc4's skip.
        let decoders = (0..ENCODER_LEVELS)
            .rev()
            .map(|level| {
                let below = width(level + 1);
                BlockSpec::new(
                    &format!("dec{}", level + 1),
                    below + width(level),
                    width(level),
                    BlockTail::Upsample,
                )
            })
            .collect();

        let head = ConvSpec {
            conv: "final.0".to_string(),
            norm: String::new(),
            in_channels: base,
            out_channels: 1,
            kernel: 1,
        };

        Self {
            base_channels: base,
            encoders,
            bottleneck,
            decoders,
            head,
        }
    }

    #[must_use]
    pub fn base_channels(&self) -> usize {
        self.base_channels
    }

    #[must_use]
    pub fn encoders(&self) -> &[BlockSpec] {
        &self.encoders
    }

    #[must_use]
    pub fn bottleneck(&self) -> &BlockSpec {
        &self.bottleneck
    }

    /// Decoder blocks in execution order (deepest first).
    #[must_use]
    pub fn decoders(&self) -> &[BlockSpec] {
        &self.decoders
    }

    #[must_use]
    pub fn head(&self) -> &ConvSpec {
        &self.head
    }

    /// Smallest spatial side that survives every pooling stage with at least one cell.
    #[must_use]
    pub fn min_input_side(&self) -> usize {
        1 << self.encoders.len()
    }

    /// Every tensor the network reads, with its exact shape.
    #[must_use]
    pub fn required_tensors(&self) -> Vec<(String, Vec<usize>)> {
        let mut out = Vec::new();
        let blocks = self
            .encoders
            .iter()
            .chain(std::iter::once(&self.bottleneck))
            .chain(&self.decoders);
        for block in blocks {
            for conv in &block.convs {
                let (cin, cout, k) = (conv.in_channels, conv.out_channels, conv.kernel);
                out.push((format!("{}.weight", conv.conv), vec![cout, cin, k, k]));
                out.push((format!("{}.bias", conv.conv), vec![cout]));
                for stat in ["weight", "bias", "running_mean", "running_var"] {
                    out.push((format!("{}.{stat}", conv.norm), vec![cout]));
                }
            }
            if block.tail == BlockTail::Upsample {
                let c = block.out_channels();
                out.push((format!("{}.weight", block.tail_prefix()), vec![c, c, 2, 2]));
                out.push((format!("{}.bias", block.tail_prefix()), vec![c]));
            }
        }
        out.push((
            format!("{}.weight", self.head.conv),
            vec![1, self.head.in_channels, 1, 1],
        ));
        out.push((format!("{}.bias", self.head.conv), vec![1]));
        out
    }
}
