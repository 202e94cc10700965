//! Analysis, network and reconstruction constants.

// Spectral analysis (matches the trained model's front end).
pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const N_FFT: usize = 512;
pub const HOP_LENGTH: usize = 128; // 8ms @ 16kHz
pub const N_FREQ: usize = N_FFT / 2 + 1; // 257

// Mask network.
pub const BASE_CHANNELS: usize = 16;
pub const ENCODER_LEVELS: usize = 4;
pub const LEAKY_RELU_SLOPE: f32 = 0.2;
pub const BATCH_NORM_EPS: f32 = 1e-5;

// Long-audio segmentation.
pub const SEGMENT_SECONDS: f32 = 10.0;
pub const SEGMENT_SAMPLES: usize = 160_000; // 10s @ 16kHz
pub const SEGMENT_HOP_SAMPLES: usize = SEGMENT_SAMPLES / 2;

/// Guard for overlap-count division and peak normalization.
pub const MERGE_EPS: f32 = 1e-8;

/// Version of the `denoiser.json` / `model.safetensors` layout this crate reads.
pub const MODEL_FORMAT_VERSION: u32 = 1;
