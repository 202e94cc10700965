//! Spectral-mask speech denoising.
//!
//! A waveform is peak-normalized, cut into overlapping segments, and each
//! segment's log-magnitude spectrogram is run through a U-Net that predicts a
//! suppression mask. The masked spectrogram is resynthesized with the original
//! phase and the segments are merged by overlap-add.
//!
//! ```no_run
//! use quietmask::{DenoiseConfig, Denoiser, ModelBundle, Waveform};
//!
//! # fn main() -> anyhow::Result<()> {
//! let bundle = ModelBundle::load_from_dir("models/denoiser")?;
//! let denoiser = Denoiser::new(&bundle, DenoiseConfig::default())?;
//! let clean = denoiser.denoise(&Waveform::mono(vec![0.0; 16_000]), 0.8)?;
//! assert_eq!(clean.len(), 16_000);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod constants;
pub mod error;
pub mod grid;
pub mod intensity;
pub mod layout;
pub mod model;
pub mod normalize;
pub mod ops;
pub mod params;
pub mod pipeline;
pub mod segment;
pub mod stft;
pub mod unet;
pub mod waveform;
pub mod weights;

pub use error::DenoiseError;
pub use grid::{Grid, Mask};
pub use intensity::Intensity;
pub use model::ModelBundle;
pub use pipeline::{DenoiseConfig, Denoiser};
pub use waveform::Waveform;
