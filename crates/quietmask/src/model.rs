//! Model directory loading: `denoiser.json` + `model.safetensors`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::params::DenoiserParams;
use crate::unet::MaskEstimator;
use crate::weights::{TensorSource, WeightStore};

pub const PARAMS_FILE: &str = "denoiser.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Validated parameters plus the inference-ready network, shared read-only.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    pub params: DenoiserParams,
    pub estimator: Arc<MaskEstimator>,
}

fn params_path(dir: &Path) -> PathBuf {
    dir.join(PARAMS_FILE)
}

fn weights_path(dir: &Path) -> PathBuf {
    dir.join(WEIGHTS_FILE)
}

impl ModelBundle {
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let params = DenoiserParams::from_path(params_path(dir)).context("load denoiser.json")?;
        let weights = WeightStore::open(weights_path(dir)).context("load model.safetensors")?;
        let bundle = Self::from_parts(params, &weights)?;
        info!(
            dir = %dir.display(),
            base_channels = bundle.params.network.base_channels,
            parameters = bundle.estimator.parameter_count(),
            "loaded denoiser model"
        );
        Ok(bundle)
    }

    /// Validate `params` and build the estimator from any tensor source.
    pub fn from_parts(params: DenoiserParams, weights: &impl TensorSource) -> Result<Self> {
        params.validate()?;
        let estimator = MaskEstimator::from_source(
            params.layout(),
            weights,
            params.network.batch_norm_eps,
            params.network.leaky_relu_slope,
        )
        .context("weights do not match the network layout")?;
        Ok(Self {
            params,
            estimator: Arc::new(estimator),
        })
    }
}
