//! Model parameter file (`denoiser.json`) parsing.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{
    BASE_CHANNELS, BATCH_NORM_EPS, HOP_LENGTH, LEAKY_RELU_SLOPE, MODEL_FORMAT_VERSION, N_FFT,
    SAMPLE_RATE_HZ,
};
use crate::layout::NetworkLayout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenoiserParams {
    pub format_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub analysis: AnalysisArgs,
    #[serde(default)]
    pub network: NetworkArgs,
}

/// Front end the weights were trained against. Must equal the fixed transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArgs {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkArgs {
    #[serde(default = "default_base_channels")]
    pub base_channels: usize,
    #[serde(default = "default_batch_norm_eps")]
    pub batch_norm_eps: f32,
    #[serde(default = "default_leaky_relu_slope")]
    pub leaky_relu_slope: f32,
}

fn default_base_channels() -> usize {
    BASE_CHANNELS
}

fn default_batch_norm_eps() -> f32 {
    BATCH_NORM_EPS
}

fn default_leaky_relu_slope() -> f32 {
    LEAKY_RELU_SLOPE
}

impl Default for NetworkArgs {
    fn default() -> Self {
        Self {
            base_channels: BASE_CHANNELS,
            batch_norm_eps: BATCH_NORM_EPS,
            leaky_relu_slope: LEAKY_RELU_SLOPE,
        }
    }
}

impl Default for DenoiserParams {
    fn default() -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            name: None,
            analysis: AnalysisArgs {
                sample_rate: SAMPLE_RATE_HZ,
                n_fft: N_FFT,
                hop_length: HOP_LENGTH,
            },
            network: NetworkArgs::default(),
        }
    }
}

impl DenoiserParams {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json).context("parse denoiser.json")?;
        params.validate()?;
        Ok(params)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let json = std::fs::read_to_string(path_ref)
            .with_context(|| format!("read {}", path_ref.display()))?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize denoiser.json")
    }

    #[must_use]
    pub fn layout(&self) -> NetworkLayout {
        NetworkLayout::with_base_channels(self.network.base_channels)
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.analysis;
        let n = &self.network;

        anyhow::ensure!(
            self.format_version == MODEL_FORMAT_VERSION,
            "unsupported format_version {} (expected {MODEL_FORMAT_VERSION})",
            self.format_version
        );
        anyhow::ensure!(
            a.sample_rate == SAMPLE_RATE_HZ,
            "model expects {} Hz audio, analysis runs at {SAMPLE_RATE_HZ} Hz",
            a.sample_rate
        );
        anyhow::ensure!(
            a.n_fft == N_FFT && a.hop_length == HOP_LENGTH,
            "model trained with n_fft={} hop={}, analysis uses n_fft={N_FFT} hop={HOP_LENGTH}",
            a.n_fft,
            a.hop_length
        );
        anyhow::ensure!(n.base_channels > 0, "base_channels must be > 0");
        anyhow::ensure!(
            n.batch_norm_eps.is_finite() && n.batch_norm_eps >= 0.0,
            "batch_norm_eps must be finite and >= 0"
        );
        anyhow::ensure!(
            n.leaky_relu_slope.is_finite(),
            "leaky_relu_slope must be finite"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DenoiserParams;

    #[test]
    fn parse_params_smoke() {
        let json = r#"
        {
          "format_version": 1,
          "name": "unet-denoiser-16k",
          "analysis": { "sample_rate": 16000, "n_fft": 512, "hop_length": 128 },
          "network": { "base_channels": 16, "batch_norm_eps": 1e-05 }
        }
        "#;
        let p = DenoiserParams::from_json_str(json).expect("params parse");
        assert_eq!(p.name.as_deref(), Some("unet-denoiser-16k"));
        assert_eq!(p.network.base_channels, 16);
        assert_eq!(p.network.leaky_relu_slope, 0.2);
        assert_eq!(p.layout().bottleneck().out_channels(), 256);
    }

    #[test]
    fn network_section_is_optional() {
        let json = r#"{"format_version": 1, "analysis": {"sample_rate": 16000, "n_fft": 512, "hop_length": 128}}"#;
        let p = DenoiserParams::from_json_str(json).expect("params parse");
        assert_eq!(p, DenoiserParams::default());
    }

    #[test]
    fn rejects_mismatched_front_end_and_version() {
        let mut p = DenoiserParams::default();
        p.analysis.hop_length = 256;
        assert!(p.validate().is_err());

        let mut p = DenoiserParams::default();
        p.analysis.sample_rate = 22_050;
        assert!(p.validate().is_err());

        let mut p = DenoiserParams::default();
        p.format_version = 2;
        let err = p.validate().expect_err("version");
        assert!(err.to_string().contains("format_version"));

        let mut p = DenoiserParams::default();
        p.network.base_channels = 0;
        assert!(p.validate().is_err());
    }

    #[test]
    fn serialized_form_parses_back() {
        let mut p = DenoiserParams::default();
        p.name = Some("fixture".to_string());
        let json = p.to_json_string().expect("serialize");
        assert_eq!(DenoiserParams::from_json_str(&json).expect("parse"), p);
    }
}
