use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use quietmask::audio::{
    WavData, decode_wav_bytes, encode_wav_pcm16, read_wav_file, write_wav_pcm16,
};
use quietmask::constants::{SAMPLE_RATE_HZ, SEGMENT_SECONDS};
use quietmask::{DenoiseConfig, Denoiser, ModelBundle, Waveform};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "quietmask")]
#[command(about = "Remove background noise from speech recordings", long_about = None)]
struct Args {
    /// Path to a WAV file.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Read audio from stdin (WAV or raw s16le 16kHz mono).
    #[arg(long, default_value_t = false)]
    stdin: bool,

    /// Where to write the denoised 16-bit WAV. Defaults to stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Denoising strength: 0 keeps the input, 1 applies the full mask.
    #[arg(long, default_value_t = 1.0)]
    intensity: f32,

    /// Model directory with denoiser.json / model.safetensors.
    #[arg(long)]
    model_dir: PathBuf,

    /// Segment length for long inputs (50% overlap).
    #[arg(long, default_value_t = SEGMENT_SECONDS)]
    segment_seconds: f32,

    /// Validate the model directory without processing audio.
    #[arg(long, default_value_t = false)]
    inspect_model: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if args.inspect_model {
        return inspect_model(&args.model_dir);
    }

    let modes = u32::from(args.audio.is_some()) + u32::from(args.stdin);
    if modes != 1 {
        anyhow::bail!("choose exactly one input mode: --audio or --stdin");
    }

    let wav = if let Some(path) = &args.audio {
        read_wav_file(path).with_context(|| format!("read wav {}", path.display()))?
    } else {
        read_stdin()?
    };

    let config =
        DenoiseConfig::with_segment_seconds(args.segment_seconds).context("--segment-seconds")?;
    let bundle = ModelBundle::load_from_dir(&args.model_dir)
        .with_context(|| format!("load model from {}", args.model_dir.display()))?;
    let denoiser = Denoiser::new(&bundle, config).context("build denoiser")?;

    info!(
        source_rate = wav.sample_rate_hz,
        channels = wav.channels,
        samples = wav.samples_mono.len(),
        "input decoded"
    );
    let input: Waveform = wav.into_analysis_waveform();
    let output = denoiser
        .denoise(&input, args.intensity)
        .context("denoise")?;

    write_output(args.output.as_deref(), output.samples())
}

fn inspect_model(model_dir: &Path) -> Result<()> {
    let bundle = ModelBundle::load_from_dir(model_dir).context("load model bundle")?;
    eprintln!(
        "model ok: name={} base_channels={} parameters={} min_side={}",
        bundle.params.name.as_deref().unwrap_or("-"),
        bundle.params.network.base_channels,
        bundle.estimator.parameter_count(),
        bundle.estimator.layout().min_input_side(),
    );
    println!("{}", bundle.params.to_json_string()?);
    Ok(())
}

fn read_stdin() -> Result<WavData> {
    let mut buf = Vec::new();
    std::io::stdin()
        .read_to_end(&mut buf)
        .context("read stdin")?;

    if buf.len() >= 12 && &buf[0..4] == b"RIFF" && &buf[8..12] == b"WAVE" {
        return decode_wav_bytes(&buf).context("parse wav");
    }

    // raw s16le 16kHz mono
    if buf.len() % 2 != 0 {
        buf.pop();
    }
    let samples_mono = buf
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
        .collect();
    Ok(WavData {
        sample_rate_hz: SAMPLE_RATE_HZ,
        channels: 1,
        samples_mono,
    })
}

fn write_output(path: Option<&Path>, samples: &[f32]) -> Result<()> {
    match path {
        Some(path) => {
            write_wav_pcm16(path, samples, SAMPLE_RATE_HZ)
                .with_context(|| format!("write wav {}", path.display()))?;
            info!(path = %path.display(), samples = samples.len(), "wrote output");
        }
        None => {
            let bytes = encode_wav_pcm16(samples, SAMPLE_RATE_HZ).context("encode wav")?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).context("write stdout")?;
            stdout.flush().context("flush stdout")?;
        }
    }
    Ok(())
}
