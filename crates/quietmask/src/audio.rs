//! WAV ingestion and output helpers.
//!
//! These sit in front of the denoiser: decode, downmix to mono, resample to the
//! analysis rate. The core never calls them and never repairs its input.

use std::io::Cursor;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use thiserror::Error;

use crate::constants::SAMPLE_RATE_HZ;
use crate::waveform::Waveform;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),
    #[error("unsupported WAV format: {format:?} {bits}-bit")]
    UnsupportedFormat { format: SampleFormat, bits: u16 },
    #[error("WAV declares zero channels")]
    NoChannels,
}

#[derive(Debug, Clone)]
pub struct WavData {
    pub sample_rate_hz: u32,
    pub channels: u16,
    pub samples_mono: Vec<f32>,
}

impl WavData {
    /// Resample to the analysis rate and wrap as a mono [`Waveform`].
    #[must_use]
    pub fn into_analysis_waveform(self) -> Waveform {
        Waveform::mono(resample_linear(
            &self.samples_mono,
            self.sample_rate_hz,
            SAMPLE_RATE_HZ,
        ))
    }
}

/// Resample `input` from `src_hz` to `dst_hz` by linear interpolation.
///
/// Output length is `floor(len * dst / src)`; the last input sample is held
/// past the end of the buffer.
#[must_use]
pub fn resample_linear(input: &[f32], src_hz: u32, dst_hz: u32) -> Vec<f32> {
    if src_hz == dst_hz || src_hz == 0 || input.is_empty() {
        return input.to_vec();
    }

    let (src, dst) = (u64::from(src_hz), u64::from(dst_hz));
    let out_len = (input.len() as u64 * dst / src) as usize;
    let last = input.len() - 1;

    (0..out_len as u64)
        .map(|n| {
            // Exact rational position n * src / dst, split into index and remainder.
            let num = n * src;
            let left = ((num / dst) as usize).min(last);
            let t = (num % dst) as f32 / dst as f32;
            let right = input[(left + 1).min(last)];
            input[left] + (right - input[left]) * t
        })
        .collect()
}

fn downmix<I>(samples: I, channels: u16) -> Vec<f32>
where
    I: Iterator<Item = f32>,
{
    let channels = usize::from(channels);
    if channels == 1 {
        return samples.collect();
    }
    let interleaved: Vec<f32> = samples.collect();
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

fn decode<R: std::io::Read>(reader: WavReader<R>) -> Result<WavData, AudioError> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::NoChannels);
    }

    let samples_mono = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => {
            let samples = reader.into_samples::<f32>().collect::<Result<Vec<_>, _>>()?;
            downmix(samples.into_iter(), spec.channels)
        }
        (SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            let samples = reader.into_samples::<i32>().collect::<Result<Vec<_>, _>>()?;
            downmix(samples.into_iter().map(|s| s as f32 * scale), spec.channels)
        }
        (format, bits) => return Err(AudioError::UnsupportedFormat { format, bits }),
    };

    Ok(WavData {
        sample_rate_hz: spec.sample_rate,
        channels: spec.channels,
        samples_mono,
    })
}

/// Decode WAV bytes into mono `f32` at the file's own sample rate.
///
/// Supports integer PCM at 8/16/24/32 bits and 32-bit float; channels are averaged.
pub fn decode_wav_bytes(data: &[u8]) -> Result<WavData, AudioError> {
    decode(WavReader::new(Cursor::new(data))?)
}

pub fn read_wav_file(path: impl AsRef<Path>) -> Result<WavData, AudioError> {
    decode(WavReader::open(path)?)
}

fn pcm16_spec(sample_rate_hz: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

fn to_pcm16(v: f32) -> i16 {
    (v.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

/// Encode mono samples as a 16-bit PCM WAV file in memory.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate_hz: u32) -> Result<Vec<u8>, AudioError> {
    let mut cursor = Cursor::new(Vec::new());
    let mut writer = WavWriter::new(&mut cursor, pcm16_spec(sample_rate_hz))?;
    for &s in samples {
        writer.write_sample(to_pcm16(s))?;
    }
    writer.finalize()?;
    Ok(cursor.into_inner())
}

pub fn write_wav_pcm16(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate_hz: u32,
) -> Result<(), AudioError> {
    let mut writer = WavWriter::create(path, pcm16_spec(sample_rate_hz))?;
    for &s in samples {
        writer.write_sample(to_pcm16(s))?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use hound::{SampleFormat, WavSpec, WavWriter};

    use super::*;

    fn wav_bytes<S: hound::Sample + Copy>(spec: WavSpec, samples: &[S]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        let mut w = WavWriter::new(&mut cursor, spec).expect("writer");
        for &s in samples {
            w.write_sample(s).expect("write");
        }
        w.finalize().expect("finalize");
        cursor.into_inner()
    }

    #[test]
    fn matching_rates_are_untouched() {
        let x = [0.3f32, -0.2, 0.9];
        assert_eq!(resample_linear(&x, 16_000, 16_000), x);
    }

    #[test]
    fn downsampled_length_is_floored() {
        // 16000 * 16000 / 44100 = 5804.98...
        let y = resample_linear(&[0.0f32; 16_000], 44_100, 16_000);
        assert_eq!(y.len(), 5_804);
    }

    #[test]
    fn upsampling_interpolates_and_holds_the_tail() {
        let y = resample_linear(&[0.0, 1.0, 2.0], 8_000, 16_000);
        assert_eq!(y, vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.0]);
    }

    #[test]
    fn stereo_pcm16_is_averaged_to_mono() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[16_384i16, 0, -32_768, -32_768]);
        let wav = decode_wav_bytes(&bytes).expect("decode");
        assert_eq!(wav.sample_rate_hz, 44_100);
        assert_eq!(wav.channels, 2);
        assert_eq!(wav.samples_mono, vec![0.25, -1.0]);
    }

    #[test]
    fn float_and_24_bit_inputs_decode() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let wav = decode_wav_bytes(&wav_bytes(spec, &[0.5f32, -0.25])).expect("float");
        assert_eq!(wav.samples_mono, vec![0.5, -0.25]);

        let spec = WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 24,
            sample_format: SampleFormat::Int,
        };
        let wav = decode_wav_bytes(&wav_bytes(spec, &[1 << 22, -(1 << 23)])).expect("24-bit");
        assert_eq!(wav.samples_mono, vec![0.5, -1.0]);
    }

    #[test]
    fn pcm16_encode_decodes_back() {
        let samples = [0.0f32, 0.5, -0.5, 1.0, -1.2];
        let bytes = encode_wav_pcm16(&samples, 16_000).expect("encode");
        let wav = decode_wav_bytes(&bytes).expect("decode");
        assert_eq!(wav.sample_rate_hz, 16_000);
        assert_eq!(wav.samples_mono.len(), samples.len());
        for (a, b) in wav.samples_mono.iter().zip(samples) {
            assert!((a - b.clamp(-1.0, 1.0)).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn resampled_waveform_is_analysis_ready() {
        let wav = WavData {
            sample_rate_hz: 8_000,
            channels: 2,
            samples_mono: vec![0.1; 800],
        };
        let w = wav.into_analysis_waveform();
        assert_eq!(w.sample_rate_hz(), 16_000);
        assert_eq!(w.channels(), 1);
        assert_eq!(w.len(), 1600);
    }

    #[test]
    fn garbage_bytes_are_an_error() {
        assert!(matches!(
            decode_wav_bytes(b"not a wav file at all"),
            Err(AudioError::Wav(_))
        ));
    }
}
