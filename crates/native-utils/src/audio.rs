use anyhow::Context;
use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use std::collections::VecDeque;

/// Sample rate the Live API expects for realtime audio input.
pub const GEMINI_INPUT_PCM16_SAMPLE_RATE: f64 = 16000.0;
/// Sample rate of the audio chunks the Live API sends back.
pub const GEMINI_OUTPUT_PCM16_SAMPLE_RATE: f64 = 24000.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Averages interleaved frames down to a single channel.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels > 1 {
        data.chunks(channels)
            .map(|c| c.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        data.to_vec()
    }
}

/// Buffers a continuous sample stream and resamples it in fixed-size chunks.
///
/// Samples that do not yet fill a whole chunk stay pending until the next
/// [`ChunkedResampler::push`].
pub struct ChunkedResampler {
    resampler: FastFixedIn<f32>,
    chunk_size: usize,
    pending: VecDeque<f32>,
}

impl ChunkedResampler {
    pub fn new(in_sampling_rate: f64, out_sampling_rate: f64, chunk_size: usize) -> anyhow::Result<Self> {
        Ok(Self {
            resampler: create_resampler(in_sampling_rate, out_sampling_rate, chunk_size)?,
            chunk_size,
            pending: VecDeque::with_capacity(chunk_size * 2),
        })
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        self.pending.extend(samples.iter().copied());
        let mut resampled: Vec<f32> = vec![];
        while self.pending.len() >= self.chunk_size {
            let chunk: Vec<f32> = self.pending.drain(..self.chunk_size).collect();
            match self.resampler.process(&[chunk.as_slice()], None) {
                Ok(resamples) => {
                    if let Some(resamples) = resamples.first() {
                        resampled.extend(resamples.iter().cloned());
                    }
                }
                Err(e) => tracing::warn!("Failed to resample input chunk: {}", e),
            }
        }
        resampled
    }

    /// Drops pending samples and the resampler's filter history.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.resampler.reset();
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Decodes base64 little-endian PCM16 into samples in `[-1.0, 1.0]`.
pub fn decode(pcm16_base64: &str) -> anyhow::Result<Vec<f32>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(pcm16_base64)
        .context("Audio payload is not valid base64")?;
    if bytes.len() % 2 != 0 {
        anyhow::bail!("PCM16 payload has an odd length of {} bytes", bytes.len());
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Encodes samples as base64 little-endian PCM16.
pub fn encode(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(samples.to_binary())
}

/// Raw little-endian PCM16 bytes, the form the speech socket takes.
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [f32] {
    fn to_binary(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len() * 2);
        for sample in self {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_encoding_is_little_endian() {
        let bytes = [0.5f32, -1.0].to_binary();
        assert_eq!(bytes, vec![0x00, 0x40, 0x00, 0x80]);
        assert_eq!(decode(&encode(&[0.5, -1.0])).unwrap(), vec![0.5, -1.0]);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert!(decode("not base64!!").is_err());
        // Three bytes cannot be whole PCM16 samples.
        assert!(decode("AAAA").is_err());
    }

    #[test]
    fn downmix_averages_frames() {
        assert_eq!(downmix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix_to_mono(&[0.25, 0.75], 1), vec![0.25, 0.75]);
    }

    #[test]
    fn chunked_resampler_waits_for_full_chunks() {
        let mut resampler = ChunkedResampler::new(48000.0, 16000.0, 2048).unwrap();
        assert!(resampler.push(&vec![0.1; 1000]).is_empty());
        assert_eq!(resampler.pending(), 1000);

        let out = resampler.push(&vec![0.1; 1048]);
        assert!(!out.is_empty());
        assert!(out.len() < 2048);
        assert_eq!(resampler.pending(), 0);

        resampler.push(&vec![0.1; 10]);
        resampler.clear();
        assert_eq!(resampler.pending(), 0);
    }

    #[test]
    fn chunked_resampler_carries_the_remainder_instead_of_padding() {
        let mut resampler = ChunkedResampler::new(24000.0, 48000.0, 100).unwrap();
        resampler.push(&vec![0.2; 150]);
        assert_eq!(resampler.pending(), 50);
        resampler.push(&vec![0.2; 50]);
        assert_eq!(resampler.pending(), 0);
    }
}
