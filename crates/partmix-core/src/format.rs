//! PCM sample formats and 16-bit float conversion.
//!
//! All audio handled by Partmix is signed 16-bit PCM, interleaved by
//! channel, in the byte order declared by the stream's format.

use crate::error::{PartmixError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scale used when converting between `i16` and normalized `f32`.
const PCM16_SCALE: f32 = 32767.0;

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Little,
    Big,
}

/// Format of a PCM byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PcmFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Bits per sample (only 16 is mixable).
    pub bits_per_sample: u16,
    /// Interleaved channel count.
    pub channels: u16,
    /// Sample byte order.
    pub byte_order: ByteOrder,
}

impl PcmFormat {
    /// 16-bit mono at the given rate.
    pub fn mono16(sample_rate: u32, byte_order: ByteOrder) -> Self {
        Self {
            sample_rate,
            bits_per_sample: 16,
            channels: 1,
            byte_order,
        }
    }

    /// Same encoding with a different channel count.
    pub fn with_channels(self, channels: u16) -> Self {
        Self { channels, ..self }
    }

    /// Bytes per sample.
    #[inline]
    pub fn sample_size(&self) -> usize {
        (self.bits_per_sample as usize).div_ceil(8)
    }

    /// Bytes per frame (one sample per channel).
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.sample_size() * self.channels as usize
    }

    /// Number of whole frames in `bytes` bytes.
    #[inline]
    pub fn frames_in(&self, bytes: u64) -> u64 {
        match self.frame_size() as u64 {
            0 => 0,
            size => bytes / size,
        }
    }

    /// Duration in seconds of `frames` frames.
    pub fn duration_secs(&self, frames: u64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        frames as f64 / self.sample_rate as f64
    }

    /// Check that this is a mixable input: 16-bit mono.
    pub fn ensure_mono16(&self) -> Result<()> {
        if self.bits_per_sample != 16 {
            return Err(PartmixError::UnsupportedSampleFormat(format!(
                "expected 16-bit samples, got {} bits",
                self.bits_per_sample
            )));
        }
        if self.channels != 1 {
            return Err(PartmixError::UnsupportedSampleFormat(format!(
                "expected mono input, got {} channels",
                self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(PartmixError::UnsupportedSampleFormat(
                "sample rate must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let order = match self.byte_order {
            ByteOrder::Little => "le",
            ByteOrder::Big => "be",
        };
        write!(
            f,
            "{} Hz, {}-bit {}, {} ch",
            self.sample_rate, self.bits_per_sample, order, self.channels
        )
    }
}

/// Decode 16-bit PCM bytes into normalized floats.
///
/// Converts `min(bytes.len() / 2, out.len())` samples and returns that count.
pub fn pcm16_to_f32(bytes: &[u8], order: ByteOrder, out: &mut [f32]) -> usize {
    let count = (bytes.len() / 2).min(out.len());
    for (dst, pair) in out[..count].iter_mut().zip(bytes.chunks_exact(2)) {
        let raw = [pair[0], pair[1]];
        let sample = match order {
            ByteOrder::Little => i16::from_le_bytes(raw),
            ByteOrder::Big => i16::from_be_bytes(raw),
        };
        *dst = (sample as f32 / PCM16_SCALE).max(-1.0);
    }
    count
}

/// Encode normalized floats as 16-bit PCM bytes, clamping to [-1, 1].
///
/// Converts `min(samples.len(), out.len() / 2)` samples and returns the
/// number of bytes written.
pub fn f32_to_pcm16(samples: &[f32], order: ByteOrder, out: &mut [u8]) -> usize {
    let count = samples.len().min(out.len() / 2);
    for (src, pair) in samples[..count].iter().zip(out.chunks_exact_mut(2)) {
        let sample = (src.clamp(-1.0, 1.0) * PCM16_SCALE).round() as i16;
        let raw = match order {
            ByteOrder::Little => sample.to_le_bytes(),
            ByteOrder::Big => sample.to_be_bytes(),
        };
        pair.copy_from_slice(&raw);
    }
    count * 2
}
