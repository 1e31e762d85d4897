//! Tempo change without pitch change, via signalsmith-stretch.

use super::pipeline::AudioProcessor;
use partmix_core::{PartmixError, Result};
use signalsmith_stretch::Stretch;
use std::io;

/// Mono time stretcher.
///
/// `tempo > 1.0` shortens the audio, `tempo < 1.0` lengthens it. Output
/// lengths are tracked cumulatively so rounding never drifts across blocks.
pub struct TempoStretch {
    stretcher: Stretch,
    tempo: f64,
    consumed: u64,
    produced: u64,
}

impl TempoStretch {
    pub fn new(sample_rate: u32, tempo: f64) -> Result<Self> {
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(PartmixError::InvalidParameter(format!(
                "stretch tempo must be positive, got {tempo}"
            )));
        }
        Ok(Self {
            stretcher: Stretch::preset_default(1, sample_rate),
            tempo,
            consumed: 0,
            produced: 0,
        })
    }

    /// Tempo factor applied.
    pub fn tempo(&self) -> f64 {
        self.tempo
    }
}

impl AudioProcessor for TempoStretch {
    fn process(&mut self, block: Vec<f32>) -> io::Result<Vec<f32>> {
        if block.is_empty() {
            return Ok(block);
        }
        self.consumed += block.len() as u64;
        let target = (self.consumed as f64 / self.tempo).round() as u64;
        let mut output = vec![0.0f32; target.saturating_sub(self.produced) as usize];
        self.stretcher.process(&block[..], &mut output[..]);
        self.produced = target.max(self.produced);
        Ok(output)
    }

    fn finish(&mut self) -> io::Result<Vec<f32>> {
        let mut tail = vec![0.0f32; self.stretcher.output_latency()];
        self.stretcher.flush(&mut tail[..]);
        Ok(tail)
    }
}
