//! Fixed-ratio resampling that shifts pitch and duration together.

use super::pipeline::AudioProcessor;
use partmix_core::{PartmixError, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::io;

fn resample_error(e: rubato::ResampleError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("rate transposer: {e}"))
}

/// Mono resampler producing `factor` output samples per input sample.
///
/// Played back at the original rate, `factor < 1.0` raises pitch and
/// shortens the audio. Input is gathered into fixed-size chunks; the
/// resampler's leading delay is dropped so output lines up with input.
pub struct RateTransposer {
    resampler: SincFixedIn<f32>,
    factor: f64,
    pending: Vec<f32>,
    consumed: u64,
    produced: u64,
    delay_left: usize,
}

impl RateTransposer {
    pub fn new(factor: f64, chunk_frames: usize) -> Result<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(PartmixError::InvalidParameter(format!(
                "transposer factor must be positive, got {factor}"
            )));
        }
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };
        let resampler = SincFixedIn::<f32>::new(factor, 1.1, params, chunk_frames.max(1), 1)
            .map_err(|e| PartmixError::Processing(format!("rate transposer: {e}")))?;
        let delay_left = resampler.output_delay();

        Ok(Self {
            resampler,
            factor,
            pending: Vec::new(),
            consumed: 0,
            produced: 0,
            delay_left,
        })
    }

    /// Resampling factor.
    pub fn factor(&self) -> f64 {
        self.factor
    }

    fn emit(&mut self, channels: Vec<Vec<f32>>, output: &mut Vec<f32>) {
        let Some(samples) = channels.into_iter().next() else {
            return;
        };
        let skip = self.delay_left.min(samples.len());
        self.delay_left -= skip;
        self.produced += (samples.len() - skip) as u64;
        output.extend_from_slice(&samples[skip..]);
    }
}

impl AudioProcessor for RateTransposer {
    fn process(&mut self, block: Vec<f32>) -> io::Result<Vec<f32>> {
        self.consumed += block.len() as u64;
        self.pending.extend_from_slice(&block);

        let mut output = Vec::new();
        while self.pending.len() >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let wave_in = vec![self.pending.drain(..needed).collect::<Vec<f32>>()];
            let resampled = self
                .resampler
                .process(&wave_in, None)
                .map_err(resample_error)?;
            self.emit(resampled, &mut output);
        }
        Ok(output)
    }

    fn finish(&mut self) -> io::Result<Vec<f32>> {
        let expected = (self.consumed as f64 * self.factor).round() as u64;
        let mut output = Vec::new();

        if !self.pending.is_empty() {
            let wave_in = vec![std::mem::take(&mut self.pending)];
            let resampled = self
                .resampler
                .process_partial(Some(wave_in.as_slice()), None)
                .map_err(resample_error)?;
            self.emit(resampled, &mut output);
        }

        // Drain the filter delay with empty input until the expected length is reached.
        while self.produced < expected {
            let resampled = self
                .resampler
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(resample_error)?;
            if resampled.first().map_or(true, |s| s.is_empty()) {
                break;
            }
            self.emit(resampled, &mut output);
        }

        if self.produced > expected {
            let excess = (self.produced - expected) as usize;
            output.truncate(output.len().saturating_sub(excess));
            self.produced = expected;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(factor: f64, input_frames: usize, block: usize) -> Vec<f32> {
        let mut transposer = RateTransposer::new(factor, 512).unwrap();
        let mut out = Vec::new();
        let input: Vec<f32> = (0..input_frames)
            .map(|i| (i as f32 * 0.05).sin() * 0.5)
            .collect();
        for chunk in input.chunks(block) {
            out.extend(transposer.process(chunk.to_vec()).unwrap());
        }
        out.extend(transposer.finish().unwrap());
        out
    }

    #[test]
    fn test_total_length_is_scaled() {
        assert_eq!(run(0.5, 4000, 300).len(), 2000);
        assert_eq!(run(1.5, 3000, 700).len(), 4500);
    }

    #[test]
    fn test_rejects_bad_factor() {
        assert!(RateTransposer::new(0.0, 512).is_err());
        assert!(RateTransposer::new(-1.0, 512).is_err());
    }
}
