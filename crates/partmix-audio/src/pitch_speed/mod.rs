//! Pitch shifting and speed changes for part streams.
//!
//! The DSP runs push-style: a [`Dispatcher`] reads blocks from the source
//! and pushes them through a chain of [`AudioProcessor`]s on a worker
//! thread. [`PitchSpeedAdapter`] turns that back into a pull stream the
//! mixer can read from.

mod adapter;
mod pipeline;
mod stretch;
mod transposer;

pub use adapter::PitchSpeedAdapter;
pub use pipeline::{AudioProcessor, ChunkSink, Dispatcher, PushPipeline};
pub use stretch::TempoStretch;
pub use transposer::RateTransposer;

use crate::debugger::DebugSettings;
use partmix_core::limits::{MAX_PITCH_SHIFT, MAX_SPEED_FACTOR, MIN_PITCH_SHIFT, MIN_SPEED_FACTOR};
use partmix_core::{PartmixError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Adapter tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Processed chunks buffered between worker and reader.
    pub queue_capacity: usize,
    /// Frames read from the source per processing block.
    pub block_frames: usize,
    /// How long `close` waits for the worker before and after interrupting it.
    pub join_timeout: Duration,
    /// Trace a window of the processed output.
    pub debug: Option<DebugSettings>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10,
            block_frames: 4096,
            join_timeout: Duration::from_secs(1),
            debug: None,
        }
    }
}

/// A pitch shift and speed change applied together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchSpeed {
    /// Semitones, positive is higher.
    pub pitch_shift: i32,
    /// Playback speed, 2.0 halves the duration.
    pub speed_factor: f64,
}

impl Default for PitchSpeed {
    fn default() -> Self {
        Self {
            pitch_shift: 0,
            speed_factor: 1.0,
        }
    }
}

impl PitchSpeed {
    /// Build a transform, rejecting a pitch shift or speed factor outside
    /// the supported ranges.
    pub fn new(pitch_shift: i32, speed_factor: f64) -> Result<Self> {
        let transform = Self {
            pitch_shift,
            speed_factor,
        };
        transform.validate()?;
        Ok(transform)
    }

    /// Check both values are inside the supported ranges.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_PITCH_SHIFT..=MAX_PITCH_SHIFT).contains(&self.pitch_shift) {
            return Err(PartmixError::InvalidParameter(format!(
                "pitch shift {} outside [{MIN_PITCH_SHIFT}, {MAX_PITCH_SHIFT}]",
                self.pitch_shift
            )));
        }
        if !(MIN_SPEED_FACTOR..=MAX_SPEED_FACTOR).contains(&self.speed_factor) {
            return Err(PartmixError::InvalidParameter(format!(
                "speed factor {} outside [{MIN_SPEED_FACTOR}, {MAX_SPEED_FACTOR}]",
                self.speed_factor
            )));
        }
        Ok(())
    }

    /// True when neither pitch nor speed change.
    pub fn is_identity(&self) -> bool {
        self.pitch_shift == 0 && self.speed_factor == 1.0
    }

    /// Resampling factor that undoes the pitch change: `2^(-p/12)`.
    pub fn pitch_factor(&self) -> f64 {
        2f64.powf(-(self.pitch_shift as f64) / 12.0)
    }

    /// Tempo handed to the time stretcher: `pitch_factor * speed`.
    ///
    /// The stretcher hits the target duration scaled by the pitch factor and
    /// the rate transposer then resamples by the pitch factor alone.
    pub fn stretch_tempo(&self) -> f64 {
        self.pitch_factor() * self.speed_factor
    }

    /// Build the processing chain for a mono source at `sample_rate`.
    pub fn build_chain(
        &self,
        sample_rate: u32,
        block_frames: usize,
    ) -> Result<Vec<Box<dyn AudioProcessor>>> {
        let mut chain: Vec<Box<dyn AudioProcessor>> = Vec::new();
        let tempo = self.stretch_tempo();
        if (tempo - 1.0).abs() > f64::EPSILON {
            chain.push(Box::new(TempoStretch::new(sample_rate, tempo)?));
        }
        if self.pitch_shift != 0 {
            chain.push(Box::new(RateTransposer::new(
                self.pitch_factor(),
                block_frames,
            )?));
        }
        Ok(chain)
    }
}
