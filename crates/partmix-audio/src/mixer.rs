//! Stream mixer: pulls aligned frames from N mono parts and mixes them
//! into a 1- or 2-channel (or pass-through) PCM stream.

use crate::debugger::{AudioDebugger, DebugSettings};
use crate::stream::{read_fully, AudioStream};
use partmix_core::{f32_to_pcm16, pcm16_to_f32, MixSpec, PartmixError, PcmFormat, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use tracing::debug;

/// Mixer tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerConfig {
    /// Largest batch of frames mixed per `read` call.
    pub buffer_frames: usize,
    /// Trace a window of the mixed output.
    pub debug: Option<DebugSettings>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            buffer_frames: 4096,
            debug: None,
        }
    }
}

/// Pull-based N-to-M mixing stream.
///
/// Every `read` pulls the same number of frames from each input, mixes them
/// through the [`MixSpec`] and hands back 16-bit PCM in the inputs' byte
/// order. When one input delivers fewer frames than the others the batch is
/// cut to the shortest read; once any input is exhausted the mix ends.
pub struct StreamMixer {
    inputs: Vec<Box<dyn AudioStream>>,
    spec: MixSpec,
    input_format: PcmFormat,
    output_format: PcmFormat,
    buffer_frames: usize,
    /// Raw bytes of one input batch.
    raw: Vec<u8>,
    /// Decoded samples per input.
    float_inputs: Vec<Vec<f32>>,
    /// Interleaved mixed samples.
    float_output: Vec<f32>,
    /// Encoded frame only partly handed out by the previous `read`.
    carry: Vec<u8>,
    carry_pos: usize,
    frames_mixed: u64,
    finished: bool,
    debugger: AudioDebugger,
}

impl StreamMixer {
    /// Create a mixer over `inputs`.
    ///
    /// All inputs must be 16-bit mono with the same sample rate and byte
    /// order, and `spec` must consume exactly `inputs.len()` channels.
    pub fn new(
        inputs: Vec<Box<dyn AudioStream>>,
        spec: MixSpec,
        config: &MixerConfig,
    ) -> Result<Self> {
        let first = inputs.first().map(|input| input.format()).ok_or_else(|| {
            PartmixError::InvalidParameter("mixer needs at least one input".into())
        })?;

        if spec.input_count() != inputs.len() {
            return Err(PartmixError::InvalidMixSpec(format!(
                "spec mixes {} inputs but {} were supplied",
                spec.input_count(),
                inputs.len()
            )));
        }

        for (index, input) in inputs.iter().enumerate() {
            let format = input.format();
            format.ensure_mono16().map_err(|e| {
                PartmixError::UnsupportedSampleFormat(format!("input {index}: {e}"))
            })?;
            if format.sample_rate != first.sample_rate || format.byte_order != first.byte_order {
                return Err(PartmixError::UnsupportedSampleFormat(format!(
                    "input {index} is {format}, expected {first}"
                )));
            }
        }

        if config.buffer_frames == 0 {
            return Err(PartmixError::InvalidParameter(
                "mixer buffer must hold at least one frame".into(),
            ));
        }

        let output_channels = u16::try_from(spec.output_count()).map_err(|_| {
            PartmixError::InvalidMixSpec(format!("{} output channels", spec.output_count()))
        })?;
        let output_format = first.with_channels(output_channels);
        let buffer_frames = config.buffer_frames;

        debug!(
            inputs = inputs.len(),
            format = %first,
            spec = %spec,
            "Stream mixer created"
        );

        Ok(Self {
            float_inputs: vec![vec![0.0; buffer_frames]; inputs.len()],
            float_output: vec![0.0; buffer_frames * spec.output_count()],
            raw: vec![0; buffer_frames * first.frame_size()],
            carry: Vec::new(),
            carry_pos: 0,
            inputs,
            spec,
            input_format: first,
            output_format,
            buffer_frames,
            frames_mixed: 0,
            finished: false,
            debugger: AudioDebugger::new("mixer.out", config.debug.clone()),
        })
    }

    /// The mix being applied.
    pub fn spec(&self) -> &MixSpec {
        &self.spec
    }

    /// Format shared by all inputs.
    pub fn input_format(&self) -> PcmFormat {
        self.input_format
    }

    /// Total frames emitted so far.
    pub fn frames_mixed(&self) -> u64 {
        self.frames_mixed
    }

    /// Output debugger (for inspecting a captured window).
    pub fn debugger(&self) -> &AudioDebugger {
        &self.debugger
    }

    /// Pull up to `frames` frames from every input and mix them.
    /// Returns the number of frames now in `float_output`.
    fn mix_batch(&mut self, frames: usize) -> io::Result<usize> {
        let in_frame = self.input_format.frame_size();
        let order = self.input_format.byte_order;
        let mut min_frames = frames;

        for (input, samples) in self.inputs.iter_mut().zip(self.float_inputs.iter_mut()) {
            let raw = &mut self.raw[..frames * in_frame];
            let got = read_fully(input, raw)? / in_frame;
            pcm16_to_f32(&raw[..got * in_frame], order, &mut samples[..got]);
            min_frames = min_frames.min(got);
        }

        if min_frames == 0 {
            return Ok(0);
        }

        let inputs: Vec<&[f32]> = self
            .float_inputs
            .iter()
            .map(|samples| &samples[..min_frames])
            .collect();
        self.spec.mix(&inputs, &mut self.float_output, min_frames);
        Ok(min_frames)
    }
}

impl Read for StreamMixer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.carry_pos < self.carry.len() {
            let rest = &self.carry[self.carry_pos..];
            let n = rest.len().min(buf.len());
            buf[..n].copy_from_slice(&rest[..n]);
            self.carry_pos += n;
            return Ok(n);
        }
        if self.finished {
            return Ok(0);
        }

        let out_frame = self.output_format.frame_size();
        let requested = (buf.len() / out_frame).clamp(1, self.buffer_frames);
        let frames = self.mix_batch(requested)?;
        if frames == 0 {
            self.finished = true;
            debug!(frames = self.frames_mixed, "Mix stream exhausted");
            return Ok(0);
        }

        let channels = self.output_format.channels as usize;
        let order = self.output_format.byte_order;
        let mixed = &self.float_output[..frames * channels];
        self.debugger.observe(mixed, channels);
        self.frames_mixed += frames as u64;
        if buf.len() >= out_frame {
            return Ok(f32_to_pcm16(mixed, order, buf));
        }

        // Smaller than one frame: hand out the head, keep the tail.
        self.carry.resize(out_frame, 0);
        f32_to_pcm16(mixed, order, &mut self.carry);
        let n = buf.len();
        buf.copy_from_slice(&self.carry[..n]);
        self.carry_pos = n;
        Ok(n)
    }
}

impl AudioStream for StreamMixer {
    fn format(&self) -> PcmFormat {
        self.output_format
    }

    fn close(&mut self) -> io::Result<()> {
        let mut first_error = None;
        for input in &mut self.inputs {
            if let Err(e) = input.close() {
                first_error.get_or_insert(e);
            }
        }
        self.finished = true;
        self.carry.clear();
        self.carry_pos = 0;
        first_error.map_or(Ok(()), Err)
    }
}
