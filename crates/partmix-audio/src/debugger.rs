//! Bounded-window sample tracer for diagnosing buffer issues.
//!
//! A debugger is handed every buffer that passes a given point in the
//! pipeline. When enabled it traces and keeps the samples that fall inside
//! a fixed frame window; when disabled `observe` returns immediately.

use partmix_core::{pcm16_to_f32, PcmFormat};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, trace};

/// Which frames to trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    /// Prefix for trace output, combined with the debugger's own name.
    pub label: String,
    /// First frame to capture.
    pub start_frame: u64,
    /// Number of frames to capture.
    pub frame_count: u64,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            label: "partmix".into(),
            start_frame: 0,
            frame_count: 1024,
        }
    }
}

impl DebugSettings {
    /// Frame range covered by the window.
    pub fn window(&self) -> Range<u64> {
        self.start_frame..self.start_frame.saturating_add(self.frame_count)
    }
}

/// Sample tracer attached to one point of a stream.
#[derive(Debug)]
pub struct AudioDebugger {
    name: String,
    settings: Option<DebugSettings>,
    position: u64,
    captured: Vec<f32>,
}

impl AudioDebugger {
    /// Create a debugger; `None` settings disable it.
    pub fn new(name: impl Into<String>, settings: Option<DebugSettings>) -> Self {
        Self {
            name: name.into(),
            settings,
            position: 0,
            captured: Vec::new(),
        }
    }

    /// A debugger that never records anything.
    pub fn disabled() -> Self {
        Self::new("", None)
    }

    /// Whether samples are being traced.
    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.settings.is_some()
    }

    /// Frames observed so far (only counted while enabled).
    pub fn frames_seen(&self) -> u64 {
        self.position
    }

    /// Interleaved samples captured inside the window.
    pub fn captured(&self) -> &[f32] {
        &self.captured
    }

    /// Observe interleaved float samples with `channels` channels.
    #[inline]
    pub fn observe(&mut self, samples: &[f32], channels: usize) {
        let Some(settings) = &self.settings else {
            return;
        };
        let channels = channels.max(1);
        let frames = (samples.len() / channels) as u64;
        let window = settings.window();
        let batch = self.position..self.position + frames;

        let start = window.start.max(batch.start);
        let end = window.end.min(batch.end);
        if start < end {
            let from = ((start - batch.start) as usize) * channels;
            let to = ((end - batch.start) as usize) * channels;
            for (i, frame) in samples[from..to].chunks_exact(channels).enumerate() {
                trace!(
                    label = %settings.label,
                    point = %self.name,
                    frame = start + i as u64,
                    samples = ?frame,
                    "sample"
                );
            }
            self.captured.extend_from_slice(&samples[from..to]);

            if end == window.end {
                let peak = self.captured.iter().fold(0.0f32, |m, s| m.max(s.abs()));
                let rms = (self.captured.iter().map(|s| s * s).sum::<f32>()
                    / self.captured.len().max(1) as f32)
                    .sqrt();
                debug!(
                    label = %settings.label,
                    point = %self.name,
                    frames = window.end - window.start,
                    peak,
                    rms,
                    "Debug window complete"
                );
            }
        }
        self.position = batch.end;
    }

    /// Observe raw 16-bit PCM bytes in `format`.
    pub fn observe_pcm16(&mut self, bytes: &[u8], format: &PcmFormat) {
        if !self.is_enabled() {
            return;
        }
        let mut samples = vec![0.0f32; bytes.len() / 2];
        let count = pcm16_to_f32(bytes, format.byte_order, &mut samples);
        self.observe(&samples[..count], format.channels as usize);
    }
}
