//! Partmix Audio - Streaming part mixer
//!
//! Turns a set of mono part recordings into a mixed PCM stream.
//!
//! Architecture:
//! - `AudioStream`: pull-based PCM byte stream with a declared format
//! - `StreamMixer`: reads aligned frames from every part and applies a `MixSpec`
//! - `PitchSpeedAdapter`: runs the push-based pitch/speed DSP on a worker
//!   thread and exposes its output as an `AudioStream`
//! - `AudioDebugger`: optional sample tracer for a fixed frame window

pub mod debugger;
pub mod mixer;
pub mod pitch_speed;
pub mod stream;

pub use debugger::{AudioDebugger, DebugSettings};
pub use mixer::{MixerConfig, StreamMixer};
pub use pitch_speed::{AdapterConfig, PitchSpeed, PitchSpeedAdapter};
pub use stream::{read_fully, AudioStream, PcmStream};
