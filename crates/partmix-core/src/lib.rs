//! Partmix Core - Foundation types for part mixing
//!
//! This crate provides the value types shared by the audio and task layers:
//! - PCM sample formats and 16-bit float conversion
//! - Mix specifications (mono, stereo, all-channels)
//! - The mix-description parser ("Bari left", "Full Mix", JSON specs)

pub mod error;
pub mod format;
pub mod mix;

pub use error::{PartmixError, Result};
pub use format::{f32_to_pcm16, pcm16_to_f32, ByteOrder, PcmFormat};
pub use mix::{parse_mix_description, MixSpec, MonoMix, StereoMix};

/// Allowed ranges for per-track transforms.
pub mod limits {
    /// Lowest pitch shift in semitones.
    pub const MIN_PITCH_SHIFT: i32 = -11;

    /// Highest pitch shift in semitones.
    pub const MAX_PITCH_SHIFT: i32 = 11;

    /// Slowest playback speed factor.
    pub const MIN_SPEED_FACTOR: f64 = 0.1;

    /// Fastest playback speed factor.
    pub const MAX_SPEED_FACTOR: f64 = 3.0;
}
