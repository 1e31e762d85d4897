//! Mix specifications: how N mono parts map onto 1 or 2 output channels.

use crate::error::{PartmixError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Allowed deviation of a weight vector's sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// Weighting primitive shared by every named mix mode.
///
/// With `target_weight == +inf` the target gets everything. Otherwise the
/// target factor is `w / (w + n - 1)` and the remainder is split evenly
/// across the other parts, so `4.0` gives a 4:1 predominant mix and `0.0`
/// drops the target entirely.
pub fn target_part_factors(num_parts: usize, target: usize, target_weight: f64) -> Vec<f64> {
    if num_parts == 0 {
        return Vec::new();
    }
    if num_parts == 1 {
        let only = if target_weight > 0.0 { 1.0 } else { 0.0 };
        return vec![only];
    }

    let (target_factor, other_factor) = if target_weight == f64::INFINITY {
        (1.0, 0.0)
    } else {
        let target_factor = target_weight / (target_weight + num_parts as f64 - 1.0);
        (
            target_factor,
            (1.0 - target_factor) / (num_parts as f64 - 1.0),
        )
    };

    (0..num_parts)
        .map(|i| if i == target { target_factor } else { other_factor })
        .collect()
}

/// Equal weight `1/n` on every part.
pub fn equal_factors(num_parts: usize) -> Vec<f64> {
    if num_parts == 0 {
        return Vec::new();
    }
    vec![1.0 / num_parts as f64; num_parts]
}

fn validate_weights(channel: &str, weights: &[f64]) -> Result<()> {
    if weights.is_empty() {
        return Err(PartmixError::InvalidMixSpec(format!(
            "{channel} weights must cover at least one input"
        )));
    }
    if let Some(bad) = weights
        .iter()
        .find(|w| !w.is_finite() || **w < 0.0 || **w > 1.0)
    {
        return Err(PartmixError::InvalidMixSpec(format!(
            "{channel} weight {bad} outside [0.0, 1.0]"
        )));
    }
    let sum: f64 = weights.iter().sum();
    if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(PartmixError::InvalidMixSpec(format!(
            "{channel} weights sum to {sum}, expected 1.0"
        )));
    }
    Ok(())
}

#[derive(Deserialize)]
struct MonoMixFields {
    factors: Vec<f64>,
}

/// All inputs folded into a single output channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MonoMixFields")]
pub struct MonoMix {
    factors: Vec<f64>,
}

impl MonoMix {
    /// Create a mono mix, validating range and sum of `factors`.
    pub fn new(factors: Vec<f64>) -> Result<Self> {
        validate_weights("mono", &factors)?;
        Ok(Self { factors })
    }

    /// Per-input weights.
    pub fn factors(&self) -> &[f64] {
        &self.factors
    }
}

impl TryFrom<MonoMixFields> for MonoMix {
    type Error = PartmixError;

    fn try_from(fields: MonoMixFields) -> Result<Self> {
        Self::new(fields.factors)
    }
}

#[derive(Deserialize)]
struct StereoMixFields {
    left: Vec<f64>,
    right: Vec<f64>,
}

/// Inputs mixed into a left and a right channel with independent weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StereoMixFields")]
pub struct StereoMix {
    left: Vec<f64>,
    right: Vec<f64>,
}

impl StereoMix {
    /// Create a stereo mix, validating both channels.
    pub fn new(left: Vec<f64>, right: Vec<f64>) -> Result<Self> {
        if left.len() != right.len() {
            return Err(PartmixError::InvalidMixSpec(format!(
                "left has {} weights but right has {}",
                left.len(),
                right.len()
            )));
        }
        validate_weights("left", &left)?;
        validate_weights("right", &right)?;
        Ok(Self { left, right })
    }

    /// Same weights on both channels.
    pub fn centered(factors: Vec<f64>) -> Result<Self> {
        Self::new(factors.clone(), factors)
    }

    /// Left channel weights.
    pub fn left(&self) -> &[f64] {
        &self.left
    }

    /// Right channel weights.
    pub fn right(&self) -> &[f64] {
        &self.right
    }
}

impl TryFrom<StereoMixFields> for StereoMix {
    type Error = PartmixError;

    fn try_from(fields: StereoMixFields) -> Result<Self> {
        Self::new(fields.left, fields.right)
    }
}

#[derive(Deserialize)]
struct AllChannelsMixFields {
    input_count: usize,
}

/// Every input passed through on its own output channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "AllChannelsMixFields")]
pub struct AllChannelsMix {
    input_count: usize,
}

impl AllChannelsMix {
    /// Create a pass-through mix for `input_count` inputs.
    pub fn new(input_count: usize) -> Result<Self> {
        if input_count == 0 {
            return Err(PartmixError::InvalidMixSpec(
                "all-channels mix needs at least one input".into(),
            ));
        }
        Ok(Self { input_count })
    }
}

impl TryFrom<AllChannelsMixFields> for AllChannelsMix {
    type Error = PartmixError;

    fn try_from(fields: AllChannelsMixFields) -> Result<Self> {
        Self::new(fields.input_count)
    }
}

/// Description of how a fixed number of mono inputs are combined.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"stereo","left":[1.0,0.0],"right":[0.0,1.0]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MixSpec {
    Mono(MonoMix),
    Stereo(StereoMix),
    AllChannels(AllChannelsMix),
}

impl MixSpec {
    /// Number of mono inputs this spec consumes.
    pub fn input_count(&self) -> usize {
        match self {
            Self::Mono(m) => m.factors.len(),
            Self::Stereo(m) => m.left.len(),
            Self::AllChannels(m) => m.input_count,
        }
    }

    /// Number of interleaved output channels.
    pub fn output_count(&self) -> usize {
        match self {
            Self::Mono(_) => 1,
            Self::Stereo(_) => 2,
            Self::AllChannels(m) => m.input_count,
        }
    }

    /// Weight vector feeding output channel `channel`.
    pub fn channel_weights(&self, channel: usize) -> Option<Vec<f64>> {
        match self {
            Self::Mono(m) if channel == 0 => Some(m.factors.clone()),
            Self::Stereo(m) if channel == 0 => Some(m.left.clone()),
            Self::Stereo(m) if channel == 1 => Some(m.right.clone()),
            Self::AllChannels(m) if channel < m.input_count => Some(
                (0..m.input_count)
                    .map(|i| if i == channel { 1.0 } else { 0.0 })
                    .collect(),
            ),
            _ => None,
        }
    }

    /// Mix `frames` aligned frames from each input into interleaved `output`.
    ///
    /// `inputs` must hold `input_count()` slices of at least `frames` samples
    /// and `output` at least `frames * output_count()` samples.
    pub fn mix(&self, inputs: &[&[f32]], output: &mut [f32], frames: usize) {
        debug_assert_eq!(inputs.len(), self.input_count());
        debug_assert!(output.len() >= frames * self.output_count());

        match self {
            Self::Mono(m) => {
                for (frame, out) in output[..frames].iter_mut().enumerate() {
                    *out = weighted_sum(&m.factors, inputs, frame);
                }
            }
            Self::Stereo(m) => {
                for (frame, out) in output[..frames * 2].chunks_exact_mut(2).enumerate() {
                    out[0] = weighted_sum(&m.left, inputs, frame);
                    out[1] = weighted_sum(&m.right, inputs, frame);
                }
            }
            Self::AllChannels(m) => {
                let width = m.input_count;
                for (frame, out) in output[..frames * width]
                    .chunks_exact_mut(width)
                    .enumerate()
                {
                    for (slot, input) in out.iter_mut().zip(inputs) {
                        *slot = input[frame];
                    }
                }
            }
        }
    }
}

#[inline]
fn weighted_sum(weights: &[f64], inputs: &[&[f32]], frame: usize) -> f32 {
    weights
        .iter()
        .zip(inputs)
        .map(|(w, input)| *w as f32 * input[frame])
        .sum()
}

impl fmt::Display for MixSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(weights: &[f64]) -> String {
            weights
                .iter()
                .map(|w| format!("{w:.3}"))
                .collect::<Vec<_>>()
                .join(" ")
        }
        match self {
            Self::Mono(m) => write!(f, "mono [{}]", list(&m.factors)),
            Self::Stereo(m) => write!(f, "stereo L[{}] R[{}]", list(&m.left), list(&m.right)),
            Self::AllChannels(m) => write!(f, "all-channels x{}", m.input_count),
        }
    }
}

impl From<MonoMix> for MixSpec {
    fn from(mix: MonoMix) -> Self {
        Self::Mono(mix)
    }
}

impl From<StereoMix> for MixSpec {
    fn from(mix: StereoMix) -> Self {
        Self::Stereo(mix)
    }
}

impl From<AllChannelsMix> for MixSpec {
    fn from(mix: AllChannelsMix) -> Self {
        Self::AllChannels(mix)
    }
}
