//! Parsing of human-readable mix names ("Bari left", "Full Mix", "Lead solo").
//!
//! A description is either a JSON-encoded [`MixSpec`] or a handful of words.
//! Words that match a part name (case-insensitively) select parts; the
//! remaining words select how those parts are weighted.

use super::spec::{equal_factors, target_part_factors, MixSpec, StereoMix};
use crate::error::{PartmixError, Result};
use tracing::debug;

/// Weight given to a predominant part relative to each other part.
const PREDOMINANT_WEIGHT: f64 = 4.0;

/// Words that carry no meaning when picking a weighting mode.
const FILLER_WORDS: &[&str] = &["mix"];

/// Weighting mode selected by a modifier word next to a single part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartMode {
    /// Only the part, on both channels.
    Solo,
    /// The part alone on the left, everything else on the right.
    Left,
    /// The part alone on the right, everything else on the left.
    Right,
    /// The part weighted 4:1 over the rest, both channels.
    Predominant,
    /// Everything except the part, both channels.
    Missing,
}

impl PartMode {
    /// Map a lower-cased modifier word to a mode.
    pub fn from_word(word: &str) -> Option<Self> {
        match word {
            "solo" | "only" => Some(Self::Solo),
            "left" | "stereo" => Some(Self::Left),
            "right" => Some(Self::Right),
            "dominant" | "predom" | "predominant" => Some(Self::Predominant),
            "missing" | "no" => Some(Self::Missing),
            _ => None,
        }
    }

    fn build(self, num_parts: usize, target: usize) -> Result<StereoMix> {
        let only = target_part_factors(num_parts, target, f64::INFINITY);
        let without = target_part_factors(num_parts, target, 0.0);
        match self {
            Self::Solo => StereoMix::centered(only),
            Self::Left => StereoMix::new(only, without),
            Self::Right => StereoMix::new(without, only),
            Self::Predominant => {
                StereoMix::centered(target_part_factors(num_parts, target, PREDOMINANT_WEIGHT))
            }
            Self::Missing => StereoMix::centered(without),
        }
    }
}

/// A description split into part references and other words.
#[derive(Debug, Default, PartialEq, Eq)]
struct Tokens {
    /// Indices into the part list, in order of appearance.
    parts: Vec<usize>,
    /// Lower-cased words that are not part names.
    other: Vec<String>,
}

fn tokenize<S: AsRef<str>>(description: &str, parts: &[S]) -> Tokens {
    let names: Vec<String> = parts.iter().map(|p| p.as_ref().to_lowercase()).collect();
    let mut tokens = Tokens::default();

    for word in description
        .to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
    {
        match names.iter().position(|name| name == word) {
            Some(index) => tokens.parts.push(index),
            None => tokens.other.push(word.to_string()),
        }
    }
    tokens
}

/// Parse a mix description into a [`MixSpec`] over `parts`.
///
/// `parts` is the ordered list of part names; the resulting spec has one
/// input per part in that order.
pub fn parse_mix_description<S: AsRef<str>>(description: &str, parts: &[S]) -> Result<MixSpec> {
    let invalid = |reason: &str| {
        PartmixError::InvalidMixDescription(format!("{description:?}: {reason}"))
    };

    if parts.is_empty() {
        return Err(invalid("no parts to mix"));
    }

    if description.trim_start().starts_with('{') {
        let spec: MixSpec = serde_json::from_str(description)
            .map_err(|e| invalid(&format!("malformed mix spec: {e}")))?;
        if spec.input_count() != parts.len() {
            return Err(invalid(&format!(
                "spec covers {} inputs but there are {} parts",
                spec.input_count(),
                parts.len()
            )));
        }
        return Ok(spec);
    }

    let tokens = tokenize(description, parts);
    let n = parts.len();
    debug!(description, parts = ?tokens.parts, other = ?tokens.other, "Parsing mix description");

    let mix = match tokens.parts.as_slice() {
        [first, second] => StereoMix::new(
            target_part_factors(n, *first, f64::INFINITY),
            target_part_factors(n, *second, f64::INFINITY),
        ),
        [] if tokens
            .other
            .iter()
            .any(|w| w == "full" || w == "balanced") =>
        {
            StereoMix::centered(equal_factors(n))
        }
        [target] => {
            let modifier = tokens
                .other
                .iter()
                .find(|w| !FILLER_WORDS.contains(&w.as_str()))
                .ok_or_else(|| invalid("a single part needs a modifier such as 'solo'"))?;
            let mode = PartMode::from_word(modifier)
                .ok_or_else(|| invalid(&format!("unknown modifier '{modifier}'")))?;
            mode.build(n, *target)
        }
        _ => return Err(invalid("unrecognized mix")),
    };

    mix.map(MixSpec::from)
        .map_err(|e| invalid(&e.to_string()))
}
