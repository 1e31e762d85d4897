//! Mix data model and mix-description parsing.

pub mod description;
pub mod spec;

pub use description::{parse_mix_description, PartMode};
pub use spec::{
    equal_factors, target_part_factors, AllChannelsMix, MixSpec, MonoMix, StereoMix,
    WEIGHT_SUM_TOLERANCE,
};
