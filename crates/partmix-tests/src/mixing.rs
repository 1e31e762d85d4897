//! Mixing part streams end to end: description, mixer and pitch/speed.

use crate::support::{constant, decode, init_tracing, sine, stream, QUARTET, SAMPLE_RATE};
use partmix_audio::{
    AdapterConfig, AudioStream, MixerConfig, PitchSpeed, PitchSpeedAdapter, StreamMixer,
};
use partmix_core::{parse_mix_description, MixSpec, PartmixError};
use std::io::Read;

fn levels() -> [f32; 4] {
    [0.1, 0.2, 0.3, 0.6]
}

fn quartet_streams(frames: usize) -> Vec<Box<dyn AudioStream>> {
    levels().iter().map(|&l| stream(&constant(l, frames))).collect()
}

fn read_all(stream: &mut dyn AudioStream) -> Vec<u8> {
    let mut out = Vec::new();
    stream.read_to_end(&mut out).unwrap();
    out
}

fn scaled(value: f32) -> i16 {
    (value * 32767.0).round() as i16
}

#[test]
fn bari_left_puts_bari_alone_on_the_left() {
    init_tracing();
    let spec = parse_mix_description("Bari left", &QUARTET).unwrap();
    let mut mixer = StreamMixer::new(quartet_streams(1000), spec, &MixerConfig::default()).unwrap();
    assert_eq!(mixer.format().channels, 2);

    let samples = decode(&read_all(&mut mixer));
    assert_eq!(samples.len(), 2000);
    let others = (0.1 + 0.2 + 0.6) / 3.0;
    for frame in samples.chunks_exact(2) {
        assert!((frame[0] - scaled(0.3)).abs() <= 1);
        assert!((frame[1] - scaled(others)).abs() <= 1);
    }
    assert_eq!(mixer.frames_mixed(), 1000);
}

#[test]
fn duet_splits_two_parts_across_channels() {
    let spec = parse_mix_description("Tenor and Bass", &QUARTET).unwrap();
    let mut mixer = StreamMixer::new(quartet_streams(64), spec, &MixerConfig::default()).unwrap();
    let samples = decode(&read_all(&mut mixer));
    assert!((samples[0] - scaled(0.1)).abs() <= 1);
    assert!((samples[1] - scaled(0.6)).abs() <= 1);
}

#[test]
fn json_spec_round_trips_through_description() {
    let original = parse_mix_description("lead predom", &QUARTET).unwrap();
    let json = serde_json::to_string(&original).unwrap();
    let parsed = parse_mix_description(&json, &QUARTET).unwrap();
    assert_eq!(parsed, original);

    let mut mixer = StreamMixer::new(quartet_streams(10), parsed, &MixerConfig::default()).unwrap();
    let samples = decode(&read_all(&mut mixer));
    let expected = (0.1 + 4.0 * 0.2 + 0.3 + 0.6) / 7.0;
    assert!((samples[0] - scaled(expected)).abs() <= 1);
    assert_eq!(samples[0], samples[1]);
}

#[test]
fn unknown_description_is_rejected() {
    assert!(matches!(
        parse_mix_description("karaoke", &QUARTET),
        Err(PartmixError::InvalidMixDescription(_))
    ));
}

#[test]
fn mixer_stops_at_shortest_part() {
    let inputs = vec![stream(&constant(0.5, 300)), stream(&constant(0.5, 1200))];
    let spec = parse_mix_description("tenor lead", &["tenor", "lead"]).unwrap();
    let config = MixerConfig {
        buffer_frames: 128,
        ..Default::default()
    };
    let mut mixer = StreamMixer::new(inputs, spec, &config).unwrap();
    assert_eq!(read_all(&mut mixer).len(), 300 * 4);
}

#[test]
fn pitch_shifted_parts_feed_the_mixer() {
    init_tracing();
    let frames = SAMPLE_RATE as usize;
    let transform = PitchSpeed::new(3, 1.0).unwrap();
    let config = AdapterConfig::default();
    let inputs: Vec<Box<dyn AudioStream>> = [220.0, 330.0]
        .iter()
        .map(|&f| {
            Box::new(PitchSpeedAdapter::new(stream(&sine(f, frames)), transform, &config).unwrap())
                as Box<dyn AudioStream>
        })
        .collect();
    let spec: MixSpec = parse_mix_description("full", &["a", "b"]).unwrap();
    let mut mixer = StreamMixer::new(inputs, spec, &MixerConfig::default()).unwrap();

    let out = read_all(&mut mixer);
    mixer.close().unwrap();
    let mixed_frames = out.len() / 4;
    // Same duration as the input, give or take the stretcher's tail.
    assert!(mixed_frames >= frames * 9 / 10, "got {mixed_frames}");
    assert!(mixed_frames <= frames * 3 / 2, "got {mixed_frames}");
    let peak = decode(&out).iter().map(|s| s.unsigned_abs()).max().unwrap();
    assert!(peak > 0);
}
