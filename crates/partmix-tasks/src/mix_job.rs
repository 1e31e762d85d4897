//! Rendering a mix from stored part media.

use crate::error::{TaskError, TaskResult};
use crate::model::MediaLocation;
use crate::store::MediaStore;
use partmix_audio::{
    AdapterConfig, AudioStream, MixerConfig, PitchSpeed, PitchSpeedAdapter, StreamMixer,
};
use partmix_core::{MixSpec, PcmFormat};
use tracing::{debug, info};

/// Summary of a rendered mix.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMix {
    pub location: MediaLocation,
    pub format: PcmFormat,
    pub bytes: u64,
    pub frames: u64,
    pub duration_secs: f64,
}

/// A mix of part media under one pitch/speed transform.
#[derive(Debug, Clone)]
pub struct MixJob {
    spec: MixSpec,
    parts: Vec<MediaLocation>,
    transform: PitchSpeed,
}

impl MixJob {
    pub fn new(
        spec: MixSpec,
        parts: Vec<MediaLocation>,
        transform: PitchSpeed,
    ) -> TaskResult<Self> {
        if parts.is_empty() {
            return Err(TaskError::Precondition("a mix needs at least one part".into()));
        }
        if spec.input_count() != parts.len() {
            return Err(TaskError::Precondition(format!(
                "mix spec takes {} parts but {} were given",
                spec.input_count(),
                parts.len()
            )));
        }
        transform.validate()?;
        Ok(Self {
            spec,
            parts,
            transform,
        })
    }

    pub fn spec(&self) -> &MixSpec {
        &self.spec
    }

    /// Check that every part can be opened and mixed with the others.
    ///
    /// Opens and closes each stream without reading audio.
    pub fn probe(&self, media: &dyn MediaStore) -> TaskResult<PcmFormat> {
        let mut first: Option<PcmFormat> = None;
        for location in &self.parts {
            let mut stream = media.get_media(location)?;
            let format = stream.format();
            stream.close()?;
            format.ensure_mono16().map_err(|e| {
                TaskError::Precondition(format!("part {location}: {e}"))
            })?;
            match first {
                None => first = Some(format),
                Some(expected)
                    if expected.sample_rate != format.sample_rate
                        || expected.byte_order != format.byte_order =>
                {
                    return Err(TaskError::Precondition(format!(
                        "part {location} is {format}, expected {expected}"
                    )));
                }
                Some(_) => {}
            }
        }
        first.ok_or_else(|| TaskError::Precondition("a mix needs at least one part".into()))
    }

    /// Open every part, apply the transform, and build the mixer.
    pub fn open(
        &self,
        media: &dyn MediaStore,
        mixer: &MixerConfig,
        adapter: &AdapterConfig,
    ) -> TaskResult<StreamMixer> {
        let mut inputs: Vec<Box<dyn AudioStream>> = Vec::with_capacity(self.parts.len());
        for location in &self.parts {
            let stream = media.get_media(location)?;
            if self.transform.is_identity() {
                inputs.push(stream);
            } else {
                inputs.push(Box::new(PitchSpeedAdapter::new(stream, self.transform, adapter)?));
            }
        }
        debug!(
            parts = inputs.len(),
            pitch_shift = self.transform.pitch_shift,
            speed_factor = self.transform.speed_factor,
            "Opened mix inputs"
        );
        Ok(StreamMixer::new(inputs, self.spec.clone(), mixer)?)
    }

    /// Mix to `destination` in the media store.
    pub fn render(
        &self,
        media: &dyn MediaStore,
        destination: &MediaLocation,
        mixer: &MixerConfig,
        adapter: &AdapterConfig,
    ) -> TaskResult<RenderedMix> {
        let mut stream = self.open(media, mixer, adapter)?;
        let format = stream.format();
        let stored = media.put_media(destination, &mut stream);
        let closed = stream.close();
        let bytes = stored?;
        closed?;

        let frames = format.frames_in(bytes);
        let duration_secs = format.duration_secs(frames);
        info!(
            %destination,
            frames,
            duration_secs,
            channels = format.channels,
            "Mix rendered"
        );
        Ok(RenderedMix {
            location: destination.clone(),
            format,
            bytes,
            frames,
            duration_secs,
        })
    }
}
