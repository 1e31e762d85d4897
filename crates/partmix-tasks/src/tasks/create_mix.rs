use super::{plan_mix, TaskContext, TrackTask};
use crate::error::{TaskError, TaskResult};
use crate::model::{MediaLocation, TaskKind, TrackKey, TrackKind, TrackRecord};
use crate::request::CreateMixRequest;
use crate::store::Stores;
use partmix_audio::PitchSpeed;
use partmix_core::MixSpec;
use serde_json::json;
use tracing::info;

/// Creates a mix track and renders its first media.
pub struct CreateMixTask {
    request: CreateMixRequest,
    spec: Option<MixSpec>,
}

impl CreateMixTask {
    pub fn new(request: CreateMixRequest) -> Self {
        Self {
            request,
            spec: None,
        }
    }

    fn transform(&self) -> TaskResult<PitchSpeed> {
        Ok(PitchSpeed::new(
            self.request.pitch_shift,
            self.request.speed_factor,
        )?)
    }
}

/// A media-less mix is what a failed creation leaves behind; creating over
/// it is allowed. Anything else at the target blocks creation.
fn ensure_creatable(existing: &TrackRecord) -> TaskResult<()> {
    if existing.kind != TrackKind::Mix || existing.media.is_some() {
        return Err(TaskError::Precondition(format!(
            "track {} already exists",
            existing.key
        )));
    }
    Ok(())
}

impl TrackTask for CreateMixTask {
    fn kind(&self) -> TaskKind {
        TaskKind::CreateMix
    }

    fn target(&self) -> &TrackKey {
        &self.request.target
    }

    fn initialize(&mut self, stores: &Stores) -> TaskResult<()> {
        let target = &self.request.target;
        if let Some(existing) = stores.tracks.get_track(target)? {
            ensure_creatable(&existing)?;
        }
        let job = plan_mix(
            stores,
            target,
            &self.request.parts,
            &self.request.description,
            self.transform()?,
        )?;
        self.spec = Some(job.spec().clone());
        Ok(())
    }

    fn placeholder(&self) -> Option<TrackRecord> {
        let mut record = TrackRecord::new_mix(
            self.request.target.clone(),
            self.request.parts.clone(),
            self.request.description.clone(),
        );
        record.pitch_shift = self.request.pitch_shift;
        record.speed_factor = self.request.speed_factor;
        record.mix_spec = self.spec.clone();
        Some(record)
    }

    fn run(
        &mut self,
        ctx: &TaskContext<'_>,
        mut track: TrackRecord,
    ) -> TaskResult<serde_json::Value> {
        // Another creation may have finished while this one waited.
        ensure_creatable(&track)?;
        let job = plan_mix(
            ctx.stores,
            &track.key,
            &self.request.parts,
            &self.request.description,
            self.transform()?,
        )?;
        let destination = MediaLocation::for_task(&track.key, ctx.id);
        let rendered = job.render(
            ctx.stores.media.as_ref(),
            &destination,
            &ctx.config.mixer,
            &ctx.config.adapter,
        )?;

        track.kind = TrackKind::Mix;
        track.parts = self.request.parts.clone();
        track.mix_description = Some(self.request.description.clone());
        track.mix_spec = Some(job.spec().clone());
        track.pitch_shift = self.request.pitch_shift;
        track.speed_factor = self.request.speed_factor;
        track.media = Some(destination.clone());
        track.duration_secs = Some(rendered.duration_secs);
        ctx.stores.tracks.write_track(&track)?;

        info!(track = %track.key, media = %destination, "Mix created");
        Ok(json!({
            "media": destination,
            "frames": rendered.frames,
            "channels": rendered.format.channels,
            "duration_secs": rendered.duration_secs,
        }))
    }
}
