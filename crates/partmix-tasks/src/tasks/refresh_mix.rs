use super::{plan_mix, TaskContext, TrackTask};
use crate::error::{TaskError, TaskResult};
use crate::mix_job::MixJob;
use crate::model::{MediaLocation, TaskKind, TrackKey, TrackKind, TrackRecord};
use crate::request::RefreshMixRequest;
use crate::store::Stores;
use partmix_audio::PitchSpeed;
use partmix_core::PartmixError;
use serde_json::json;
use tracing::info;

/// Re-renders an existing mix, applying any overrides from the request.
pub struct RefreshMixTask {
    request: RefreshMixRequest,
}

/// Mix settings after applying overrides to what the track has.
struct Settings {
    description: String,
    transform: PitchSpeed,
}

impl RefreshMixTask {
    pub fn new(request: RefreshMixRequest) -> Self {
        Self { request }
    }

    fn settings(&self, track: &TrackRecord) -> TaskResult<Settings> {
        if track.kind != TrackKind::Mix {
            return Err(TaskError::Precondition(format!(
                "{} is not a mix track",
                track.key
            )));
        }
        let description = match (
            &self.request.description,
            &track.mix_description,
            &track.mix_spec,
        ) {
            (Some(d), _, _) | (None, Some(d), _) => d.clone(),
            (None, None, Some(spec)) => serde_json::to_string(spec)
                .map_err(|e| PartmixError::Serialization(e.to_string()))?,
            (None, None, None) => {
                return Err(TaskError::Precondition(format!(
                    "mix {} has no description",
                    track.key
                )))
            }
        };
        let transform = PitchSpeed::new(
            self.request.pitch_shift.unwrap_or(track.pitch_shift),
            self.request.speed_factor.unwrap_or(track.speed_factor),
        )?;
        Ok(Settings {
            description,
            transform,
        })
    }

    fn plan(&self, stores: &Stores, track: &TrackRecord) -> TaskResult<(Settings, MixJob)> {
        let settings = self.settings(track)?;
        let job = plan_mix(
            stores,
            &track.key,
            &track.parts,
            &settings.description,
            settings.transform,
        )?;
        Ok((settings, job))
    }
}

impl TrackTask for RefreshMixTask {
    fn kind(&self) -> TaskKind {
        TaskKind::RefreshMix
    }

    fn target(&self) -> &TrackKey {
        &self.request.target
    }

    fn initialize(&mut self, stores: &Stores) -> TaskResult<()> {
        let track = stores.tracks.require_track(&self.request.target)?;
        self.plan(stores, &track)?;
        Ok(())
    }

    fn run(
        &mut self,
        ctx: &TaskContext<'_>,
        mut track: TrackRecord,
    ) -> TaskResult<serde_json::Value> {
        let (settings, job) = self.plan(ctx.stores, &track)?;
        let destination = MediaLocation::for_task(&track.key, ctx.id);
        let rendered = job.render(
            ctx.stores.media.as_ref(),
            &destination,
            &ctx.config.mixer,
            &ctx.config.adapter,
        )?;

        let previous = track.media.replace(destination.clone());
        track.mix_description = Some(settings.description);
        track.mix_spec = Some(job.spec().clone());
        track.pitch_shift = settings.transform.pitch_shift;
        track.speed_factor = settings.transform.speed_factor;
        track.duration_secs = Some(rendered.duration_secs);
        ctx.stores.tracks.write_track(&track)?;

        info!(
            track = %track.key,
            media = %destination,
            previous = ?previous,
            "Mix refreshed"
        );
        Ok(json!({
            "media": destination,
            "previous_media": previous,
            "frames": rendered.frames,
            "channels": rendered.format.channels,
            "duration_secs": rendered.duration_secs,
        }))
    }
}
