use super::{TaskContext, TrackTask};
use crate::error::{TaskError, TaskResult};
use crate::model::{MediaLocation, TaskKind, TrackKey, TrackKind, TrackRecord};
use crate::request::ProcessUploadRequest;
use crate::store::Stores;
use partmix_audio::AudioStream;
use serde_json::json;
use tracing::info;

/// Moves an uploaded recording to its canonical location on a part track.
pub struct ProcessUploadTask {
    request: ProcessUploadRequest,
}

impl ProcessUploadTask {
    pub fn new(request: ProcessUploadRequest) -> Self {
        Self { request }
    }

    fn open_upload(&self, stores: &Stores) -> TaskResult<Box<dyn AudioStream>> {
        let stream = stores.media.get_media(&self.request.upload)?;
        stream.format().ensure_mono16().map_err(|e| {
            TaskError::Precondition(format!("upload {}: {e}", self.request.upload))
        })?;
        Ok(stream)
    }
}

impl TrackTask for ProcessUploadTask {
    fn kind(&self) -> TaskKind {
        TaskKind::ProcessUpload
    }

    fn target(&self) -> &TrackKey {
        &self.request.target
    }

    fn initialize(&mut self, stores: &Stores) -> TaskResult<()> {
        let track = stores.tracks.require_track(&self.request.target)?;
        if track.kind != TrackKind::Part {
            return Err(TaskError::Precondition(format!(
                "{} is not a part track",
                track.key
            )));
        }
        self.open_upload(stores)?.close()?;
        Ok(())
    }

    fn run(
        &mut self,
        ctx: &TaskContext<'_>,
        mut track: TrackRecord,
    ) -> TaskResult<serde_json::Value> {
        let mut upload = self.open_upload(ctx.stores)?;
        let format = upload.format();
        let destination = MediaLocation::for_task(&track.key, ctx.id);
        let stored = ctx.stores.media.put_media(&destination, &mut upload);
        let closed = upload.close();
        let bytes = stored?;
        closed?;

        let frames = format.frames_in(bytes);
        let duration_secs = format.duration_secs(frames);
        track.media = Some(destination.clone());
        track.duration_secs = Some(duration_secs);
        ctx.stores.tracks.write_track(&track)?;

        info!(
            track = %track.key,
            upload = %self.request.upload,
            frames,
            duration_secs,
            "Upload processed"
        );
        Ok(json!({
            "media": destination,
            "frames": frames,
            "sample_rate": format.sample_rate,
            "duration_secs": duration_secs,
        }))
    }
}
