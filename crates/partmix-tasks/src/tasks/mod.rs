//! The concrete task kinds run by the executor.
//!
//! Each task validates its inputs up front in [`TrackTask::initialize`],
//! before any task record exists, and does its real work in
//! [`TrackTask::run`] while holding the lock on its target track.

mod create_mix;
mod process_upload;
mod refresh_mix;

pub use create_mix::CreateMixTask;
pub use process_upload::ProcessUploadTask;
pub use refresh_mix::RefreshMixTask;

use crate::config::ExecutorConfig;
use crate::error::{TaskError, TaskResult};
use crate::mix_job::MixJob;
use crate::model::{TaskId, TaskKind, TrackKey, TrackKind, TrackRecord};
use crate::request::TaskRequest;
use crate::store::Stores;
use partmix_audio::PitchSpeed;
use partmix_core::parse_mix_description;

/// What a running task gets to work with.
pub struct TaskContext<'a> {
    pub id: TaskId,
    pub stores: &'a Stores,
    pub config: &'a ExecutorConfig,
}

/// A unit of work against one track.
pub trait TrackTask: Send {
    fn kind(&self) -> TaskKind;

    /// The track locked for the duration of [`TrackTask::run`].
    fn target(&self) -> &TrackKey;

    /// Validate inputs. Runs synchronously inside `schedule`.
    fn initialize(&mut self, stores: &Stores) -> TaskResult<()>;

    /// Record to create, locked, when the target track does not exist.
    fn placeholder(&self) -> Option<TrackRecord> {
        None
    }

    /// Do the work. `track` is the target as stored right after locking;
    /// the returned value becomes the task result.
    fn run(&mut self, ctx: &TaskContext<'_>, track: TrackRecord) -> TaskResult<serde_json::Value>;
}

/// Build the task for `request`.
pub fn build_task(request: TaskRequest) -> Box<dyn TrackTask> {
    match request {
        TaskRequest::CreateMix(r) => Box::new(CreateMixTask::new(r)),
        TaskRequest::RefreshMix(r) => Box::new(RefreshMixTask::new(r)),
        TaskRequest::ProcessUpload(r) => Box::new(ProcessUploadTask::new(r)),
    }
}

/// Resolve part tracks and the description into a ready-to-render job.
///
/// Every part must be an existing part track of the same song with media,
/// and the parts must be mixable together.
pub(crate) fn plan_mix(
    stores: &Stores,
    target: &TrackKey,
    parts: &[String],
    description: &str,
    transform: PitchSpeed,
) -> TaskResult<MixJob> {
    if parts.is_empty() {
        return Err(TaskError::Precondition(format!("mix {target} has no parts")));
    }
    let mut media = Vec::with_capacity(parts.len());
    for part in parts {
        if *part == target.track_id {
            return Err(TaskError::Precondition(format!(
                "mix {target} cannot include itself"
            )));
        }
        let key = target.sibling(part.as_str());
        let record = stores
            .tracks
            .get_track(&key)?
            .ok_or_else(|| TaskError::Precondition(format!("part {key} does not exist")))?;
        if record.kind != TrackKind::Part {
            return Err(TaskError::Precondition(format!("{key} is not a part track")));
        }
        let location = record
            .media
            .ok_or_else(|| TaskError::Precondition(format!("part {key} has no media")))?;
        media.push(location);
    }

    let spec = parse_mix_description(description, parts)?;
    let job = MixJob::new(spec, media, transform)?;
    job.probe(stores.media.as_ref())?;
    Ok(job)
}
