//! Storage collaborators used by tasks.
//!
//! Track metadata and task records live in document stores with
//! optimistic concurrency; audio lives in an object store. The traits keep
//! the executor independent of any particular backend.

use crate::error::{TaskError, TaskResult};
use crate::model::{MediaLocation, TaskId, TaskRecord, TrackKey, TrackRecord};
use partmix_audio::AudioStream;
use std::sync::Arc;

/// Track metadata with conditional writes.
pub trait TrackStore: Send + Sync {
    /// Fetch the current record, with its version token.
    fn get_track(&self, key: &TrackKey) -> TaskResult<Option<TrackRecord>>;

    /// Store `record`, returning it with its new version token.
    ///
    /// With `record.etag == None` the write only succeeds if the track does
    /// not exist; otherwise the token must match the stored version.
    /// Mismatches fail with [`TaskError::Conflict`].
    fn write_track(&self, record: &TrackRecord) -> TaskResult<TrackRecord>;

    /// Like [`TrackStore::get_track`] but missing tracks are an error.
    fn require_track(&self, key: &TrackKey) -> TaskResult<TrackRecord> {
        self.get_track(key)?
            .ok_or_else(|| TaskError::NotFound(format!("track {key}")))
    }
}

/// Audio objects.
pub trait MediaStore: Send + Sync {
    /// Open the object at `location` as a stream carrying its format.
    fn get_media(&self, location: &MediaLocation) -> TaskResult<Box<dyn AudioStream>>;

    /// Read `stream` to its end and store it at `location`.
    ///
    /// Returns the number of bytes stored. Nothing becomes visible at
    /// `location` unless the whole stream was read.
    fn put_media(&self, location: &MediaLocation, stream: &mut dyn AudioStream) -> TaskResult<u64>;

    fn exists(&self, location: &MediaLocation) -> TaskResult<bool>;
}

/// Persisted task records.
pub trait TaskStore: Send + Sync {
    /// Insert a new record; fails with [`TaskError::TaskExists`] on duplicates.
    fn create_task(&self, record: &TaskRecord) -> TaskResult<()>;

    /// Replace an existing record; fails with [`TaskError::TaskMissing`].
    fn update_task(&self, record: &TaskRecord) -> TaskResult<()>;

    fn get_task(&self, id: TaskId) -> TaskResult<Option<TaskRecord>>;
}

/// The three stores a task executor works against.
#[derive(Clone)]
pub struct Stores {
    pub tracks: Arc<dyn TrackStore>,
    pub media: Arc<dyn MediaStore>,
    pub tasks: Arc<dyn TaskStore>,
}

impl Stores {
    pub fn new(
        tracks: Arc<dyn TrackStore>,
        media: Arc<dyn MediaStore>,
        tasks: Arc<dyn TaskStore>,
    ) -> Self {
        Self {
            tracks,
            media,
            tasks,
        }
    }
}
