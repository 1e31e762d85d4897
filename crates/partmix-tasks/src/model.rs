//! Track and task records exchanged with the external stores.

use crate::error::{TaskError, TaskResult};
use crate::request::TaskRequest;
use partmix_audio::PitchSpeed;
use partmix_core::MixSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Identity of a track within a song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackKey {
    pub song_id: String,
    pub track_id: String,
}

impl TrackKey {
    pub fn new(song_id: impl Into<String>, track_id: impl Into<String>) -> Self {
        Self {
            song_id: song_id.into(),
            track_id: track_id.into(),
        }
    }

    /// Another track of the same song.
    pub fn sibling(&self, track_id: impl Into<String>) -> Self {
        Self::new(self.song_id.clone(), track_id)
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.song_id, self.track_id)
    }
}

/// Opaque version token used for optimistic concurrency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ETag(pub String);

/// Key of an object in the media store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaLocation(String);

impl MediaLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    /// Fresh location for output written by `task` for `track`.
    ///
    /// Every task writes to its own object so a half-written result never
    /// replaces the media a track currently points at.
    pub fn for_task(track: &TrackKey, task: TaskId) -> Self {
        Self(format!(
            "songs/{}/tracks/{}/{}.pcm",
            track.song_id, track.track_id, task
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    /// A single recorded voice or instrument.
    Part,
    /// A rendered combination of parts.
    Mix,
}

fn default_speed() -> f64 {
    1.0
}

/// Track metadata as held by the track store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRecord {
    pub key: TrackKey,
    pub kind: TrackKind,
    /// Current audio, if any.
    pub media: Option<MediaLocation>,
    /// Task currently holding the track lock.
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub pitch_shift: i32,
    #[serde(default = "default_speed")]
    pub speed_factor: f64,
    /// Part track ids feeding a mix, in mix input order.
    #[serde(default)]
    pub parts: Vec<String>,
    pub mix_description: Option<String>,
    pub mix_spec: Option<MixSpec>,
    pub duration_secs: Option<f64>,
    /// Version token of the stored record; `None` for a record not yet stored.
    pub etag: Option<ETag>,
}

impl TrackRecord {
    /// A new, empty part track.
    pub fn new_part(key: TrackKey) -> Self {
        Self {
            key,
            kind: TrackKind::Part,
            media: None,
            task_id: None,
            pitch_shift: 0,
            speed_factor: 1.0,
            parts: Vec::new(),
            mix_description: None,
            mix_spec: None,
            duration_secs: None,
            etag: None,
        }
    }

    /// A new mix track over `parts` without media.
    pub fn new_mix(key: TrackKey, parts: Vec<String>, description: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Mix,
            parts,
            mix_description: Some(description.into()),
            ..Self::new_part(key)
        }
    }

    /// Builder-style media assignment.
    pub fn with_media(mut self, media: MediaLocation) -> Self {
        self.media = Some(media);
        self
    }

    /// Whether some task holds the track lock.
    pub fn is_locked(&self) -> bool {
        self.task_id.is_some()
    }

    /// Pitch and speed recorded on the track.
    pub fn transform(&self) -> PitchSpeed {
        PitchSpeed {
            pitch_shift: self.pitch_shift,
            speed_factor: self.speed_factor,
        }
    }
}

/// Unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Scheduled,
    /// Waiting for the track lock.
    Pending,
    /// Holding the lock and executing.
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Allowed next states. No state is ever skipped on the way to success.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Pending)
                | (Self::Pending, Self::Running)
                | (Self::Pending, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }
}

/// Kind of work a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CreateMix,
    RefreshMix,
    ProcessUpload,
}

/// Persisted task state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub target: TrackKey,
    pub status: TaskStatus,
    pub scheduled_at: u64,
    pub started_at: Option<u64>,
    pub ended_at: Option<u64>,
    /// Failure message for FAILED tasks.
    pub error: Option<String>,
    /// The request that created the task; enough to reschedule it.
    pub request: TaskRequest,
    /// Task-specific result for SUCCEEDED tasks.
    pub result: Option<serde_json::Value>,
}

impl TaskRecord {
    /// A freshly scheduled task for `request`.
    pub fn scheduled(id: TaskId, request: TaskRequest) -> Self {
        Self {
            id,
            kind: request.kind(),
            target: request.target().clone(),
            status: TaskStatus::Scheduled,
            scheduled_at: now_millis(),
            started_at: None,
            ended_at: None,
            error: None,
            request,
            result: None,
        }
    }

    /// Move to `next`, stamping start and end times.
    pub fn transition(&mut self, next: TaskStatus) -> TaskResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(TaskError::InvalidTransition {
                id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            TaskStatus::Running => self.started_at = Some(now_millis()),
            TaskStatus::Succeeded | TaskStatus::Failed => self.ended_at = Some(now_millis()),
            TaskStatus::Scheduled | TaskStatus::Pending => {}
        }
        Ok(())
    }
}
