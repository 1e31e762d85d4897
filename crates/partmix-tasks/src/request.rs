//! Task requests as accepted by the executor and stored on task records.

use crate::model::{MediaLocation, TaskKind, TrackKey};
use serde::{Deserialize, Serialize};

fn default_speed() -> f64 {
    1.0
}

/// Create a new mix track from existing part tracks of the same song.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateMixRequest {
    /// The mix track to create. Must not exist yet.
    pub target: TrackKey,
    /// Free-form description or a JSON mix spec.
    pub description: String,
    /// Part track ids, in mix input order.
    pub parts: Vec<String>,
    #[serde(default)]
    pub pitch_shift: i32,
    #[serde(default = "default_speed")]
    pub speed_factor: f64,
}

/// Re-render an existing mix, optionally with new settings.
///
/// Unset fields keep the values stored on the track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshMixRequest {
    pub target: TrackKey,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pitch_shift: Option<i32>,
    #[serde(default)]
    pub speed_factor: Option<f64>,
}

/// Validate an uploaded recording and make it the media of a part track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessUploadRequest {
    pub target: TrackKey,
    /// Where the raw upload was stored.
    pub upload: MediaLocation,
}

/// Any request the executor can schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskRequest {
    CreateMix(CreateMixRequest),
    RefreshMix(RefreshMixRequest),
    ProcessUpload(ProcessUploadRequest),
}

impl TaskRequest {
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::CreateMix(_) => TaskKind::CreateMix,
            Self::RefreshMix(_) => TaskKind::RefreshMix,
            Self::ProcessUpload(_) => TaskKind::ProcessUpload,
        }
    }

    /// The track the task locks and updates.
    pub fn target(&self) -> &TrackKey {
        match self {
            Self::CreateMix(r) => &r.target,
            Self::RefreshMix(r) => &r.target,
            Self::ProcessUpload(r) => &r.target,
        }
    }
}

impl From<CreateMixRequest> for TaskRequest {
    fn from(request: CreateMixRequest) -> Self {
        Self::CreateMix(request)
    }
}

impl From<RefreshMixRequest> for TaskRequest {
    fn from(request: RefreshMixRequest) -> Self {
        Self::RefreshMix(request)
    }
}

impl From<ProcessUploadRequest> for TaskRequest {
    fn from(request: ProcessUploadRequest) -> Self {
        Self::ProcessUpload(request)
    }
}
