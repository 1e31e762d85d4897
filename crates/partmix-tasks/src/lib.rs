//! Partmix Tasks - background work against song tracks.
//!
//! Creating a mix, refreshing one, and processing an uploaded part all
//! run as tasks on a [`TaskExecutor`]. Each task holds an exclusive lock
//! on its target track while it works, implemented with conditional
//! writes on the track store.

pub mod config;
pub mod error;
pub mod executor;
pub mod lock;
pub mod memory;
pub mod mix_job;
pub mod model;
pub mod request;
pub mod store;
pub mod tasks;

pub use config::{ExecutorConfig, LockConfig};
pub use error::{TaskError, TaskResult};
pub use executor::{TaskExecutor, TaskHandle};
pub use memory::{MemoryMediaStore, MemoryTaskStore, MemoryTrackStore};
pub use mix_job::{MixJob, RenderedMix};
pub use model::{
    ETag, MediaLocation, TaskId, TaskKind, TaskRecord, TaskStatus, TrackKey, TrackKind,
    TrackRecord,
};
pub use request::{CreateMixRequest, ProcessUploadRequest, RefreshMixRequest, TaskRequest};
pub use store::{MediaStore, Stores, TaskStore, TrackStore};
