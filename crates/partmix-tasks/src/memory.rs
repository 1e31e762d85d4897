//! In-process store implementations.

use crate::error::{TaskError, TaskResult};
use crate::model::{ETag, MediaLocation, TaskId, TaskRecord, TaskStatus, TrackKey, TrackRecord};
use crate::store::{MediaStore, TaskStore, TrackStore};
use parking_lot::{Mutex, RwLock};
use partmix_audio::{AudioStream, PcmStream};
use partmix_core::PcmFormat;
use std::collections::HashMap;
use std::io::{Cursor, ErrorKind, Read};
use std::sync::Arc;
use tracing::trace;

/// Read size used when copying a stream into memory; a whole number of frames
/// for any supported format.
const COPY_CHUNK: usize = 64 * 1024;

/// Track store keeping records in a map, versioned by a counter.
#[derive(Default)]
pub struct MemoryTrackStore {
    records: Mutex<HashMap<TrackKey, TrackRecord>>,
    version: Mutex<u64>,
}

impl MemoryTrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_etag(&self) -> ETag {
        let mut version = self.version.lock();
        *version += 1;
        ETag(format!("v{}", *version))
    }
}

impl TrackStore for MemoryTrackStore {
    fn get_track(&self, key: &TrackKey) -> TaskResult<Option<TrackRecord>> {
        Ok(self.records.lock().get(key).cloned())
    }

    fn write_track(&self, record: &TrackRecord) -> TaskResult<TrackRecord> {
        let mut records = self.records.lock();
        let current = records.get(&record.key).and_then(|r| r.etag.as_ref());
        if current != record.etag.as_ref() {
            return Err(TaskError::Conflict(format!("track {}", record.key)));
        }
        let mut stored = record.clone();
        stored.etag = Some(self.next_etag());
        trace!(track = %stored.key, etag = ?stored.etag, "Track written");
        records.insert(stored.key.clone(), stored.clone());
        Ok(stored)
    }
}

#[derive(Clone)]
struct MediaObject {
    format: PcmFormat,
    bytes: Arc<[u8]>,
}

/// Media store holding whole objects in memory.
#[derive(Default)]
pub struct MemoryMediaStore {
    objects: RwLock<HashMap<MediaLocation, MediaObject>>,
}

impl MemoryMediaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw PCM bytes directly.
    pub fn insert(&self, location: MediaLocation, format: PcmFormat, bytes: Vec<u8>) {
        self.objects.write().insert(
            location,
            MediaObject {
                format,
                bytes: bytes.into(),
            },
        );
    }

    /// Format and contents of a stored object.
    pub fn get_bytes(&self, location: &MediaLocation) -> Option<(PcmFormat, Vec<u8>)> {
        self.objects
            .read()
            .get(location)
            .map(|o| (o.format, o.bytes.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MediaStore for MemoryMediaStore {
    fn get_media(&self, location: &MediaLocation) -> TaskResult<Box<dyn AudioStream>> {
        let object = self
            .objects
            .read()
            .get(location)
            .cloned()
            .ok_or_else(|| TaskError::NotFound(format!("media {location}")))?;
        Ok(Box::new(PcmStream::new(
            object.format,
            Cursor::new(object.bytes),
        )))
    }

    fn put_media(&self, location: &MediaLocation, stream: &mut dyn AudioStream) -> TaskResult<u64> {
        let format = stream.format();
        let mut bytes = Vec::new();
        let mut chunk = vec![0u8; COPY_CHUNK];
        loop {
            match stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => bytes.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let len = bytes.len() as u64;
        self.insert(location.clone(), format, bytes);
        trace!(%location, bytes = len, "Media stored");
        Ok(len)
    }

    fn exists(&self, location: &MediaLocation) -> TaskResult<bool> {
        Ok(self.objects.read().contains_key(location))
    }
}

/// Task store that also remembers every status each task passed through.
#[derive(Default)]
pub struct MemoryTaskStore {
    records: RwLock<HashMap<TaskId, TaskRecord>>,
    history: Mutex<HashMap<TaskId, Vec<TaskStatus>>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses persisted for `id`, oldest first.
    pub fn status_history(&self, id: TaskId) -> Vec<TaskStatus> {
        self.history.lock().get(&id).cloned().unwrap_or_default()
    }

    pub fn all(&self) -> Vec<TaskRecord> {
        self.records.read().values().cloned().collect()
    }

    fn record_status(&self, record: &TaskRecord) {
        let mut history = self.history.lock();
        let statuses = history.entry(record.id).or_default();
        if statuses.last() != Some(&record.status) {
            statuses.push(record.status);
        }
    }
}

impl TaskStore for MemoryTaskStore {
    fn create_task(&self, record: &TaskRecord) -> TaskResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(TaskError::TaskExists(record.id));
        }
        records.insert(record.id, record.clone());
        self.record_status(record);
        Ok(())
    }

    fn update_task(&self, record: &TaskRecord) -> TaskResult<()> {
        let mut records = self.records.write();
        let Some(slot) = records.get_mut(&record.id) else {
            return Err(TaskError::TaskMissing(record.id));
        };
        *slot = record.clone();
        self.record_status(record);
        Ok(())
    }

    fn get_task(&self, id: TaskId) -> TaskResult<Option<TaskRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }
}

/// Reader that fails after yielding `limit` bytes, for exercising partial writes.
#[cfg(test)]
pub(crate) struct FailAfter<R> {
    pub inner: R,
    pub limit: usize,
}

#[cfg(test)]
impl<R: Read> Read for FailAfter<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.limit == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "source went away",
            ));
        }
        let max = buf.len().min(self.limit);
        let n = self.inner.read(&mut buf[..max])?;
        self.limit -= n;
        Ok(n)
    }
}
