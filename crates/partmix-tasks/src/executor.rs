//! Worker pool running track tasks under the per-track lock.

use crate::config::ExecutorConfig;
use crate::error::{TaskError, TaskResult};
use crate::lock;
use crate::model::{TaskId, TaskRecord, TaskStatus};
use crate::request::TaskRequest;
use crate::store::Stores;
use crate::tasks::{build_task, TaskContext, TrackTask};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

struct Job {
    task: Box<dyn TrackTask>,
    record: TaskRecord,
    reply: oneshot::Sender<TaskRecord>,
}

struct Shared {
    stores: Stores,
    config: ExecutorConfig,
}

/// Runs tasks on a fixed pool of worker threads.
///
/// Tasks targeting the same track run one at a time thanks to the track
/// lock; tasks on different tracks run in parallel up to the pool size.
pub struct TaskExecutor {
    shared: Arc<Shared>,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl TaskExecutor {
    pub fn new(stores: Stores, config: ExecutorConfig) -> TaskResult<Self> {
        let shared = Arc::new(Shared { stores, config });
        let (sender, receiver) = unbounded::<Job>();
        let count = shared.config.worker_threads.max(1);

        let mut workers = Vec::with_capacity(count);
        for index in 0..count {
            let shared = Arc::clone(&shared);
            let receiver = receiver.clone();
            let worker = thread::Builder::new()
                .name(format!("partmix-task-{index}"))
                .spawn(move || worker_loop(&shared, receiver))?;
            workers.push(worker);
        }
        info!(workers = count, "Task executor started");

        Ok(Self {
            shared,
            sender: Some(sender),
            workers,
        })
    }

    /// Validate and enqueue `request`.
    ///
    /// Validation runs on the calling thread; if it fails the error is
    /// returned and no task record is created.
    pub fn schedule(&self, request: impl Into<TaskRequest>) -> TaskResult<TaskHandle> {
        let request = request.into();
        let mut task = build_task(request.clone());
        task.initialize(&self.shared.stores)?;

        let record = TaskRecord::scheduled(TaskId::new(), request);
        self.shared.stores.tasks.create_task(&record)?;
        let id = record.id;
        info!(task = %id, kind = ?record.kind, target = %record.target, "Task scheduled");

        let (reply, receiver) = oneshot::channel();
        let sender = self.sender.as_ref().ok_or(TaskError::WorkerGone)?;
        sender
            .send(Job {
                task,
                record,
                reply,
            })
            .map_err(|_| TaskError::WorkerGone)?;
        Ok(TaskHandle { id, receiver })
    }

    /// Schedule a failed task's request again as a new task.
    pub fn reschedule(&self, id: TaskId) -> TaskResult<TaskHandle> {
        let record = self
            .shared
            .stores
            .tasks
            .get_task(id)?
            .ok_or(TaskError::TaskMissing(id))?;
        if record.status != TaskStatus::Failed {
            return Err(TaskError::Precondition(format!(
                "task {id} is {:?}, only failed tasks can be rescheduled",
                record.status
            )));
        }
        debug!(task = %id, "Rescheduling failed task");
        self.schedule(record.request)
    }

    /// Current record of a task.
    pub fn task(&self, id: TaskId) -> TaskResult<Option<TaskRecord>> {
        self.shared.stores.tasks.get_task(id)
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.shared.config
    }

    /// Stop accepting tasks and wait for queued ones to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.sender.take().is_none() {
            return;
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                error!("Task worker panicked");
            }
        }
        info!("Task executor stopped");
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: &Shared, jobs: Receiver<Job>) {
    for job in jobs.iter() {
        let Job {
            mut task,
            record,
            reply,
        } = job;
        let record = execute(shared, task.as_mut(), record);
        // The caller may have dropped its handle.
        let _ = reply.send(record);
    }
}

/// Move the record to `next` and persist it.
///
/// The in-memory record moves even when persisting fails, so a later
/// terminal write still follows an allowed transition.
fn advance(shared: &Shared, record: &mut TaskRecord, next: TaskStatus) -> TaskResult<()> {
    record.transition(next)?;
    shared.stores.tasks.update_task(record)?;
    debug!(task = %record.id, status = ?next, "Task status changed");
    Ok(())
}

/// Run one task through PENDING, RUNNING and a terminal state.
fn execute(shared: &Shared, task: &mut dyn TrackTask, mut record: TaskRecord) -> TaskRecord {
    let id = record.id;
    let target = task.target().clone();
    let mut locked = false;

    let outcome = run_locked(shared, task, &mut record, &mut locked);
    let terminal = match &outcome {
        Ok(_) => TaskStatus::Succeeded,
        Err(_) => TaskStatus::Failed,
    };
    match outcome {
        Ok(result) => record.result = Some(result),
        Err(e) => {
            warn!(task = %id, track = %target, error = %e, "Task failed");
            record.error = Some(e.to_string());
        }
    }
    if let Err(e) = advance(shared, &mut record, terminal) {
        error!(task = %id, error = %e, "Could not persist final task state");
    }
    if terminal == TaskStatus::Succeeded {
        info!(task = %id, track = %target, "Task succeeded");
    }

    if locked {
        // Failures are logged inside; the lock stays set.
        let _ = lock::release(shared.stores.tracks.as_ref(), &target, id);
    }
    record
}

fn run_locked(
    shared: &Shared,
    task: &mut dyn TrackTask,
    record: &mut TaskRecord,
    locked: &mut bool,
) -> TaskResult<serde_json::Value> {
    advance(shared, record, TaskStatus::Pending)?;

    let placeholder = task.placeholder();
    let track = lock::acquire(
        shared.stores.tracks.as_ref(),
        task.target(),
        record.id,
        placeholder.as_ref(),
        &shared.config.lock,
    )?;
    *locked = true;

    advance(shared, record, TaskStatus::Running)?;
    let ctx = TaskContext {
        id: record.id,
        stores: &shared.stores,
        config: &shared.config,
    };
    panic::catch_unwind(AssertUnwindSafe(|| task.run(&ctx, track))).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        Err(TaskError::Panicked(message))
    })
}

/// Completion handle for a scheduled task.
///
/// Resolves with the final task record once the task has succeeded or
/// failed. Usable from blocking code via [`TaskHandle::wait`] or awaited
/// directly.
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    receiver: oneshot::Receiver<TaskRecord>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Block until the task finishes. Must not be called from async code.
    pub fn wait(self) -> TaskResult<TaskRecord> {
        self.receiver.blocking_recv().map_err(|_| TaskError::WorkerGone)
    }
}

impl Future for TaskHandle {
    type Output = TaskResult<TaskRecord>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|result| result.map_err(|_| TaskError::WorkerGone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LockConfig;
    use crate::memory::{MemoryMediaStore, MemoryTaskStore, MemoryTrackStore};
    use crate::model::{MediaLocation, TrackKey, TrackRecord};
    use crate::request::ProcessUploadRequest;
    use crate::store::{MediaStore, TaskStore, TrackStore};
    use parking_lot::Mutex;
    use partmix_audio::AudioStream;
    use partmix_core::{ByteOrder, PcmFormat};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Media store that can fail writes and tracks overlapping writes.
    #[derive(Default)]
    struct Instrumented {
        inner: MemoryMediaStore,
        fail_puts: AtomicBool,
        active: Mutex<usize>,
        max_active: Mutex<usize>,
    }

    impl MediaStore for Instrumented {
        fn get_media(&self, location: &MediaLocation) -> TaskResult<Box<dyn AudioStream>> {
            self.inner.get_media(location)
        }

        fn put_media(
            &self,
            location: &MediaLocation,
            stream: &mut dyn AudioStream,
        ) -> TaskResult<u64> {
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err(TaskError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            {
                let mut active = self.active.lock();
                *active += 1;
                let mut max = self.max_active.lock();
                *max = (*max).max(*active);
            }
            thread::sleep(Duration::from_millis(50));
            let result = self.inner.put_media(location, stream);
            *self.active.lock() -= 1;
            result
        }

        fn exists(&self, location: &MediaLocation) -> TaskResult<bool> {
            self.inner.exists(location)
        }
    }

    struct Fixture {
        tracks: Arc<MemoryTrackStore>,
        media: Arc<Instrumented>,
        tasks: Arc<MemoryTaskStore>,
        executor: TaskExecutor,
    }

    fn fixture(workers: usize) -> Fixture {
        let tracks = Arc::new(MemoryTrackStore::new());
        let media = Arc::new(Instrumented::default());
        let tasks = Arc::new(MemoryTaskStore::new());
        let stores = Stores::new(tracks.clone(), media.clone(), tasks.clone());
        let config = ExecutorConfig {
            worker_threads: workers,
            lock: LockConfig {
                poll_interval: Duration::from_millis(10),
                timeout: Duration::from_secs(5),
            },
            ..Default::default()
        };
        let executor = TaskExecutor::new(stores, config).unwrap();

        tracks
            .write_track(&TrackRecord::new_part(TrackKey::new("song", "lead")))
            .unwrap();
        media.inner.insert(
            MediaLocation::new("uploads/lead.pcm"),
            PcmFormat::mono16(8000, ByteOrder::Little),
            vec![0u8; 16000],
        );
        Fixture {
            tracks,
            media,
            tasks,
            executor,
        }
    }

    fn upload() -> ProcessUploadRequest {
        ProcessUploadRequest {
            target: TrackKey::new("song", "lead"),
            upload: MediaLocation::new("uploads/lead.pcm"),
        }
    }

    #[test]
    fn test_upload_succeeds_through_every_state() {
        let f = fixture(2);
        let handle = f.executor.schedule(upload()).unwrap();
        let id = handle.id();
        let record = handle.wait().unwrap();

        assert_eq!(record.status, TaskStatus::Succeeded);
        assert_eq!(record.result.as_ref().unwrap()["frames"], 8000);
        assert_eq!(
            f.tasks.status_history(id),
            vec![
                TaskStatus::Scheduled,
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Succeeded
            ]
        );
        let track = f.tracks.require_track(&TrackKey::new("song", "lead")).unwrap();
        assert!(!track.is_locked());
        assert_eq!(track.duration_secs, Some(1.0));
        assert_eq!(
            track.media,
            Some(MediaLocation::for_task(&track.key, id))
        );
        assert_eq!(f.executor.task(id).unwrap(), Some(record));
    }

    #[test]
    fn test_failed_validation_creates_no_record() {
        let f = fixture(1);
        let request = ProcessUploadRequest {
            target: TrackKey::new("song", "missing"),
            upload: MediaLocation::new("uploads/lead.pcm"),
        };
        assert!(matches!(
            f.executor.schedule(request),
            Err(TaskError::NotFound(_))
        ));
        assert!(f.tasks.all().is_empty());
    }

    #[test]
    fn test_same_track_tasks_never_overlap() {
        let f = fixture(4);
        let handles: Vec<_> = (0..3)
            .map(|_| f.executor.schedule(upload()).unwrap())
            .collect();
        for handle in handles {
            assert_eq!(handle.wait().unwrap().status, TaskStatus::Succeeded);
        }
        assert_eq!(*f.media.max_active.lock(), 1);
    }

    #[test]
    fn test_failure_is_recorded_and_rescheduled() {
        let f = fixture(1);
        f.media.fail_puts.store(true, Ordering::SeqCst);
        let failed = f.executor.schedule(upload()).unwrap().wait().unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert!(failed.error.as_deref().unwrap().contains("disk full"));
        assert_eq!(
            f.tasks.status_history(failed.id),
            vec![
                TaskStatus::Scheduled,
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Failed
            ]
        );
        // The lock is released on failure too.
        assert!(!f
            .tracks
            .require_track(&TrackKey::new("song", "lead"))
            .unwrap()
            .is_locked());

        f.media.fail_puts.store(false, Ordering::SeqCst);
        let retried = f.executor.reschedule(failed.id).unwrap().wait().unwrap();
        assert_eq!(retried.status, TaskStatus::Succeeded);
        assert_ne!(retried.id, failed.id);
        assert_eq!(retried.request, failed.request);

        assert!(matches!(
            f.executor.reschedule(retried.id),
            Err(TaskError::Precondition(_))
        ));
        assert!(matches!(
            f.executor.reschedule(TaskId::new()),
            Err(TaskError::TaskMissing(_))
        ));
    }

    #[test]
    fn test_lock_timeout_fails_from_pending() {
        let f = fixture(1);
        let key = TrackKey::new("song", "lead");
        let mut held = f.tracks.require_track(&key).unwrap();
        held.task_id = Some(TaskId::new());
        f.tracks.write_track(&held).unwrap();

        let tracks = f.tracks.clone();
        let media = f.media.clone();
        let tasks = f.tasks.clone();
        drop(f.executor);
        let executor = TaskExecutor::new(
            Stores::new(tracks, media, tasks.clone()),
            ExecutorConfig {
                worker_threads: 1,
                lock: LockConfig {
                    poll_interval: Duration::from_millis(5),
                    timeout: Duration::from_millis(50),
                },
                ..Default::default()
            },
        )
        .unwrap();

        let record = executor.schedule(upload()).unwrap().wait().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.started_at.is_none());
        assert_eq!(
            tasks.status_history(record.id),
            vec![TaskStatus::Scheduled, TaskStatus::Pending, TaskStatus::Failed]
        );
    }

    /// Task store whose first `failures` updates are lost.
    struct DroppingUpdates {
        inner: MemoryTaskStore,
        failures: AtomicUsize,
    }

    impl TaskStore for DroppingUpdates {
        fn create_task(&self, record: &TaskRecord) -> TaskResult<()> {
            self.inner.create_task(record)
        }

        fn update_task(&self, record: &TaskRecord) -> TaskResult<()> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(TaskError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "task store unavailable",
                )));
            }
            self.inner.update_task(record)
        }

        fn get_task(&self, id: TaskId) -> TaskResult<Option<TaskRecord>> {
            self.inner.get_task(id)
        }
    }

    #[test]
    fn test_unpersisted_pending_still_ends_failed() {
        let f = fixture(1);
        let tracks = f.tracks.clone();
        let media = f.media.clone();
        drop(f.executor);
        let tasks = Arc::new(DroppingUpdates {
            inner: MemoryTaskStore::new(),
            failures: AtomicUsize::new(1),
        });
        let executor = TaskExecutor::new(
            Stores::new(tracks.clone(), media, tasks.clone()),
            ExecutorConfig {
                worker_threads: 1,
                ..Default::default()
            },
        )
        .unwrap();

        let record = executor.schedule(upload()).unwrap().wait().unwrap();
        assert_eq!(record.status, TaskStatus::Failed);
        assert!(record.error.as_deref().unwrap().contains("task store unavailable"));
        let stored = tasks.get_task(record.id).unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Failed);
        assert_eq!(
            tasks.inner.status_history(record.id),
            vec![TaskStatus::Scheduled, TaskStatus::Failed]
        );
        // The lock was never taken.
        assert!(!tracks
            .require_track(&TrackKey::new("song", "lead"))
            .unwrap()
            .is_locked());
    }

    #[tokio::test]
    async fn test_handle_can_be_awaited() {
        let f = fixture(1);
        let handle = f.executor.schedule(upload()).unwrap();
        let record = handle.await.unwrap();
        assert_eq!(record.status, TaskStatus::Succeeded);
    }
}
