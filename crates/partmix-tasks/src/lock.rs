//! Per-track exclusive lock built on conditional writes.
//!
//! The holder's task id is stored on the track record itself. Taking the
//! lock is a versioned write that sets it; a conflicting write means some
//! other task got there first and the attempt starts over.

use crate::config::LockConfig;
use crate::error::{TaskError, TaskResult};
use crate::model::{TaskId, TrackKey, TrackRecord};
use crate::store::TrackStore;
use std::thread;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Take the lock on `key` for `owner`.
///
/// When the track does not exist and a `placeholder` is given, the lock is
/// taken by creating the placeholder with `owner` already set. Returns the
/// stored record as seen right after acquisition.
pub fn acquire(
    tracks: &dyn TrackStore,
    key: &TrackKey,
    owner: TaskId,
    placeholder: Option<&TrackRecord>,
    config: &LockConfig,
) -> TaskResult<TrackRecord> {
    let started = Instant::now();
    let deadline = started + config.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let candidate = match tracks.get_track(key)? {
            Some(record) if record.task_id == Some(owner) => return Ok(record),
            Some(record) if record.is_locked() => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(TaskError::LockTimeout {
                        track: key.to_string(),
                        waited: now - started,
                    });
                }
                debug!(
                    track = %key,
                    holder = ?record.task_id,
                    task = %owner,
                    "Track locked, waiting"
                );
                thread::sleep(config.poll_interval.min(deadline - now));
                continue;
            }
            Some(mut record) => {
                record.task_id = Some(owner);
                record
            }
            None => {
                let Some(placeholder) = placeholder else {
                    return Err(TaskError::NotFound(format!("track {key}")));
                };
                let mut record = placeholder.clone();
                record.key = key.clone();
                record.task_id = Some(owner);
                record.etag = None;
                record
            }
        };

        match tracks.write_track(&candidate) {
            Ok(record) => {
                info!(track = %key, task = %owner, attempts, "Track lock acquired");
                return Ok(record);
            }
            Err(TaskError::Conflict(_)) => {
                debug!(track = %key, task = %owner, "Lost lock race, retrying");
                let now = Instant::now();
                if now >= deadline {
                    return Err(TaskError::LockTimeout {
                        track: key.to_string(),
                        waited: now - started,
                    });
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Clear `owner`'s lock on `key`.
///
/// A conflicting write is reported and not retried; the lock then stays
/// set until cleared by hand.
pub fn release(tracks: &dyn TrackStore, key: &TrackKey, owner: TaskId) -> TaskResult<()> {
    let Some(mut record) = tracks.get_track(key)? else {
        warn!(track = %key, task = %owner, "Track vanished before lock release");
        return Ok(());
    };
    if record.task_id != Some(owner) {
        warn!(
            track = %key,
            task = %owner,
            holder = ?record.task_id,
            "Lock not held by task, leaving it alone"
        );
        return Ok(());
    }
    record.task_id = None;
    match tracks.write_track(&record) {
        Ok(_) => {
            info!(track = %key, task = %owner, "Track lock released");
            Ok(())
        }
        Err(e) => {
            warn!(track = %key, task = %owner, error = %e, "Failed to release track lock");
            Err(e)
        }
    }
}
