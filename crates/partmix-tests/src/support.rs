//! Shared fixtures for the integration tests.

use partmix_audio::{AudioStream, PcmStream};
use partmix_core::{f32_to_pcm16, ByteOrder, PcmFormat};
use partmix_tasks::{
    ExecutorConfig, LockConfig, MediaLocation, MemoryMediaStore, MemoryTaskStore,
    MemoryTrackStore, Stores, TaskExecutor, TrackKey, TrackRecord, TrackStore,
};
use std::io::Cursor;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const SAMPLE_RATE: u32 = 44100;
pub const SONG: &str = "song-1";
pub const QUARTET: [&str; 4] = ["tenor", "lead", "bari", "bass"];

/// Route `tracing` output through the test harness, once per process.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn format() -> PcmFormat {
    PcmFormat::mono16(SAMPLE_RATE, ByteOrder::Little)
}

pub fn pcm(samples: &[f32]) -> Vec<u8> {
    let mut out = vec![0u8; samples.len() * 2];
    f32_to_pcm16(samples, ByteOrder::Little, &mut out);
    out
}

pub fn decode(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// A constant-level signal, handy for checking weights exactly.
pub fn constant(level: f32, frames: usize) -> Vec<f32> {
    vec![level; frames]
}

pub fn sine(freq: f32, frames: usize) -> Vec<f32> {
    (0..frames)
        .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin() * 0.4)
        .collect()
}

pub fn stream(samples: &[f32]) -> Box<dyn AudioStream> {
    Box::new(PcmStream::new(format(), Cursor::new(pcm(samples))))
}

/// Memory-backed stores plus an executor over them.
pub struct Studio {
    pub tracks: Arc<MemoryTrackStore>,
    pub media: Arc<MemoryMediaStore>,
    pub tasks: Arc<MemoryTaskStore>,
    pub executor: TaskExecutor,
}

impl Studio {
    pub fn new() -> Self {
        init_tracing();
        let tracks = Arc::new(MemoryTrackStore::new());
        let media = Arc::new(MemoryMediaStore::new());
        let tasks = Arc::new(MemoryTaskStore::new());
        let config = ExecutorConfig {
            worker_threads: 4,
            lock: LockConfig {
                poll_interval: Duration::from_millis(10),
                timeout: Duration::from_secs(10),
            },
            ..Default::default()
        };
        let executor = TaskExecutor::new(
            Stores::new(tracks.clone(), media.clone(), tasks.clone()),
            config,
        )
        .expect("executor starts");
        Self {
            tracks,
            media,
            tasks,
            executor,
        }
    }

    pub fn key(track: &str) -> TrackKey {
        TrackKey::new(SONG, track)
    }

    /// Store raw upload bytes and create an empty part track for them.
    pub fn stage_upload(&self, part: &str, samples: &[f32]) -> MediaLocation {
        let upload = MediaLocation::new(format!("uploads/{part}.pcm"));
        self.media.insert(upload.clone(), format(), pcm(samples));
        self.tracks
            .write_track(&TrackRecord::new_part(Self::key(part)))
            .expect("part track created");
        upload
    }

    /// Part track with media already in place.
    pub fn add_part(&self, part: &str, samples: &[f32]) {
        let location = MediaLocation::new(format!("parts/{part}.pcm"));
        self.media.insert(location.clone(), format(), pcm(samples));
        self.tracks
            .write_track(&TrackRecord::new_part(Self::key(part)).with_media(location))
            .expect("part track created");
    }

    pub fn track(&self, track: &str) -> TrackRecord {
        self.tracks
            .require_track(&Self::key(track))
            .expect("track exists")
    }
}
