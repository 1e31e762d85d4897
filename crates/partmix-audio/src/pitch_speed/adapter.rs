//! Pull-stream adapter around a push pipeline running on its own thread.

use super::pipeline::{Chunk, ChunkSink, Dispatcher, PushPipeline};
use super::{AdapterConfig, PitchSpeed};
use crate::debugger::AudioDebugger;
use crate::stream::AudioStream;
use crossbeam_channel::{bounded, Receiver};
use partmix_core::{PartmixError, PcmFormat, Result};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Interval between checks while waiting for the worker to exit.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Reads the output of a [`PushPipeline`] as a byte stream.
///
/// The pipeline runs on a dedicated worker thread and hands finished
/// chunks over a bounded queue; a full queue blocks the worker until the
/// reader catches up.
pub struct PitchSpeedAdapter {
    format: PcmFormat,
    receiver: Option<Receiver<Chunk>>,
    current: Vec<u8>,
    position: usize,
    finished: bool,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl PitchSpeedAdapter {
    /// Apply `transform` to a 16-bit mono `source`.
    ///
    /// The output has the same format as the source.
    pub fn new(
        source: Box<dyn AudioStream>,
        transform: PitchSpeed,
        config: &AdapterConfig,
    ) -> Result<Self> {
        let format = source.format();
        format.ensure_mono16()?;
        transform.validate()?;
        debug!(
            pitch_shift = transform.pitch_shift,
            speed_factor = transform.speed_factor,
            tempo = transform.stretch_tempo(),
            "Starting pitch/speed transform"
        );
        let dispatcher = Dispatcher::new(source, transform, config.block_frames);
        Self::spawn(format, Box::new(dispatcher), config)
    }

    /// Run an arbitrary pipeline producing mono samples in `format`.
    pub fn spawn(
        format: PcmFormat,
        pipeline: Box<dyn PushPipeline>,
        config: &AdapterConfig,
    ) -> Result<Self> {
        let (sender, receiver) = bounded(config.queue_capacity.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut sink = ChunkSink::new(
            sender,
            format.byte_order,
            Arc::clone(&cancelled),
            AudioDebugger::new("pitch_speed.out", config.debug.clone()),
        );

        let worker = thread::Builder::new()
            .name("partmix-pitch-speed".into())
            .spawn(move || match pipeline.run(&mut sink) {
                Ok(()) => sink.end(),
                Err(e) => {
                    warn!(error = %e, "Pitch/speed pipeline failed");
                    sink.fail(&e);
                }
            })
            .map_err(PartmixError::Io)?;

        Ok(Self {
            format,
            receiver: Some(receiver),
            current: Vec::new(),
            position: 0,
            finished: false,
            cancelled,
            worker: Some(worker),
            join_timeout: config.join_timeout,
        })
    }

    /// Whether the worker thread is still alive.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Stop the worker and release the stream.
    ///
    /// Waits up to the join timeout for the worker to finish on its own,
    /// then interrupts it (cancel flag plus disconnecting the queue so a
    /// blocked send returns) and waits once more. A worker that is still
    /// alive after that is detached.
    pub fn close(&mut self) -> io::Result<()> {
        self.finished = true;
        self.current = Vec::new();
        self.position = 0;

        let Some(worker) = self.worker.take() else {
            self.receiver = None;
            return Ok(());
        };

        if !wait_for_exit(&worker, self.join_timeout) {
            debug!("Interrupting pitch/speed worker");
            self.cancelled.store(true, Ordering::Release);
            self.receiver = None;
            if !wait_for_exit(&worker, self.join_timeout) {
                warn!("Pitch/speed worker did not stop, detaching");
                return Ok(());
            }
        }
        self.receiver = None;

        if worker.join().is_err() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "pitch/speed worker panicked",
            ));
        }
        Ok(())
    }
}

fn wait_for_exit(worker: &JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while !worker.is_finished() {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        thread::sleep(JOIN_POLL_INTERVAL.min(deadline - now));
    }
    true
}

impl Read for PitchSpeedAdapter {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.position < self.current.len() {
                let n = buf.len().min(self.current.len() - self.position);
                buf[..n].copy_from_slice(&self.current[self.position..self.position + n]);
                self.position += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            let Some(receiver) = &self.receiver else {
                return Ok(0);
            };
            match receiver.recv() {
                Ok(Chunk::Data(bytes)) => {
                    self.current = bytes;
                    self.position = 0;
                }
                Ok(Chunk::End) => {
                    self.finished = true;
                    return Ok(0);
                }
                Ok(Chunk::Failed(message)) => {
                    self.finished = true;
                    return Err(io::Error::new(io::ErrorKind::Other, message));
                }
                Err(_) => {
                    self.finished = true;
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "pitch/speed worker exited without finishing",
                    ));
                }
            }
        }
    }
}

impl AudioStream for PitchSpeedAdapter {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn close(&mut self) -> io::Result<()> {
        PitchSpeedAdapter::close(self)
    }
}

impl Drop for PitchSpeedAdapter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close pitch/speed adapter");
        }
    }
}
