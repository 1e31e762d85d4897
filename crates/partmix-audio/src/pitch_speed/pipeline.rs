//! Push-based processing: a dispatcher drives blocks through processors
//! and hands the results to a sink.

use super::PitchSpeed;
use crate::debugger::AudioDebugger;
use crate::stream::{read_fully, AudioStream};
use crossbeam_channel::Sender;
use partmix_core::{f32_to_pcm16, pcm16_to_f32, ByteOrder};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// One stage of a push pipeline. Output length may differ from input length.
pub trait AudioProcessor {
    /// Transform one block of mono samples.
    fn process(&mut self, block: Vec<f32>) -> io::Result<Vec<f32>>;

    /// Emit anything still buffered once the input has ended.
    fn finish(&mut self) -> io::Result<Vec<f32>> {
        Ok(Vec::new())
    }
}

/// A producer that runs to completion, pushing its output into a sink.
pub trait PushPipeline: Send + 'static {
    fn run(self: Box<Self>, sink: &mut ChunkSink) -> io::Result<()>;
}

/// Messages from the worker to the reader.
#[derive(Debug)]
pub(crate) enum Chunk {
    Data(Vec<u8>),
    /// The pipeline completed; no more data follows.
    End,
    Failed(String),
}

/// Worker-side end of the adapter queue.
pub struct ChunkSink {
    sender: Sender<Chunk>,
    byte_order: ByteOrder,
    cancelled: Arc<AtomicBool>,
    debugger: AudioDebugger,
    frames_pushed: u64,
}

impl ChunkSink {
    pub(crate) fn new(
        sender: Sender<Chunk>,
        byte_order: ByteOrder,
        cancelled: Arc<AtomicBool>,
        debugger: AudioDebugger,
    ) -> Self {
        Self {
            sender,
            byte_order,
            cancelled,
            debugger,
            frames_pushed: 0,
        }
    }

    /// Whether the reader asked the worker to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Frames accepted so far.
    pub fn frames_pushed(&self) -> u64 {
        self.frames_pushed
    }

    /// Encode and enqueue mono samples, blocking while the queue is full.
    ///
    /// Returns `false` once the reader is gone or has cancelled; the
    /// pipeline should stop producing.
    pub fn push(&mut self, samples: &[f32]) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if samples.is_empty() {
            return true;
        }
        self.debugger.observe(samples, 1);
        let mut bytes = vec![0u8; samples.len() * 2];
        f32_to_pcm16(samples, self.byte_order, &mut bytes);
        if self.sender.send(Chunk::Data(bytes)).is_err() {
            return false;
        }
        self.frames_pushed += samples.len() as u64;
        !self.is_cancelled()
    }

    pub(crate) fn end(&self) {
        let _ = self.sender.send(Chunk::End);
    }

    pub(crate) fn fail(&self, error: &io::Error) {
        let _ = self.sender.send(Chunk::Failed(error.to_string()));
    }
}

/// Reads a mono 16-bit source block by block and pushes each block through
/// the pitch/speed processors.
///
/// The processor chain is built on the worker thread when `run` starts.
pub struct Dispatcher {
    source: Box<dyn AudioStream>,
    transform: PitchSpeed,
    block_frames: usize,
}

impl Dispatcher {
    pub fn new(source: Box<dyn AudioStream>, transform: PitchSpeed, block_frames: usize) -> Self {
        Self {
            source,
            transform,
            block_frames: block_frames.max(1),
        }
    }

    fn pump(
        &mut self,
        chain: &mut [Box<dyn AudioProcessor>],
        sink: &mut ChunkSink,
    ) -> io::Result<()> {
        let format = self.source.format();
        let mut raw = vec![0u8; self.block_frames * format.frame_size()];
        let mut blocks = 0u64;

        loop {
            if sink.is_cancelled() {
                debug!(blocks, "Dispatcher interrupted");
                return Ok(());
            }
            let frames = read_fully(&mut self.source, &mut raw)? / 2;
            if frames == 0 {
                break;
            }
            let mut block = vec![0.0f32; frames];
            pcm16_to_f32(&raw[..frames * 2], format.byte_order, &mut block);
            for processor in chain.iter_mut() {
                block = processor.process(block)?;
            }
            blocks += 1;
            if !sink.push(&block) {
                debug!(blocks, "Reader gone, dispatcher stopping");
                return Ok(());
            }
        }

        // Flush each stage and run its tail through the stages after it.
        for stage in 0..chain.len() {
            let (head, rest) = chain.split_at_mut(stage + 1);
            let mut tail = head[stage].finish()?;
            for processor in rest.iter_mut() {
                tail = processor.process(tail)?;
            }
            if !sink.push(&tail) {
                return Ok(());
            }
        }

        debug!(blocks, frames = sink.frames_pushed(), "Dispatcher finished");
        Ok(())
    }
}

impl PushPipeline for Dispatcher {
    fn run(mut self: Box<Self>, sink: &mut ChunkSink) -> io::Result<()> {
        let format = self.source.format();
        let mut chain = self
            .transform
            .build_chain(format.sample_rate, self.block_frames)
            .map_err(|e| e.into_io())?;

        let outcome = self.pump(&mut chain, sink);
        let closed = self.source.close();
        outcome.and(closed)
    }
}
