//! Pull-based PCM streams.

use partmix_core::PcmFormat;
use std::io::{self, Read};

/// A readable PCM byte stream with a known format.
///
/// `read` follows the usual `Read` contract: `Ok(0)` means end of stream.
pub trait AudioStream: Read + Send {
    /// Format of the bytes produced by `read`.
    fn format(&self) -> PcmFormat;

    /// Release resources held by the stream (worker threads, inputs).
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: AudioStream + ?Sized> AudioStream for Box<S> {
    fn format(&self) -> PcmFormat {
        (**self).format()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Any reader tagged with a declared PCM format.
pub struct PcmStream<R> {
    format: PcmFormat,
    reader: R,
}

impl<R: Read + Send> PcmStream<R> {
    /// Wrap `reader`, declaring its bytes to be in `format`.
    pub fn new(format: PcmFormat, reader: R) -> Self {
        Self { format, reader }
    }

    /// Unwrap the inner reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read + Send> Read for PcmStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl<R: Read + Send> AudioStream for PcmStream<R> {
    fn format(&self) -> PcmFormat {
        self.format
    }
}

/// Read until `buf` is full or the reader reports end of stream.
///
/// Short reads are retried against the same reader; only EOF ends the
/// loop early. Returns the number of bytes placed in `buf`.
pub fn read_fully<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
