//! Source and sink seams of the decoder pipeline.
//!
//! The decoder pulls bytes through [`ByteSource`] and pushes interleaved
//! f32 samples through [`SampleSink`]; both are narrow traits so callers
//! can plug in files, network streams, ring buffers or test fixtures.

use std::io::{Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A pull-style byte source, optionally seekable.
pub trait ByteSource {
    /// Read up to `buf.len()` bytes, returning the number read. Zero means
    /// end of stream.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Whether [`seek`](ByteSource::seek) is supported.
    fn can_seek(&self) -> bool;

    /// Reposition the source. Fails with [`Error::Unsupported`] on
    /// non-seekable sources.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Current byte offset from the start of the stream.
    fn position(&self) -> u64;

    /// Bytes left until the end, when known.
    fn remaining(&self) -> Option<u64> {
        None
    }

    /// Fill `buf` completely or fail with an I/O unexpected-EOF error.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "source ended mid-read",
                )));
            }
            filled += n;
        }
        Ok(())
    }
}

/// A seekable source over any `Read + Seek`, e.g. a file or a cursor.
pub struct RandomAccessSource<R> {
    inner: R,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> RandomAccessSource<R> {
    /// Wrap `inner`, measuring its length and rewinding to the start.
    pub fn new(mut inner: R) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, pos: 0, len })
    }

    /// Unwrap the inner reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> ByteSource for RandomAccessSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn can_seek(&self) -> bool {
        true
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.pos = self.inner.seek(pos)?;
        Ok(self.pos)
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn remaining(&self) -> Option<u64> {
        Some(self.len.saturating_sub(self.pos))
    }
}

/// A forward-only source over any `Read`, e.g. a network stream.
pub struct StreamSource<R> {
    inner: R,
    pos: u64,
}

impl<R: Read> StreamSource<R> {
    /// Wrap `inner`.
    pub fn new(inner: R) -> Self {
        Self { inner, pos: 0 }
    }
}

impl<R: Read> ByteSource for StreamSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.inner.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn can_seek(&self) -> bool {
        false
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        Err(Error::unsupported("source is not seekable"))
    }

    fn position(&self) -> u64 {
        self.pos
    }
}

/// A push-style sink for interleaved f32 samples.
pub trait SampleSink {
    /// Borrow a writable region of at least `min_samples` samples.
    fn get_writable(&mut self, min_samples: usize) -> &mut [f32];

    /// Commit `samples_written` samples of the region returned by the last
    /// [`get_writable`](SampleSink::get_writable) call.
    fn advance(&mut self, samples_written: usize);
}

/// A sink collecting all committed samples into a vector.
#[derive(Debug, Default)]
pub struct VecSink {
    buf: Vec<f32>,
    committed: usize,
}

impl VecSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All committed samples, interleaved.
    pub fn samples(&self) -> &[f32] {
        &self.buf[..self.committed]
    }

    /// Number of committed samples.
    pub fn len(&self) -> usize {
        self.committed
    }

    /// Whether no samples were committed.
    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }
}

impl SampleSink for VecSink {
    fn get_writable(&mut self, min_samples: usize) -> &mut [f32] {
        self.buf.resize(self.committed + min_samples, 0.0);
        &mut self.buf[self.committed..]
    }

    fn advance(&mut self, samples_written: usize) {
        self.committed += samples_written;
        self.buf.truncate(self.committed);
    }
}

/// A cloneable cooperative cancellation flag.
///
/// The decoder checks the token at every page fetch and packet boundary;
/// reads already in flight complete first.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Fail with [`Error::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn random_access_source_tracks_position() {
        let mut src = RandomAccessSource::new(Cursor::new(vec![1u8, 2, 3, 4, 5])).unwrap();
        assert_eq!(src.remaining(), Some(5));
        let mut buf = [0u8; 2];
        src.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2]);
        assert_eq!(src.position(), 2);
        src.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(src.remaining(), Some(1));
    }

    #[test]
    fn stream_source_rejects_seek() {
        let mut src = StreamSource::new(Cursor::new(vec![0u8; 4]));
        assert!(!src.can_seek());
        assert!(matches!(
            src.seek(SeekFrom::Start(0)),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn vec_sink_commits_only_advanced_samples() {
        let mut sink = VecSink::new();
        let region = sink.get_writable(4);
        region[0] = 1.0;
        region[1] = 2.0;
        sink.advance(2);
        assert_eq!(sink.samples(), &[1.0, 2.0]);

        let region = sink.get_writable(1);
        region[0] = 3.0;
        sink.advance(1);
        assert_eq!(sink.samples(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn cancel_token_trips_once() {
        let token = CancelToken::new();
        let peer = token.clone();
        assert!(token.check().is_ok());
        peer.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }
}
