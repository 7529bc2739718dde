//! One appender and one trailing reader over the same growing file.
//!
//! [`synced`] splits a write handle and an independently opened read handle
//! on the same file into a [`SyncedWriter`] and a [`SyncedReader`]. The
//! reader never runs ahead of the writer: while it has consumed everything
//! written so far it sleeps until more bytes are appended or the writer
//! closes the stream.
//!
//! `written` is only advanced by the writer half and `read` only by the
//! reader half. `blocked` makes the writer notify once per sleep, not once
//! per write.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

use tracing::trace;

#[derive(Debug, Default)]
struct Progress {
    written: u64,
    read: u64,
    closed: bool,
    blocked: bool,
}

#[derive(Debug, Default)]
struct Shared {
    progress: Mutex<Progress>,
    news: Condvar,
}

impl Shared {
    // Counters stay consistent under every lock, so a poisoned guard is safe
    // to keep using.
    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn advance_written(&self, n: usize) {
        let mut p = self.lock();
        p.written += n as u64;
        if p.blocked && p.written > p.read {
            p.blocked = false;
            self.news.notify_one();
        }
    }

    fn advance_read(&self, n: usize) {
        self.lock().read += n as u64;
    }

    fn reset_read(&self, position: u64) {
        self.lock().read = position;
    }

    /// Sleep while everything written has been read and the stream is open.
    /// Returns whether the stream was closed when the wait ended.
    fn wait_for_data(&self) -> bool {
        let mut p = self.lock();
        while p.read >= p.written && !p.closed {
            p.blocked = true;
            trace!(read = p.read, written = p.written, "reader waiting for data");
            p = self.news.wait(p).unwrap_or_else(PoisonError::into_inner);
        }
        p.closed
    }

    fn close(&self) {
        let mut p = self.lock();
        if p.closed {
            return;
        }
        p.closed = true;
        p.blocked = false;
        self.news.notify_all();
    }
}

/// Closes the stream when the writer half goes away, however that happens.
#[derive(Debug)]
struct CloseOnDrop(Arc<Shared>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Split `writer` and `reader`, two handles on the same file, into a
/// synchronized pair.
pub fn synced<W: Write, R: Read>(writer: W, reader: R) -> (SyncedWriter<W>, SyncedReader<R>) {
    let shared = Arc::new(Shared::default());
    let writer = SyncedWriter {
        inner: writer,
        guard: CloseOnDrop(shared.clone()),
    };
    let reader = SyncedReader {
        inner: reader,
        shared,
    };
    (writer, reader)
}

/// Append side. Dropping it closes the stream.
#[derive(Debug)]
pub struct SyncedWriter<W = File> {
    inner: W,
    guard: CloseOnDrop,
}

impl<W: Write> SyncedWriter<W> {
    /// Mark the stream closed and release a waiting reader. Idempotent.
    pub fn close(&self) {
        self.guard.0.close();
    }

    /// Bytes appended so far.
    pub fn bytes_written(&self) -> u64 {
        self.guard.0.lock().written
    }

    /// Close the stream and hand back the write handle.
    pub fn into_inner(self) -> W {
        let Self { inner, guard } = self;
        drop(guard);
        inner
    }
}

impl<W: Write> Write for SyncedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.guard.0.advance_written(n);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Trailing read side.
///
/// `read` blocks until the writer has appended bytes past the reader's
/// position, and reports end-of-stream only after the writer closed. Short
/// reads are returned as they are.
#[derive(Debug)]
pub struct SyncedReader<R = File> {
    inner: R,
    shared: Arc<Shared>,
}

impl<R> SyncedReader<R> {
    /// Bytes consumed so far.
    pub fn bytes_read(&self) -> u64 {
        self.shared.lock().read
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl<R: Read> Read for SyncedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            let closed = self.shared.wait_for_data();
            let n = self.inner.read(buf)?;
            if n > 0 {
                self.shared.advance_read(n);
                return Ok(n);
            }
            // Every write happens before close, so an empty read observed
            // after close is the real end of the file.
            if closed {
                return Ok(0);
            }
            // The counters said data was there but the read came back empty.
            thread::yield_now();
        }
    }
}

impl<R: Seek> Seek for SyncedReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let position = self.inner.seek(pos)?;
        if !matches!(pos, SeekFrom::Current(_)) {
            self.shared.reset_read(position);
        }
        Ok(position)
    }
}
