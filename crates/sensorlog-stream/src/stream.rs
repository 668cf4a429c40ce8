//! Uniform byte stream over a plain file or a decompression pipe
//!
//! [`ByteStream`] hides whether the bytes of a logical path come from the
//! file itself or from its compressed sibling decoded on the fly. Pipes have
//! no native position, so every transferred byte advances a tracked position
//! that serves `tell` and turns forward seeks into read-and-discard.

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::pipe::PipeSource;
use crate::{Result, StreamStats};

/// Direction a stream is opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Read from the file or its compressed sibling
    Read,
    /// Create/truncate the plain file for writing (never compressed)
    Write,
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenMode::Read => write!(f, "read"),
            OpenMode::Write => write!(f, "write"),
        }
    }
}

/// Outcome of [`ByteStream::read_line_bounded`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundedLine {
    /// No bytes left
    Eof,
    /// A line of this many bytes (terminator included) was appended
    Complete(usize),
    /// A line of this many bytes exceeded the limit and was consumed unstored
    Skipped(usize),
}

enum Backend {
    Reader(BufReader<File>),
    Writer(BufWriter<File>),
    Pipe(PipeSource),
}

impl Backend {
    fn mode(&self) -> OpenMode {
        match self {
            Backend::Writer(_) => OpenMode::Write,
            Backend::Reader(_) | Backend::Pipe(_) => OpenMode::Read,
        }
    }

    fn buf_reader(&mut self, operation: &'static str) -> Result<&mut dyn BufRead> {
        match self {
            Backend::Reader(reader) => Ok(reader),
            Backend::Pipe(pipe) => Ok(pipe),
            Backend::Writer(_) => Err(StreamError::WrongMode {
                operation,
                mode: OpenMode::Write,
            }),
        }
    }
}

/// Byte stream bound to one logical path.
///
/// A `ByteStream` starts closed; [`ByteStream::open`] binds it to a path and
/// [`ByteStream::close`] (or drop) releases the file or stops the
/// decompressor.
pub struct ByteStream {
    config: StreamConfig,
    backend: Option<Backend>,
    path: Option<PathBuf>,
    archive: Option<PathBuf>,
    position: u64,
    scratch: Vec<u8>,
    stats: StreamStats,
}

impl ByteStream {
    /// Create a closed stream with the given configuration
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            backend: None,
            path: None,
            archive: None,
            position: 0,
            scratch: Vec::new(),
            stats: StreamStats::default(),
        }
    }

    /// Create a stream and open `path` in one step
    ///
    /// # Errors
    ///
    /// See [`ByteStream::open`].
    pub fn open_path(path: impl AsRef<Path>, mode: OpenMode, config: StreamConfig) -> Result<Self> {
        let mut stream = Self::new(config);
        stream.open(path, mode)?;
        Ok(stream)
    }

    /// Bind the stream to `path`.
    ///
    /// In read mode the plain file and its compressed sibling are tried in the
    /// configured order, falling back to the other form. Write mode only
    /// creates the plain file.
    ///
    /// # Errors
    ///
    /// - [`StreamError::AlreadyOpen`] if the stream is open
    /// - [`StreamError::NotFound`] if neither form can be opened
    /// - [`StreamError::Spawn`] if the archive exists but cannot be decompressed
    /// - [`StreamError::Io`] if the file cannot be created in write mode
    pub fn open(&mut self, path: impl AsRef<Path>, mode: OpenMode) -> Result<()> {
        let path = path.as_ref();
        if let Some(current) = &self.path {
            return Err(StreamError::AlreadyOpen {
                path: current.clone(),
            });
        }

        let backend = match mode {
            OpenMode::Write => Backend::Writer(BufWriter::new(File::create(path)?)),
            OpenMode::Read => self.open_for_read(path)?,
        };

        if let Backend::Pipe(pipe) = &backend {
            self.archive = Some(pipe.archive().to_path_buf());
        }
        debug!(
            path = ?path,
            mode = %mode,
            pipe = matches!(backend, Backend::Pipe(_)),
            "Stream opened"
        );

        self.backend = Some(backend);
        self.path = Some(path.to_path_buf());
        self.position = 0;
        Ok(())
    }

    fn open_for_read(&self, path: &Path) -> Result<Backend> {
        let attempts: [bool; 2] = if self.config.compressed_first() {
            [true, false]
        } else {
            [false, true]
        };

        let mut spawn_failure = None;
        for compressed in attempts {
            if compressed {
                match self.open_compressed(path) {
                    Ok(Some(pipe)) => return Ok(Backend::Pipe(pipe)),
                    Ok(None) => {}
                    Err(e) => spawn_failure = Some(e),
                }
            } else {
                match File::open(path) {
                    Ok(file) => return Ok(Backend::Reader(BufReader::new(file))),
                    Err(e) => trace!(path = ?path, error = %e, "Plain file not available"),
                }
            }
        }

        Err(spawn_failure.unwrap_or_else(|| StreamError::not_found(path)))
    }

    /// `Ok(None)` when no compressed sibling exists.
    fn open_compressed(&self, path: &Path) -> Result<Option<PipeSource>> {
        let archive = self.config.archive_path(path);
        let canonical = match archive.canonicalize() {
            Ok(canonical) if canonical.is_file() => canonical,
            Ok(_) => return Ok(None),
            Err(e) => {
                trace!(archive = ?archive, error = %e, "Compressed sibling not available");
                return Ok(None);
            }
        };
        PipeSource::spawn(&canonical, &self.config.decompressor).map(Some)
    }

    /// Release the file or stop the decompressor. Closing a closed stream is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StreamError::Io`] if buffered writes cannot be flushed.
    pub fn close(&mut self) -> Result<()> {
        self.path = None;
        self.archive = None;
        self.position = 0;
        match self.backend.take() {
            Some(Backend::Writer(mut writer)) => writer.flush()?,
            Some(Backend::Pipe(pipe)) => pipe.shutdown(),
            Some(Backend::Reader(_)) | None => {}
        }
        Ok(())
    }

    /// Whether the stream is bound to a file or pipe
    pub fn is_open(&self) -> bool {
        self.backend.is_some()
    }

    /// Whether the stream reads from a forward-only decompression pipe
    pub fn is_pipe(&self) -> bool {
        matches!(self.backend, Some(Backend::Pipe(_)))
    }

    /// Open mode, if open
    pub fn mode(&self) -> Option<OpenMode> {
        self.backend.as_ref().map(Backend::mode)
    }

    /// Logical path the stream is bound to
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Canonical archive path when reading through a pipe
    pub fn archive_path(&self) -> Option<&Path> {
        self.archive.as_deref()
    }

    /// Stream configuration
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// I/O counters accumulated since creation
    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Current position, or `None` when closed
    pub fn tell(&self) -> Option<u64> {
        self.backend.as_ref().map(|_| self.position)
    }

    /// Fill `buf` as far as the source allows; returns the number of bytes read.
    ///
    /// A return value smaller than `buf.len()` means end of data.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotOpen`], [`StreamError::WrongMode`] or [`StreamError::Io`].
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let reader = self
            .backend
            .as_mut()
            .ok_or(StreamError::NotOpen)?
            .buf_reader("read")?;

        let mut filled = 0;
        while let Some(rest) = buf.get_mut(filled..) {
            if rest.is_empty() {
                break;
            }
            match reader.read(rest) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.advance(filled);
                    return Err(StreamError::from_io(e));
                }
            }
        }
        self.advance(filled);
        Ok(filled)
    }

    /// Read whole elements of `elem_size` bytes into `buf`; returns the element count.
    ///
    /// # Errors
    ///
    /// See [`ByteStream::read`].
    pub fn read_elements(&mut self, buf: &mut [u8], elem_size: usize) -> Result<usize> {
        if elem_size == 0 {
            return Ok(0);
        }
        let bytes = self.read(buf)?;
        Ok(bytes / elem_size)
    }

    /// Append the next line (terminator included) to `line`; returns its length.
    ///
    /// Zero means end of data.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotOpen`], [`StreamError::WrongMode`] or [`StreamError::Io`].
    pub fn read_line(&mut self, line: &mut Vec<u8>) -> Result<usize> {
        let reader = self
            .backend
            .as_mut()
            .ok_or(StreamError::NotOpen)?
            .buf_reader("read_line")?;
        let n = reader.read_until(b'\n', line).map_err(StreamError::from_io)?;
        self.advance(n);
        Ok(n)
    }

    /// Append the next line to `line` unless it is longer than `max_len` bytes
    /// (terminator included).
    ///
    /// At most `max_len + 1` bytes are buffered; the rest of an oversized line
    /// is consumed without being stored, and `line` is left as it was.
    ///
    /// # Errors
    ///
    /// See [`ByteStream::read_line`].
    pub fn read_line_bounded(&mut self, line: &mut Vec<u8>, max_len: usize) -> Result<BoundedLine> {
        let reader = self
            .backend
            .as_mut()
            .ok_or(StreamError::NotOpen)?
            .buf_reader("read_line_bounded")?;

        let kept = line.len();
        let limit = u64::try_from(max_len).unwrap_or(u64::MAX).saturating_add(1);
        let n = Read::take(&mut *reader, limit)
            .read_until(b'\n', line)
            .map_err(StreamError::from_io)?;

        if n <= max_len {
            self.advance(n);
            return Ok(if n == 0 {
                BoundedLine::Eof
            } else {
                BoundedLine::Complete(n)
            });
        }

        let terminated = line.last() == Some(&b'\n');
        line.truncate(kept);
        let rest = if terminated {
            0
        } else {
            reader.skip_until(b'\n').map_err(StreamError::from_io)?
        };
        let skipped = n.saturating_add(rest);
        self.advance(skipped);
        Ok(BoundedLine::Skipped(skipped))
    }

    /// Write all of `buf`; returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotOpen`], [`StreamError::WrongMode`] or [`StreamError::Io`].
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self.backend.as_mut() {
            Some(Backend::Writer(writer)) => {
                writer.write_all(buf)?;
                self.position = self.position.saturating_add(buf.len() as u64);
                self.stats.bytes_written = self.stats.bytes_written.saturating_add(buf.len() as u64);
                Ok(buf.len())
            }
            Some(_) => Err(StreamError::WrongMode {
                operation: "write",
                mode: OpenMode::Read,
            }),
            None => Err(StreamError::NotOpen),
        }
    }

    /// Write whole elements of `elem_size` bytes; returns the element count.
    ///
    /// # Errors
    ///
    /// See [`ByteStream::write`].
    pub fn write_elements(&mut self, buf: &[u8], elem_size: usize) -> Result<usize> {
        if elem_size == 0 {
            return Ok(0);
        }
        let whole = buf.len() - buf.len() % elem_size;
        let bytes = self.write(buf.get(..whole).unwrap_or_default())?;
        Ok(bytes / elem_size)
    }

    /// Flush buffered writes
    ///
    /// # Errors
    ///
    /// [`StreamError::Io`] if the flush fails.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(Backend::Writer(writer)) = self.backend.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Reposition the stream; returns the new absolute position.
    ///
    /// Plain files accept any OS-valid target. Pipes accept only forward
    /// targets (absolute or relative), reached by reading and discarding.
    ///
    /// # Errors
    ///
    /// - [`StreamError::UnsupportedSeek`] for backward or end-relative pipe
    ///   seeks (position unchanged)
    /// - [`StreamError::TruncatedStream`] if the pipe ends before the target
    /// - [`StreamError::NotOpen`] or [`StreamError::Io`]
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.stats.seeks = self.stats.seeks.saturating_add(1);
        trace!(?pos, position = self.position, "Seek");

        let position = self.position;
        let target = match self.backend.as_mut().ok_or(StreamError::NotOpen)? {
            Backend::Reader(reader) => {
                self.position = reader.seek(pos)?;
                return Ok(self.position);
            }
            Backend::Writer(writer) => {
                self.position = writer.seek(pos)?;
                return Ok(self.position);
            }
            Backend::Pipe(_) => pipe_seek_target(position, pos)?,
        };

        self.discard_until(target)?;
        Ok(self.position)
    }

    fn discard_until(&mut self, target: u64) -> Result<()> {
        let chunk = self.config.effective_chunk_size();
        if self.scratch.len() < chunk {
            self.scratch.resize(chunk, 0);
        }

        let Some(Backend::Pipe(pipe)) = self.backend.as_mut() else {
            return Err(StreamError::NotOpen);
        };

        while self.position < target {
            let remaining = target - self.position;
            let want = usize::try_from(remaining).map_or(chunk, |r| r.min(chunk));
            let Some(scratch) = self.scratch.get_mut(..want) else {
                break;
            };
            let n = match pipe.read(scratch) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(StreamError::from_io(e)),
            };
            if n == 0 {
                return Err(StreamError::truncated(target, self.position));
            }
            self.position = self.position.saturating_add(n as u64);
            self.stats.bytes_discarded = self.stats.bytes_discarded.saturating_add(n as u64);
        }
        Ok(())
    }

    /// Return to offset 0.
    ///
    /// A pipe is restarted: the decompressor is stopped and invoked again on
    /// the stored archive path.
    ///
    /// # Errors
    ///
    /// [`StreamError::NotOpen`], [`StreamError::Spawn`] or [`StreamError::Io`].
    pub fn rewind_to_start(&mut self) -> Result<()> {
        if self.is_pipe() {
            return self.restart_pipe();
        }
        match self.backend.as_mut().ok_or(StreamError::NotOpen)? {
            Backend::Reader(reader) => {
                reader.seek(SeekFrom::Start(0))?;
            }
            Backend::Writer(writer) => {
                writer.seek(SeekFrom::Start(0))?;
            }
            Backend::Pipe(_) => {}
        }
        self.position = 0;
        Ok(())
    }

    fn restart_pipe(&mut self) -> Result<()> {
        let archive = self.archive.clone().ok_or(StreamError::NotOpen)?;
        if let Some(Backend::Pipe(old)) = self.backend.take() {
            old.shutdown();
        }
        self.position = 0;

        match PipeSource::spawn(&archive, &self.config.decompressor) {
            Ok(pipe) => self.backend = Some(Backend::Pipe(pipe)),
            Err(e) => {
                self.path = None;
                self.archive = None;
                return Err(e);
            }
        }
        self.stats.restarts = self.stats.restarts.saturating_add(1);
        debug!(archive = ?archive, "Decompressor restarted");
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        self.position = self.position.saturating_add(n as u64);
        self.stats.bytes_read = self.stats.bytes_read.saturating_add(n as u64);
    }
}

/// Absolute forward target of a pipe seek from `position`
fn pipe_seek_target(position: u64, pos: SeekFrom) -> Result<u64> {
    let target = match pos {
        SeekFrom::End(_) => {
            return Err(StreamError::unsupported_seek(position, "end-relative seek on a pipe"));
        }
        SeekFrom::Start(target) => Some(target),
        SeekFrom::Current(delta) => position.checked_add_signed(delta),
    };
    match target {
        Some(target) if target >= position => Ok(target),
        None if matches!(pos, SeekFrom::Current(delta) if delta > 0) => Err(
            StreamError::unsupported_seek(position, "seek target beyond the addressable range"),
        ),
        _ => Err(StreamError::unsupported_seek(position, "backward seek on a pipe")),
    }
}

impl Drop for ByteStream {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "Failed to close stream on drop");
        }
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("path", &self.path)
            .field("archive", &self.archive)
            .field("mode", &self.mode())
            .field("position", &self.position)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for ByteStream {
    fn default() -> Self {
        Self::new(StreamConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fixture(content: &[u8]) -> io::Result<(TempDir, PathBuf)> {
        let dir = TempDir::new()?;
        let path = dir.path().join("stream.bin");
        std::fs::write(&path, content)?;
        Ok((dir, path))
    }

    #[test]
    fn test_read_tracks_position() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture(b"0123456789")?;
        let mut stream = ByteStream::open_path(&path, OpenMode::Read, StreamConfig::default())?;
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf)?, 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(stream.tell(), Some(4));
        assert!(!stream.is_pipe());
        Ok(())
    }

    #[test]
    fn test_read_elements_counts_whole_elements() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let (_dir, path) = fixture(b"0123456789")?;
        let mut stream = ByteStream::open_path(&path, OpenMode::Read, StreamConfig::default())?;
        let mut buf = [0u8; 8];
        assert_eq!(stream.read_elements(&mut buf, 4)?, 2);
        let mut rest = [0u8; 8];
        assert_eq!(stream.read_elements(&mut rest, 4)?, 0);
        assert_eq!(stream.tell(), Some(10));
        Ok(())
    }

    #[test]
    fn test_plain_seek_end() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture(b"0123456789")?;
        let mut stream = ByteStream::open_path(&path, OpenMode::Read, StreamConfig::default())?;
        assert_eq!(stream.seek(SeekFrom::End(-3))?, 7);
        let mut buf = [0u8; 3];
        stream.read(&mut buf)?;
        assert_eq!(&buf, b"789");
        assert_eq!(stream.stats().seeks, 1);
        Ok(())
    }

    #[test]
    fn test_reopen_without_close_fails() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture(b"abc")?;
        let mut stream = ByteStream::open_path(&path, OpenMode::Read, StreamConfig::default())?;
        let result = stream.open(&path, OpenMode::Read);
        assert!(matches!(result, Err(StreamError::AlreadyOpen { .. })));

        stream.close()?;
        stream.open(&path, OpenMode::Read)?;
        assert!(stream.is_open());
        Ok(())
    }

    #[test]
    fn test_closed_stream_reports_not_open() {
        let mut stream = ByteStream::default();
        assert_eq!(stream.tell(), None);
        let mut buf = [0u8; 1];
        assert!(matches!(stream.read(&mut buf), Err(StreamError::NotOpen)));
        assert!(matches!(
            stream.seek(SeekFrom::Start(0)),
            Err(StreamError::NotOpen)
        ));
    }

    #[test]
    fn test_write_mode_never_compressed() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("out.log");
        let mut stream = ByteStream::open_path(&path, OpenMode::Write, StreamConfig::default())?;
        assert_eq!(stream.write_elements(b"abcdefg", 2)?, 3);
        assert_eq!(stream.tell(), Some(6));
        let mut buf = [0u8; 1];
        assert!(matches!(
            stream.read(&mut buf),
            Err(StreamError::WrongMode { .. })
        ));
        stream.close()?;
        assert_eq!(std::fs::read(&path)?, b"abcdef");
        Ok(())
    }

    #[test]
    fn test_read_line_bounded_skips_long_lines() -> std::result::Result<(), Box<dyn std::error::Error>>
    {
        let long = "x".repeat(10_000);
        let (_dir, path) = fixture(format!("ok\n{long}\n12345678\n123456789\ntail{long}").as_bytes())?;
        let mut stream = ByteStream::open_path(&path, OpenMode::Read, StreamConfig::default())?;
        let mut line = Vec::new();

        assert_eq!(stream.read_line_bounded(&mut line, 9)?, BoundedLine::Complete(3));
        assert_eq!(line, b"ok\n");

        line.clear();
        assert_eq!(stream.read_line_bounded(&mut line, 9)?, BoundedLine::Skipped(10_001));
        assert!(line.is_empty());
        assert!(line.capacity() < 1024);
        assert_eq!(stream.tell(), Some(10_004));

        // Exactly at the limit, terminator included
        assert_eq!(stream.read_line_bounded(&mut line, 9)?, BoundedLine::Complete(9));
        line.clear();
        // One byte over, ending in the terminator: nothing left to drain
        assert_eq!(stream.read_line_bounded(&mut line, 9)?, BoundedLine::Skipped(10));

        assert_eq!(stream.read_line_bounded(&mut line, 9)?, BoundedLine::Skipped(10_004));
        assert_eq!(stream.read_line_bounded(&mut line, 9)?, BoundedLine::Eof);
        Ok(())
    }

    #[test]
    fn test_pipe_seek_target_reasons() {
        assert_eq!(pipe_seek_target(10, SeekFrom::Start(10)).ok(), Some(10));
        assert_eq!(pipe_seek_target(10, SeekFrom::Current(5)).ok(), Some(15));

        let reason = |result: Result<u64>| match result {
            Err(StreamError::UnsupportedSeek { reason, .. }) => reason,
            other => panic!("expected UnsupportedSeek, got {other:?}"),
        };
        assert_eq!(reason(pipe_seek_target(10, SeekFrom::Start(9))), "backward seek on a pipe");
        assert_eq!(reason(pipe_seek_target(10, SeekFrom::Current(-11))), "backward seek on a pipe");
        assert_eq!(reason(pipe_seek_target(10, SeekFrom::End(0))), "end-relative seek on a pipe");
        assert_eq!(
            reason(pipe_seek_target(u64::MAX - 1, SeekFrom::Current(2))),
            "seek target beyond the addressable range"
        );
    }

    #[test]
    fn test_rewind_to_start_plain() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_dir, path) = fixture(b"first\nsecond\n")?;
        let mut stream = ByteStream::open_path(&path, OpenMode::Read, StreamConfig::default())?;
        let mut line = Vec::new();
        stream.read_line(&mut line)?;
        stream.rewind_to_start()?;
        assert_eq!(stream.tell(), Some(0));
        line.clear();
        stream.read_line(&mut line)?;
        assert_eq!(line, b"first\n");
        Ok(())
    }
}
