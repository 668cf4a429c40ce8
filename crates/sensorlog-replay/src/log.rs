//! Sequential reader over timestamp-prefixed log lines
//!
//! [`TimestampLog`] owns the byte stream of one log file, the bytes of the
//! record under the cursor and the single rewind bookmark. Lines that do
//! not start with a timestamp are skipped.

use sensorlog_stream::{BoundedLine, ByteStream, OpenMode, StreamError, StreamStats};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::config::LogConfig;
use crate::error::ReplayError;
use crate::source::TimestampSource;
use crate::timestamp::{Timestamp, parse_prefix};
use crate::Result;

/// Timestamped log reader with one step of rewind.
///
/// The file is opened lazily by the first [`TimestampSource::advance`], or
/// eagerly by [`TimestampLog::reinit`]. A log that cannot be opened answers
/// every search with "not found"; the open error is kept for
/// [`TimestampLog::take_error`].
pub struct TimestampLog {
    path: PathBuf,
    config: LogConfig,
    stream: ByteStream,
    line: Vec<u8>,
    pending: Vec<u8>,
    payload_start: usize,
    current: Option<Timestamp>,
    previous: Option<Timestamp>,
    current_line_start: Option<u64>,
    previous_line_start: Option<u64>,
    exhausted: bool,
    open_failed: bool,
    last_error: Option<ReplayError>,
}

impl TimestampLog {
    /// Bind a reader to `path` without opening it
    pub fn new(path: impl AsRef<Path>, config: LogConfig) -> Self {
        let stream = ByteStream::new(config.stream.clone());
        Self {
            path: path.as_ref().to_path_buf(),
            config,
            stream,
            line: Vec::new(),
            pending: Vec::new(),
            payload_start: 0,
            current: None,
            previous: None,
            current_line_start: None,
            previous_line_start: None,
            exhausted: false,
            open_failed: false,
            last_error: None,
        }
    }

    /// Bind a reader to `path` and open it immediately
    ///
    /// # Errors
    ///
    /// See [`TimestampLog::reinit`].
    pub fn open(path: impl AsRef<Path>, config: LogConfig) -> Result<Self> {
        config.validate()?;
        let mut log = Self::new(path, config);
        log.reinit()?;
        Ok(log)
    }

    /// Close and reopen the log at its beginning, discarding all traversal state.
    ///
    /// # Errors
    ///
    /// Returns the stream error when neither the log nor its compressed
    /// sibling can be opened. The log then reports "not found" until the
    /// next successful `reinit`.
    pub fn reinit(&mut self) -> Result<()> {
        self.close();
        self.open_failed = false;
        self.last_error = None;
        self.open_stream()
    }

    /// Release the stream and forget the current record
    pub fn close(&mut self) {
        if let Err(e) = self.stream.close() {
            warn!(path = ?self.path, error = %e, "Failed to close log");
        }
        self.reset_cursor();
    }

    fn reset_cursor(&mut self) {
        self.line.clear();
        self.payload_start = 0;
        self.current = None;
        self.previous = None;
        self.current_line_start = None;
        self.previous_line_start = None;
        self.exhausted = false;
    }

    fn open_stream(&mut self) -> Result<()> {
        match self.stream.open(&self.path, OpenMode::Read) {
            Ok(()) => {
                debug!(path = ?self.path, pipe = self.stream.is_pipe(), "Log opened");
                Ok(())
            }
            Err(e) => {
                self.open_failed = true;
                Err(e.into())
            }
        }
    }

    fn ensure_open(&mut self) -> bool {
        if self.stream.is_open() {
            return true;
        }
        if self.open_failed {
            return false;
        }
        match self.open_stream() {
            Ok(()) => true,
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Log unavailable");
                self.last_error = Some(e);
                false
            }
        }
    }

    /// Read forward to the next timestamped line. Returns whether one was found.
    fn read_next_record(&mut self) -> bool {
        if !self.ensure_open() {
            return false;
        }

        loop {
            let Some(line_start) = self.stream.tell() else {
                return false;
            };
            self.pending.clear();
            match self.stream.read_line_bounded(&mut self.pending, self.config.line_capacity) {
                Ok(BoundedLine::Eof) => {
                    self.exhausted = true;
                    return false;
                }
                Ok(BoundedLine::Complete(_)) => {}
                Ok(BoundedLine::Skipped(len)) => {
                    trace!(offset = line_start, len, "Skipping oversized line");
                    continue;
                }
                Err(e) => {
                    warn!(path = ?self.path, offset = line_start, error = %e, "Log read failed");
                    self.last_error = Some(e.into());
                    self.exhausted = true;
                    return false;
                }
            }

            let Some((timestamp, payload_start)) = parse_prefix(&self.pending) else {
                trace!(offset = line_start, "Skipping line without timestamp");
                continue;
            };

            std::mem::swap(&mut self.line, &mut self.pending);
            self.payload_start = payload_start;
            self.previous = self.current.replace(timestamp);
            self.previous_line_start = self.current_line_start.replace(line_start);
            self.exhausted = false;
            return true;
        }
    }

    /// Reposition the stream, restarting a pipe when the target lies behind it
    fn seek_to(&mut self, offset: u64) -> Result<()> {
        match self.stream.seek(SeekFrom::Start(offset)) {
            Ok(_) => Ok(()),
            Err(StreamError::UnsupportedSeek { position, .. }) if self.stream.is_pipe() => {
                debug!(path = ?self.path, from = position, to = offset, "Restarting decompressor to rewind");
                self.stream.rewind_to_start()?;
                self.stream.seek(SeekFrom::Start(offset))?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Scan the whole log for its first and last timestamps.
    ///
    /// The log is reinitialised before and after the scan.
    ///
    /// # Errors
    ///
    /// See [`TimestampLog::reinit`].
    pub fn first_and_last(&mut self) -> Result<Option<(Timestamp, Timestamp)>> {
        self.reinit()?;
        let mut bounds: Option<(Timestamp, Timestamp)> = None;
        while self.read_next_record() {
            if let Some(ts) = self.current {
                bounds = Some(bounds.map_or((ts, ts), |(first, _)| (first, ts)));
            }
        }
        if let Some(e) = self.last_error.take() {
            return Err(e);
        }
        self.reinit()?;
        Ok(bounds)
    }

    /// Whole line of the current record, without its terminator
    pub fn current_line(&self) -> Option<&[u8]> {
        self.current?;
        Some(trim_line_end(&self.line))
    }

    /// Payload of the current record: the line after the timestamp and its blanks
    pub fn payload(&self) -> Option<&[u8]> {
        self.current?;
        let payload = self.line.get(self.payload_start..).unwrap_or_default();
        Some(trim_line_end(payload))
    }

    /// Stream offset at which the current record's line starts
    pub fn current_offset(&self) -> Option<u64> {
        self.current_line_start
    }

    /// Whether a rewind bookmark is held
    pub fn can_rewind(&self) -> bool {
        self.previous_line_start.is_some()
    }

    /// Whether the underlying stream is open
    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    /// Whether the log is read through a decompression pipe
    pub fn is_pipe(&self) -> bool {
        self.stream.is_pipe()
    }

    /// Log path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reader configuration
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// I/O counters of the log stream
    pub fn stream_stats(&self) -> StreamStats {
        self.stream.stats()
    }

    /// Take the last error swallowed by a `bool`-returning operation
    pub fn take_error(&mut self) -> Option<ReplayError> {
        self.last_error.take()
    }
}

impl TimestampSource for TimestampLog {
    fn advance(&mut self) -> bool {
        self.read_next_record();
        self.current.is_some()
    }

    fn current(&self) -> Option<Timestamp> {
        self.current
    }

    fn previous(&self) -> Option<Timestamp> {
        self.previous
    }

    fn rewind_one_step(&mut self) -> bool {
        let Some(offset) = self.previous_line_start.take() else {
            return false;
        };
        self.current_line_start = None;
        self.current = None;
        self.previous = None;
        self.exhausted = false;

        match self.seek_to(offset) {
            Ok(()) => {
                trace!(path = ?self.path, offset, "Rewound one record");
                true
            }
            Err(e) => {
                warn!(path = ?self.path, offset, error = %e, "Rewind failed");
                self.last_error = Some(e);
                false
            }
        }
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn end_of_log_staleness_ms(&self) -> i64 {
        self.config.end_of_log_staleness_ms
    }

    fn default_tolerance_ms(&self) -> i64 {
        self.config.default_tolerance_ms
    }
}

impl std::fmt::Debug for TimestampLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimestampLog")
            .field("path", &self.path)
            .field("current", &self.current)
            .field("previous", &self.previous)
            .field("current_line_start", &self.current_line_start)
            .field("previous_line_start", &self.previous_line_start)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

fn trim_line_end(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    bytes.strip_suffix(b"\r").unwrap_or(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log_with(content: &str) -> std::io::Result<(TempDir, TimestampLog)> {
        let dir = TempDir::new()?;
        let path = dir.path().join("sensor.log");
        std::fs::write(&path, content)?;
        Ok((dir, TimestampLog::new(path, LogConfig::default())))
    }

    #[test]
    fn test_advance_skips_malformed_lines() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut log) = log_with("header\n1.000 a\n\nbroken.x y\n1.050\tb c\r\n")?;
        assert!(log.advance());
        assert_eq!(log.current(), Some(Timestamp::new(1, 0)));
        assert_eq!(log.payload(), Some(&b"a"[..]));
        assert_eq!(log.current_offset(), Some(7));

        assert!(log.advance());
        assert_eq!(log.current(), Some(Timestamp::new(1, 50)));
        assert_eq!(log.previous(), Some(Timestamp::new(1, 0)));
        assert_eq!(log.payload(), Some(&b"b c"[..]));
        assert_eq!(log.current_line(), Some(&b"1.050\tb c"[..]));
        Ok(())
    }

    #[test]
    fn test_end_of_log_keeps_current() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut log) = log_with("2.000 last\n")?;
        assert!(log.advance());
        assert!(log.advance());
        assert!(log.is_exhausted());
        assert_eq!(log.current(), Some(Timestamp::new(2, 0)));
        assert_eq!(log.payload(), Some(&b"last"[..]));
        assert!(log.is_open());
        Ok(())
    }

    #[test]
    fn test_rewind_is_one_shot() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut log) = log_with("1.000 a\n2.000 b\n3.000 c\n")?;
        assert!(!log.rewind_one_step());
        log.advance();
        assert!(!log.rewind_one_step());
        log.advance();
        log.advance();
        assert!(log.can_rewind());
        assert!(log.rewind_one_step());
        assert_eq!(log.current(), None);
        assert_eq!(log.previous(), None);
        assert!(!log.rewind_one_step());

        assert!(log.advance());
        assert_eq!(log.current(), Some(Timestamp::new(2, 0)));
        Ok(())
    }

    #[test]
    #[tracing_test::traced_test]
    fn test_missing_log_reports_not_found() {
        let mut log = TimestampLog::new("/nonexistent/sensorlog/cam.log", LogConfig::default());
        assert!(!log.advance());
        assert!(!log.search(Timestamp::new(1, 0)));
        assert!(matches!(log.take_error(), Some(ReplayError::Stream(_))));
        assert!(log.reinit().is_err());
        assert!(logs_contain("Log unavailable"));
    }

    #[test]
    fn test_oversized_lines_are_skipped() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("wide.log");
        std::fs::write(&path, format!("1.000 {}\n2.000 ok\n", "x".repeat(64)))?;
        let config = LogConfig {
            line_capacity: 32,
            ..LogConfig::default()
        };
        let mut log = TimestampLog::new(path, config);
        assert!(log.advance());
        assert_eq!(log.current(), Some(Timestamp::new(2, 0)));
        Ok(())
    }

    #[test]
    fn test_unterminated_oversized_tail_is_not_buffered() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let dir = TempDir::new()?;
        let path = dir.path().join("runaway.log");
        std::fs::write(&path, format!("1.000 a\n2.000 {}", "y".repeat(100_000)))?;
        let config = LogConfig {
            line_capacity: 64,
            ..LogConfig::default()
        };
        let mut log = TimestampLog::new(path, config);
        assert!(log.advance());
        assert!(log.advance());
        assert!(log.is_exhausted());
        assert_eq!(log.current(), Some(Timestamp::new(1, 0)));
        assert!(log.pending.capacity() <= 1024);
        assert_eq!(log.stream_stats().bytes_read, 100_014);
        assert!(log.take_error().is_none());
        Ok(())
    }

    #[test]
    fn test_first_and_last() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let (_dir, mut log) = log_with("# cam0\n0.000 0\n0.500 1\n0.990 2\n")?;
        let bounds = log.first_and_last()?;
        assert_eq!(bounds, Some((Timestamp::new(0, 0), Timestamp::new(0, 990))));
        assert_eq!(log.current(), None);
        assert!(log.advance());
        assert_eq!(log.current(), Some(Timestamp::new(0, 0)));
        Ok(())
    }
}
