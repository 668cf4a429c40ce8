//! Payload access for the record valid at a timestamp

use std::path::Path;

use crate::config::LogConfig;
use crate::log::TimestampLog;
use crate::source::TimestampSource;
use crate::timestamp::Timestamp;

/// One record handed to a processing callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    /// Timestamp the caller asked for
    pub requested: Timestamp,
    /// Timestamp of the record that matched
    pub timestamp: Timestamp,
    /// Line bytes after the timestamp, without the line terminator
    pub payload: &'a [u8],
}

impl<'a> Record<'a> {
    /// Payload as UTF-8, if it is valid
    pub fn payload_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.payload).ok()
    }

    /// Whitespace-separated payload tokens
    pub fn fields(&self) -> impl Iterator<Item = &'a [u8]> + use<'a> {
        self.payload
            .split(u8::is_ascii_whitespace)
            .filter(|field| !field.is_empty())
    }

    /// Milliseconds between the matched record and the request
    pub fn lag_millis(&self) -> i64 {
        self.requested.diff_millis(&self.timestamp)
    }
}

/// Exposes the payload of the record valid at a requested timestamp
#[derive(Debug)]
pub struct TimestampRecordView {
    log: TimestampLog,
}

impl TimestampRecordView {
    /// View over the log at `path`, opened lazily
    pub fn new(path: impl AsRef<Path>, config: LogConfig) -> Self {
        Self::from_log(TimestampLog::new(path, config))
    }

    /// View over an existing log reader
    pub fn from_log(log: TimestampLog) -> Self {
        Self { log }
    }

    /// Underlying log reader
    pub fn log(&self) -> &TimestampLog {
        &self.log
    }

    /// Underlying log reader, mutably
    pub fn log_mut(&mut self) -> &mut TimestampLog {
        &mut self.log
    }

    /// Release the view and return its log
    pub fn into_log(self) -> TimestampLog {
        self.log
    }

    /// Payload of the record valid at `target`, or `None` if no record
    /// matches within `tolerance_ms`
    pub fn data_for_timestamp(&mut self, target: Timestamp, tolerance_ms: i64) -> Option<&[u8]> {
        if !self.log.search_for_timestamp(target, tolerance_ms) {
            return None;
        }
        self.log.payload()
    }

    /// Payload of the record under the cursor, re-validated with a search.
    ///
    /// `None` when no record has been loaded yet.
    pub fn data_for_current(&mut self, tolerance_ms: i64) -> Option<&[u8]> {
        let current = self.log.current()?;
        self.data_for_timestamp(current, tolerance_ms)
    }

    /// Current record as seen from a request at `requested`
    pub fn record(&self, requested: Timestamp) -> Option<Record<'_>> {
        Some(Record {
            requested,
            timestamp: self.log.current()?,
            payload: self.log.payload()?,
        })
    }

    /// Find the record valid at `target` and pass it to `handler`.
    ///
    /// Returns the handler's result, or `None` when nothing matched.
    pub fn process<F, R>(&mut self, target: Timestamp, tolerance_ms: i64, handler: F) -> Option<R>
    where
        F: FnOnce(Record<'_>) -> R,
    {
        if !self.log.search_for_timestamp(target, tolerance_ms) {
            return None;
        }
        self.record(target).map(handler)
    }

    /// Pass the record under the cursor to `handler`, using the default tolerance
    pub fn process_current<F, R>(&mut self, handler: F) -> Option<R>
    where
        F: FnOnce(Record<'_>) -> R,
    {
        let current = self.log.current()?;
        let tolerance_ms = self.log.default_tolerance_ms();
        self.process(current, tolerance_ms, handler)
    }
}
