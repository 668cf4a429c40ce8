//! Replay configuration

use sensorlog_stream::{StreamConfig, StreamError};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ReplayError;

/// Default tolerance window for timestamp searches, in milliseconds
pub const DEFAULT_TOLERANCE_MS: i64 = 33;

/// Default grace period for the last record of a log, in milliseconds
pub const END_OF_LOG_STALENESS_MS: i64 = 100;

/// Default longest accepted log line (10 MiB)
pub const DEFAULT_LINE_CAPACITY: usize = 10 * 1024 * 1024;

/// Configuration of a timestamped log reader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Byte stream settings for the log (and its companion raw file)
    pub stream: StreamConfig,
    /// Longest accepted line in bytes; longer lines are skipped like malformed ones
    pub line_capacity: usize,
    /// Tolerance used by searches that do not pass one explicitly
    pub default_tolerance_ms: i64,
    /// How far a request may lie past the last record and still match it.
    ///
    /// Independent of the per-search tolerance.
    pub end_of_log_staleness_ms: i64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            stream: StreamConfig::default(),
            line_capacity: DEFAULT_LINE_CAPACITY,
            default_tolerance_ms: DEFAULT_TOLERANCE_MS,
            end_of_log_staleness_ms: END_OF_LOG_STALENESS_MS,
        }
    }
}

impl LogConfig {
    /// Replace the stream configuration
    pub fn with_stream(mut self, stream: StreamConfig) -> Self {
        self.stream = stream;
        self
    }

    /// Replace the default search tolerance
    pub fn with_default_tolerance_ms(mut self, tolerance_ms: i64) -> Self {
        self.default_tolerance_ms = tolerance_ms;
        self
    }

    /// Replace the end-of-log staleness bound
    pub fn with_end_of_log_staleness_ms(mut self, staleness_ms: i64) -> Self {
        self.end_of_log_staleness_ms = staleness_ms;
        self
    }

    /// Check that the configuration can drive a reader
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] for a zero line capacity or
    /// negative windows.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.line_capacity == 0 {
            return Err(ReplayError::invalid_config("line_capacity must be positive"));
        }
        if self.default_tolerance_ms < 0 {
            return Err(ReplayError::invalid_config(
                "default_tolerance_ms must not be negative",
            ));
        }
        if self.end_of_log_staleness_ms < 0 {
            return Err(ReplayError::invalid_config(
                "end_of_log_staleness_ms must not be negative",
            ));
        }
        Ok(())
    }

    /// Parse and validate a configuration from JSON text
    ///
    /// # Errors
    ///
    /// [`ReplayError::Config`] for invalid JSON, [`ReplayError::InvalidConfig`]
    /// for unusable values.
    pub fn from_json_str(json: &str) -> Result<Self, ReplayError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration from a JSON file
    ///
    /// # Errors
    ///
    /// [`ReplayError::Stream`] when the file cannot be read, otherwise as
    /// [`LogConfig::from_json_str`].
    pub fn from_json_file(path: &Path) -> Result<Self, ReplayError> {
        let text = std::fs::read_to_string(path).map_err(StreamError::from)?;
        Self::from_json_str(&text)
    }
}

/// How the companion raw file maps records to bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameMode {
    /// One frame of `frame_size` bytes per record
    #[default]
    Single,
    /// Payload `<index>, <count>`: `count` consecutive frames per record
    SubFrames,
}

/// Layout of the companion raw file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    /// Bytes per frame
    pub frame_size: usize,
    /// Record-to-frame mapping
    #[serde(default)]
    pub mode: FrameMode,
}

impl FrameLayout {
    /// One frame per record
    pub fn single(frame_size: usize) -> Self {
        Self {
            frame_size,
            mode: FrameMode::Single,
        }
    }

    /// Variable number of frames per record
    pub fn sub_frames(frame_size: usize) -> Self {
        Self {
            frame_size,
            mode: FrameMode::SubFrames,
        }
    }

    /// Check that frames have a size
    ///
    /// # Errors
    ///
    /// Returns [`ReplayError::InvalidConfig`] for a zero frame size.
    pub fn validate(&self) -> Result<(), ReplayError> {
        if self.frame_size == 0 {
            return Err(ReplayError::invalid_config("frame_size must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.default_tolerance_ms, 33);
        assert_eq!(config.end_of_log_staleness_ms, 100);
        assert_eq!(config.line_capacity, DEFAULT_LINE_CAPACITY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_overrides_nested_stream() -> Result<(), ReplayError> {
        let config = LogConfig::from_json_str(
            r#"{"end_of_log_staleness_ms": 250, "stream": {"archive_extension": "gz", "decompressor": {"kind": "gzip"}}}"#,
        )?;
        assert_eq!(config.end_of_log_staleness_ms, 250);
        assert_eq!(config.default_tolerance_ms, DEFAULT_TOLERANCE_MS);
        assert_eq!(config.stream, StreamConfig::gzip());
        Ok(())
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let result = LogConfig::from_json_str(r#"{"default_tolerance_ms": -1}"#);
        assert!(matches!(result, Err(ReplayError::InvalidConfig(_))));
    }

    #[test]
    fn test_frame_layout() {
        assert!(FrameLayout::single(4096).validate().is_ok());
        assert!(matches!(
            FrameLayout::sub_frames(0).validate(),
            Err(ReplayError::InvalidConfig(_))
        ));
    }
}
