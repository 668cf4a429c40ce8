//! Error types for timestamp and frame replay

use core::fmt;
use sensorlog_stream::StreamError;
use std::path::PathBuf;
use thiserror::Error;

/// Longest payload excerpt kept in a [`ReplayError::MalformedRecord`]
const RECORD_EXCERPT_LEN: usize = 80;

/// Errors that can occur while replaying a log or its companion frame file
#[derive(Error, Debug)]
pub enum ReplayError {
    /// The log or raw file stream failed
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// A record lacks a field required by the reader
    #[error("Malformed record '{record}': {reason}")]
    MalformedRecord {
        /// Excerpt of the offending payload
        record: String,
        /// What was missing or invalid
        reason: &'static str,
    },

    /// The raw file ended inside a frame
    #[error("Frame {index} truncated: expected {expected} bytes, read {read}")]
    TruncatedStream {
        /// Requested frame index
        index: i64,
        /// Bytes the record spans
        expected: usize,
        /// Bytes actually read
        read: usize,
    },

    /// The frame index lies before the first frame of the raw file
    #[error("Frame index {index} precedes starting frame {starting}")]
    InvalidFrameIndex {
        /// Requested frame index
        index: i64,
        /// Index of the first frame in the raw file
        starting: i64,
    },

    /// Reader configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The log holds no timestamped record
    #[error("No timestamped record found in {path}")]
    EndOfLog {
        /// Log path
        path: PathBuf,
    },

    /// Configuration text could not be parsed
    #[error("Configuration parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl ReplayError {
    /// Create a malformed record error from raw payload bytes
    pub fn malformed(payload: &[u8], reason: &'static str) -> Self {
        let excerpt = payload.get(..RECORD_EXCERPT_LEN).unwrap_or(payload);
        Self::MalformedRecord {
            record: String::from_utf8_lossy(excerpt).trim_end().to_string(),
            reason,
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// Get the error category for classification.
    pub fn category(&self) -> ReplayErrorCategory {
        match self {
            Self::Stream(_) | Self::TruncatedStream { .. } => ReplayErrorCategory::Stream,
            Self::MalformedRecord { .. } | Self::InvalidFrameIndex { .. } => {
                ReplayErrorCategory::Record
            }
            Self::InvalidConfig(_) | Self::Config(_) => ReplayErrorCategory::Config,
            Self::EndOfLog { .. } => ReplayErrorCategory::EndOfLog,
        }
    }

    /// Check if the reader can keep serving requests after this error.
    ///
    /// Record-level problems only affect the request that hit them.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::MalformedRecord { .. }
            | Self::InvalidFrameIndex { .. }
            | Self::TruncatedStream { .. }
            | Self::EndOfLog { .. } => true,
            Self::Stream(e) => e.is_recoverable(),
            Self::InvalidConfig(_) | Self::Config(_) => false,
        }
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplayErrorCategory {
    /// Byte stream or raw file failure
    Stream,
    /// Record content problem
    Record,
    /// Configuration problem
    Config,
    /// No data to replay
    EndOfLog,
}

impl fmt::Display for ReplayErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayErrorCategory::Stream => write!(f, "Stream"),
            ReplayErrorCategory::Record => write!(f, "Record"),
            ReplayErrorCategory::Config => write!(f, "Config"),
            ReplayErrorCategory::EndOfLog => write!(f, "EndOfLog"),
        }
    }
}
