//! Error types for byte stream operations

use core::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::stream::OpenMode;

/// Errors that can occur while opening, reading, writing or seeking a stream
#[derive(Error, Debug)]
pub enum StreamError {
    /// Neither the plain file nor its compressed sibling could be opened
    #[error("No plain or compressed form found for {path}")]
    NotFound {
        /// The logical path that was requested
        path: PathBuf,
    },

    /// The stream is already bound to a file or pipe
    #[error("Stream already open on {path}, close it before reopening")]
    AlreadyOpen {
        /// Path the stream is currently bound to
        path: PathBuf,
    },

    /// Operation requires an open stream
    #[error("Stream is not open")]
    NotOpen,

    /// Operation is not available in the stream's open mode
    #[error("Operation '{operation}' not allowed in {mode} mode")]
    WrongMode {
        /// The attempted operation
        operation: &'static str,
        /// The mode the stream was opened with
        mode: OpenMode,
    },

    /// Backward or end-relative seek on a forward-only source
    #[error("Unsupported seek on forward-only stream at {position}: {reason}")]
    UnsupportedSeek {
        /// Tracked position when the seek was refused
        position: u64,
        /// Why the seek was refused
        reason: &'static str,
    },

    /// End of data reached before a seek target or a full read
    #[error("Stream ended at {reached} before reaching {expected}")]
    TruncatedStream {
        /// Offset that was required
        expected: u64,
        /// Offset actually reached
        reached: u64,
    },

    /// An external decompressor, decoder or encoder could not be started
    #[error("Failed to start '{program}' for {archive}: {source}")]
    Spawn {
        /// Program that was invoked
        program: String,
        /// Archive or video file the process was started for
        archive: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// An external decompressor, decoder or encoder exited unsuccessfully
    #[error("Process '{program}' failed: {status}")]
    ProcessFailed {
        /// Program that was invoked
        program: String,
        /// Exit status as reported by the OS
        status: String,
    },

    /// A video frame does not match the stream geometry
    #[error("Video frame has {actual} bytes, expected {expected}")]
    FrameSize {
        /// Bytes per frame for the configured geometry
        expected: usize,
        /// Bytes supplied or read
        actual: usize,
    },

    /// Video geometry could not be determined
    #[error("Cannot determine video geometry of {path}: {reason}")]
    Geometry {
        /// Video whose geometry was requested
        path: PathBuf,
        /// What was missing or wrong
        reason: String,
    },

    /// I/O error from the underlying file or pipe
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Create a not found error
    pub fn not_found(path: impl Into<PathBuf>) -> Self {
        Self::NotFound { path: path.into() }
    }

    /// Create an unsupported seek error
    pub fn unsupported_seek(position: u64, reason: &'static str) -> Self {
        Self::UnsupportedSeek { position, reason }
    }

    /// Create a truncated stream error
    pub fn truncated(expected: u64, reached: u64) -> Self {
        Self::TruncatedStream { expected, reached }
    }

    /// Create a process failure error
    pub fn process_failed(program: impl Into<String>, status: impl fmt::Display) -> Self {
        Self::ProcessFailed {
            program: program.into(),
            status: status.to_string(),
        }
    }

    /// Recover a stream error carried through an `io::Error`.
    ///
    /// Sources behind `Read`/`BufRead` can only report `io::Error`; errors
    /// they wrap with [`std::io::Error::other`] come back out unchanged.
    pub fn from_io(error: std::io::Error) -> Self {
        match error.downcast::<StreamError>() {
            Ok(inner) => inner,
            Err(error) => Self::Io(error),
        }
    }

    /// Get the error category for classification.
    pub fn category(&self) -> StreamErrorCategory {
        match self {
            Self::NotFound { .. } | Self::Spawn { .. } => StreamErrorCategory::Open,
            Self::AlreadyOpen { .. }
            | Self::NotOpen
            | Self::WrongMode { .. }
            | Self::FrameSize { .. } => StreamErrorCategory::State,
            Self::UnsupportedSeek { .. } | Self::TruncatedStream { .. } => {
                StreamErrorCategory::Position
            }
            Self::ProcessFailed { .. } | Self::Geometry { .. } => StreamErrorCategory::Process,
            Self::Io(_) => StreamErrorCategory::Io,
        }
    }

    /// Check if the stream can still be used after this error.
    ///
    /// A refused seek leaves the position untouched, and state errors do not
    /// touch the stream at all. Truncation and raw I/O errors leave the
    /// position wherever the source stopped.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::UnsupportedSeek { .. }
            | Self::AlreadyOpen { .. }
            | Self::NotOpen
            | Self::WrongMode { .. }
            | Self::FrameSize { .. } => true,
            Self::NotFound { .. }
            | Self::Spawn { .. }
            | Self::ProcessFailed { .. }
            | Self::Geometry { .. }
            | Self::TruncatedStream { .. }
            | Self::Io(_) => false,
        }
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamErrorCategory {
    /// Opening the file or starting the decompressor failed
    Open,
    /// The stream or the request did not fit the operation
    State,
    /// Seek or read position could not be honoured
    Position,
    /// An external process failed or reported unusable output
    Process,
    /// Raw I/O failure
    Io,
}

impl fmt::Display for StreamErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamErrorCategory::Open => write!(f, "Open"),
            StreamErrorCategory::State => write!(f, "State"),
            StreamErrorCategory::Position => write!(f, "Position"),
            StreamErrorCategory::Process => write!(f, "Process"),
            StreamErrorCategory::Io => write!(f, "IO"),
        }
    }
}
