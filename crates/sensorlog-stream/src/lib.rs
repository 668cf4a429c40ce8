//! Uniform byte streams over plain files and decompression pipes
//!
//! This crate provides the byte-level layer of sensorlog:
//! - One read/write/seek/tell contract for regular files and compressed siblings
//! - Automatic fallback between `<path>` and `<path>.<ext>`
//! - Forward seeks on pipes emulated by read-and-discard
//! - Pipe "rewind" by restarting the decompressor
//! - Raw video frames read from and written to an external ffmpeg
//!
//! # Architecture
//!
//! - [`stream`]: [`ByteStream`], the open/read/seek/close state machine
//! - [`pipe`]: [`PipeSource`], forward-only decompressed bytes (external command or gzip)
//! - [`video`]: [`VideoReader`] and [`VideoWriter`], `bgr24` frames through ffmpeg
//! - [`config`]: [`StreamConfig`], [`VideoConfig`] and the process-wide compressed-first flag
//! - [`stats`]: [`StreamStats`] I/O counters
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use sensorlog_stream::prelude::*;
//! use std::io::SeekFrom;
//!
//! # fn example() -> sensorlog_stream::Result<()> {
//! // Reads `depth.raw`, or decompresses `depth.raw.7z` if the plain file is missing
//! let mut stream = ByteStream::open_path("depth.raw", OpenMode::Read, StreamConfig::default())?;
//! stream.seek(SeekFrom::Start(4096))?;
//! let mut frame = vec![0u8; 4096];
//! let n = stream.read(&mut frame)?;
//! assert_eq!(stream.tell(), Some(4096 + n as u64));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod pipe;
pub mod prelude;
pub mod stats;
pub mod stream;
pub mod video;

pub use config::{Decompressor, StreamConfig, VideoConfig, prefer_compressed, set_prefer_compressed};
pub use error::{StreamError, StreamErrorCategory};
pub use pipe::PipeSource;
pub use stats::StreamStats;
pub use stream::{BoundedLine, ByteStream, OpenMode};
pub use video::{VideoGeometry, VideoReader, VideoWriter, query_geometry};

/// Result type for stream operations
pub type Result<T> = std::result::Result<T, StreamError>;
