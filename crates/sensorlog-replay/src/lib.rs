//! Timestamp-synchronized replay of recorded sensor logs
//!
//! Sensor logs are text files whose lines start with a
//! `<seconds>.<milliseconds>` timestamp, optionally paired with a raw file of
//! fixed-size frames. This crate answers "which record is valid at time T"
//! against such logs, whether they are read from disk or through a
//! decompression pipe.
//!
//! # Architecture
//!
//! - [`timestamp`]: [`Timestamp`] and the line prefix parser
//! - [`source`]: [`TimestampSource`], the cursor contract and the shared
//!   tolerance-window search
//! - [`log`]: [`TimestampLog`], the line reader with one step of rewind
//! - [`view`]: [`TimestampRecordView`], payload access and record callbacks
//! - [`frames`]: [`FrameIndexedReader`], frame loading from the companion raw file
//! - [`constant_rate`]: [`ConstantRateGenerator`], fixed-rate resampling
//! - [`config`]: [`LogConfig`] and [`FrameLayout`]
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```no_run
//! use sensorlog_replay::prelude::*;
//!
//! # fn example() -> sensorlog_replay::Result<()> {
//! let mut depth = FrameIndexedReader::open(
//!     "session/depth.timestamp",
//!     "session/depth.raw",
//!     FrameLayout::single(512 * 424 * 2),
//!     LogConfig::default(),
//! )?;
//!
//! let clock = ConstantRateGenerator::open("session/depth.timestamp", LogConfig::default(), 30.0)?;
//! for now in clock {
//!     if depth.load_frame(now, DEFAULT_TOLERANCE_MS)? {
//!         println!("{now}: {} bytes", depth.frame_bytes().len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod constant_rate;
pub mod error;
pub mod frames;
pub mod log;
pub mod prelude;
mod scan;
pub mod source;
pub mod timestamp;
pub mod view;

pub use config::{
    DEFAULT_LINE_CAPACITY, DEFAULT_TOLERANCE_MS, END_OF_LOG_STALENESS_MS, FrameLayout, FrameMode,
    LogConfig,
};
pub use constant_rate::ConstantRateGenerator;
pub use error::{ReplayError, ReplayErrorCategory};
pub use frames::{Frame, FrameBuffer, FrameIndexedReader, parse_frame_index, parse_sub_frame_count};
pub use log::TimestampLog;
pub use source::TimestampSource;
pub use timestamp::{Timestamp, parse_prefix};
pub use view::{Record, TimestampRecordView};

/// Result type for replay operations
pub type Result<T> = std::result::Result<T, ReplayError>;
