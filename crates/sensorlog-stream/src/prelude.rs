//! Convenience re-exports for common types

pub use crate::config::{Decompressor, StreamConfig, VideoConfig};
pub use crate::error::{StreamError, StreamErrorCategory};
pub use crate::stats::StreamStats;
pub use crate::stream::{BoundedLine, ByteStream, OpenMode};
pub use crate::video::{VideoGeometry, VideoReader, VideoWriter};
