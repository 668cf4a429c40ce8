//! Convenience re-exports for common types

pub use crate::config::{DEFAULT_TOLERANCE_MS, FrameLayout, FrameMode, LogConfig};
pub use crate::constant_rate::ConstantRateGenerator;
pub use crate::error::{ReplayError, ReplayErrorCategory};
pub use crate::frames::{Frame, FrameIndexedReader};
pub use crate::log::TimestampLog;
pub use crate::source::TimestampSource;
pub use crate::timestamp::Timestamp;
pub use crate::view::{Record, TimestampRecordView};
pub use sensorlog_stream::{Decompressor, StreamConfig, StreamStats};
