//! I/O counters for a byte stream

use std::fmt;

/// Counters accumulated by a [`ByteStream`](crate::ByteStream) over its lifetime.
///
/// Counters survive `close`/`open` cycles so callers can observe access
/// patterns across reinitialisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Bytes delivered to callers by `read`/`read_line`
    pub bytes_read: u64,
    /// Bytes accepted by `write`
    pub bytes_written: u64,
    /// Calls to `seek`, successful or not
    pub seeks: u64,
    /// Bytes read and dropped to emulate forward seeks on a pipe
    pub bytes_discarded: u64,
    /// Decompressor restarts caused by `rewind_to_start`
    pub restarts: u64,
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read={} written={} seeks={} discarded={} restarts={}",
            self.bytes_read, self.bytes_written, self.seeks, self.bytes_discarded, self.restarts
        )
    }
}
