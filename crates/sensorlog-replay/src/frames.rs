//! Frame-indexed access to a companion raw file
//!
//! Each record payload starts with a frame index (and, in sub-frame mode, a
//! sub-frame count) pointing into a flat file of fixed-size frames. Frames
//! are addressed by `(index - starting_index) * frame_size`; loading frames
//! in order reads straight through without seeking.

use sensorlog_stream::{ByteStream, OpenMode, StreamStats};
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::config::{FrameLayout, FrameMode, LogConfig};
use crate::error::ReplayError;
use crate::log::TimestampLog;
use crate::scan;
use crate::source::TimestampSource;
use crate::timestamp::Timestamp;
use crate::view::TimestampRecordView;
use crate::Result;

/// Leading frame index of a payload (`"12, 3"` gives 12)
pub fn parse_frame_index(payload: &[u8]) -> Option<i64> {
    let start = scan::skip_whitespace(payload, 0);
    scan::signed_int(payload, start).map(|(index, _)| index)
}

/// Sub-frame count of a `<index>, <count>` payload.
///
/// The comma must follow the index directly; blanks are allowed after it.
/// Negative counts are rejected.
pub fn parse_sub_frame_count(payload: &[u8]) -> Option<usize> {
    let start = scan::skip_whitespace(payload, 0);
    let (_, end) = scan::signed_int(payload, start)?;
    if payload.get(end) != Some(&b',') {
        return None;
    }
    let count_at = scan::skip_whitespace(payload, end.checked_add(1)?);
    let (count, _) = scan::signed_int(payload, count_at)?;
    usize::try_from(count).ok()
}

/// Growable frame storage.
///
/// Capacity only grows; [`FrameBuffer::prepare`] checks it against the size
/// of the record about to be loaded before any byte is read.
#[derive(Debug, Clone, Default)]
pub struct FrameBuffer {
    data: Vec<u8>,
    len: usize,
}

impl FrameBuffer {
    /// Buffer able to hold `capacity` bytes without growing
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            len: 0,
        }
    }

    /// Bytes the buffer can hold without growing
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Size the buffer for a `needed`-byte record and return its storage
    pub fn prepare(&mut self, needed: usize) -> &mut [u8] {
        if self.data.len() < needed {
            trace!(from = self.data.len(), to = needed, "Growing frame buffer");
            self.data.resize(needed, 0);
        }
        self.len = needed;
        self.data.get_mut(..needed).unwrap_or_default()
    }

    /// Bytes of the loaded record
    pub fn as_slice(&self) -> &[u8] {
        self.data.get(..self.len).unwrap_or_default()
    }

    /// Length of the loaded record
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no bytes are loaded
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Forget the loaded record, keeping capacity
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// A loaded frame record handed to a processing callback
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Timestamp the caller asked for
    pub requested: Timestamp,
    /// Timestamp of the matching record
    pub timestamp: Timestamp,
    /// Frame index named by the record
    pub index: i64,
    /// Bytes of all sub-frames of the record
    pub data: &'a [u8],
    frame_size: usize,
}

impl<'a> Frame<'a> {
    /// Number of frames in `data`
    pub fn sub_frame_count(&self) -> usize {
        self.data.len() / self.frame_size.max(1)
    }

    /// Individual frames of the record
    pub fn sub_frames(&self) -> std::slice::ChunksExact<'a, u8> {
        self.data.chunks_exact(self.frame_size.max(1))
    }
}

/// Reader pairing a timestamped log with its raw frame file
pub struct FrameIndexedReader {
    view: TimestampRecordView,
    raw_path: PathBuf,
    raw: ByteStream,
    layout: FrameLayout,
    starting_index: i64,
    next_index: Option<i64>,
    sub_frames: usize,
    frame_number: Option<i64>,
    buffer: FrameBuffer,
}

impl FrameIndexedReader {
    /// Open a log and its raw file and read the starting frame index.
    ///
    /// The raw file itself is opened on the first frame load.
    ///
    /// # Errors
    ///
    /// [`ReplayError::InvalidConfig`] for a zero frame size or invalid log
    /// configuration, or the stream error when the log cannot be opened.
    pub fn open(
        log_path: impl AsRef<Path>,
        raw_path: impl AsRef<Path>,
        layout: FrameLayout,
        config: LogConfig,
    ) -> Result<Self> {
        layout.validate()?;
        config.validate()?;
        let raw = ByteStream::new(config.stream.clone());
        let mut reader = Self {
            view: TimestampRecordView::new(log_path, config),
            raw_path: raw_path.as_ref().to_path_buf(),
            raw,
            layout,
            starting_index: 0,
            next_index: None,
            sub_frames: 0,
            frame_number: None,
            buffer: FrameBuffer::with_capacity(layout.frame_size),
        };
        reader.reinit()?;
        Ok(reader)
    }

    /// Restart both files and re-read the starting frame index from the
    /// first record.
    ///
    /// A first record without a leading integer leaves the starting index
    /// at 0.
    ///
    /// # Errors
    ///
    /// See [`TimestampLog::reinit`].
    pub fn reinit(&mut self) -> Result<()> {
        if let Err(e) = self.raw.close() {
            debug!(path = ?self.raw_path, error = %e, "Failed to close raw file");
        }
        self.next_index = None;
        self.sub_frames = 0;
        self.frame_number = None;
        self.buffer.clear();
        self.starting_index = 0;

        let log = self.view.log_mut();
        log.reinit()?;
        if log.advance() {
            if let Some(index) = log.payload().and_then(parse_frame_index) {
                self.starting_index = index;
            }
            log.reinit()?;
        }
        debug!(path = ?self.raw_path, starting_index = self.starting_index, "Frame reader initialised");
        Ok(())
    }

    fn ensure_raw_open(&mut self) -> Result<()> {
        if !self.raw.is_open() {
            self.raw.open(&self.raw_path, OpenMode::Read)?;
            self.next_index = Some(0);
            debug!(path = ?self.raw_path, pipe = self.raw.is_pipe(), "Raw file opened");
        }
        Ok(())
    }

    /// Load the frames of the record valid at `target`.
    ///
    /// Returns `Ok(false)` when no record matches.
    ///
    /// # Errors
    ///
    /// [`ReplayError::MalformedRecord`] if the record has no frame index,
    /// otherwise as [`FrameIndexedReader::load_by_index`].
    pub fn load_frame(&mut self, target: Timestamp, tolerance_ms: i64) -> Result<bool> {
        let Some(payload) = self.view.data_for_timestamp(target, tolerance_ms) else {
            return Ok(false);
        };
        let index = parse_frame_index(payload)
            .ok_or_else(|| ReplayError::malformed(payload, "missing frame index"))?;
        self.load_by_index(index)?;
        Ok(true)
    }

    /// Load frame `wanted` (and its sub-frames) into the frame buffer.
    ///
    /// In sub-frame mode the count is taken from the current record. A
    /// sequential request reads without seeking. On failure the buffer
    /// contents are unspecified and the next load seeks.
    ///
    /// # Errors
    ///
    /// - [`ReplayError::InvalidFrameIndex`] if `wanted` precedes the starting index
    /// - [`ReplayError::MalformedRecord`] if the sub-frame count is missing
    /// - [`ReplayError::TruncatedStream`] on a short read
    /// - [`ReplayError::Stream`] if the raw file cannot be opened or seeked
    pub fn load_by_index(&mut self, wanted: i64) -> Result<()> {
        self.sub_frames = 0;
        self.frame_number = None;
        self.buffer.clear();

        let local = wanted
            .checked_sub(self.starting_index)
            .filter(|local| *local >= 0)
            .ok_or(ReplayError::InvalidFrameIndex {
                index: wanted,
                starting: self.starting_index,
            })?;
        self.ensure_raw_open()?;

        let count = match self.layout.mode {
            FrameMode::Single => 1,
            FrameMode::SubFrames => {
                let payload = self.view.log().payload().unwrap_or_default();
                parse_sub_frame_count(payload)
                    .ok_or_else(|| ReplayError::malformed(payload, "missing sub-frame count"))?
            }
        };
        if count == 0 {
            self.frame_number = Some(wanted);
            return Ok(());
        }

        let too_large = || ReplayError::malformed(b"", "frame record exceeds addressable size");
        let load_size = self.layout.frame_size.checked_mul(count).ok_or_else(too_large)?;
        let count_i64 = i64::try_from(count).ok().ok_or_else(too_large)?;

        if self.next_index != Some(local) {
            let offset = u64::try_from(local)
                .ok()
                .and_then(|l| l.checked_mul(self.layout.frame_size as u64))
                .ok_or_else(too_large)?;
            trace!(index = wanted, offset, "Seeking raw file");
            self.next_index = None;
            self.raw.seek(SeekFrom::Start(offset))?;
        }

        let storage = self.buffer.prepare(load_size);
        let read = match self.raw.read(storage) {
            Ok(read) => read,
            Err(e) => {
                self.next_index = None;
                return Err(e.into());
            }
        };
        if read < load_size {
            self.next_index = None;
            return Err(ReplayError::TruncatedStream {
                index: wanted,
                expected: load_size,
                read,
            });
        }

        self.next_index = local.checked_add(count_i64);
        self.sub_frames = count;
        self.frame_number = Some(wanted);
        Ok(())
    }

    /// Load the record valid at `target` and pass its frames to `handler`.
    ///
    /// Returns `Ok(None)` when no record matches.
    ///
    /// # Errors
    ///
    /// See [`FrameIndexedReader::load_frame`].
    pub fn process<F, R>(&mut self, target: Timestamp, tolerance_ms: i64, handler: F) -> Result<Option<R>>
    where
        F: FnOnce(Frame<'_>) -> R,
    {
        if !self.load_frame(target, tolerance_ms)? {
            return Ok(None);
        }
        Ok(self.frame(target).map(handler))
    }

    /// Loaded frame as seen from a request at `requested`
    pub fn frame(&self, requested: Timestamp) -> Option<Frame<'_>> {
        Some(Frame {
            requested,
            timestamp: self.view.log().current()?,
            index: self.frame_number?,
            data: self.buffer.as_slice(),
            frame_size: self.layout.frame_size,
        })
    }

    /// Frame index of the last successful load
    pub fn frame_number(&self) -> Option<i64> {
        self.frame_number
    }

    /// Bytes of the last successful load
    pub fn frame_bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Frames of the last successful load
    pub fn sub_frames(&self) -> std::slice::ChunksExact<'_, u8> {
        self.frame_bytes().chunks_exact(self.layout.frame_size.max(1))
    }

    /// Number of frames in the last successful load
    pub fn sub_frame_count(&self) -> usize {
        self.sub_frames
    }

    /// Frame index of the first record in the raw file
    pub fn starting_index(&self) -> i64 {
        self.starting_index
    }

    /// Local index a sequential read would serve without seeking
    pub fn next_index(&self) -> Option<i64> {
        self.next_index
    }

    /// Frame buffer capacity in bytes
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Raw file layout
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// I/O counters of the raw file stream
    pub fn raw_stats(&self) -> StreamStats {
        self.raw.stats()
    }

    /// Record view over the log
    pub fn view(&self) -> &TimestampRecordView {
        &self.view
    }

    /// Record view over the log, mutably
    pub fn view_mut(&mut self) -> &mut TimestampRecordView {
        &mut self.view
    }

    /// Timestamp log
    pub fn log(&self) -> &TimestampLog {
        self.view.log()
    }
}

impl std::fmt::Debug for FrameIndexedReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameIndexedReader")
            .field("log", self.view.log())
            .field("raw_path", &self.raw_path)
            .field("layout", &self.layout)
            .field("starting_index", &self.starting_index)
            .field("next_index", &self.next_index)
            .field("frame_number", &self.frame_number)
            .finish()
    }
}
