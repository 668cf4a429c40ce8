//! Evenly spaced timestamps spanning a recorded log

use std::path::Path;
use tracing::debug;

use crate::config::LogConfig;
use crate::error::ReplayError;
use crate::log::TimestampLog;
use crate::source::TimestampSource;
use crate::timestamp::Timestamp;
use crate::Result;

/// Shortest step, used for rates above 1000 frames per second and to move past a zero step
const MIN_STEP_MS: i64 = 1;

/// Synthetic timestamp source at a fixed frame rate.
///
/// Walks from the first to the last timestamp of a log in steps of
/// `floor(1000 / frame_rate)` milliseconds, so other streams can be
/// resampled onto a nominal rate. The log is read once at construction.
/// A non-positive rate or an empty log gives a degenerate generator with a
/// zero step and zero bounds, which yields `0.000` once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantRateGenerator {
    start: Timestamp,
    end: Timestamp,
    step_ms: i64,
    next: Timestamp,
    current: Option<Timestamp>,
    previous: Option<Timestamp>,
    exhausted: bool,
    staleness_ms: i64,
    tolerance_ms: i64,
}

impl ConstantRateGenerator {
    /// Generator spanning `[start, end]` at `frame_rate` frames per second
    pub fn from_bounds(start: Timestamp, end: Timestamp, frame_rate: f64) -> Self {
        let config = LogConfig::default();
        match step_for_rate(frame_rate) {
            Some(step_ms) if start <= end => Self::build(start, end, step_ms, &config),
            _ => Self::build(Timestamp::ZERO, Timestamp::ZERO, 0, &config),
        }
    }

    /// Generator spanning the first and last timestamps of `log`.
    ///
    /// An empty log gives a degenerate generator.
    ///
    /// # Errors
    ///
    /// Returns the stream error when the log cannot be opened.
    pub fn from_log(log: &mut TimestampLog, frame_rate: f64) -> Result<Self> {
        let bounds = log.first_and_last()?;
        let config = log.config();
        let generator = match (bounds, step_for_rate(frame_rate)) {
            (Some((start, end)), Some(step_ms)) => Self::build(start, end, step_ms, config),
            _ => Self::build(Timestamp::ZERO, Timestamp::ZERO, 0, config),
        };
        debug!(
            path = ?log.path(),
            start = %generator.start,
            end = %generator.end,
            step_ms = generator.step_ms,
            "Constant rate generator ready"
        );
        Ok(generator)
    }

    /// Open the log at `path` and span its timestamps
    ///
    /// # Errors
    ///
    /// See [`ConstantRateGenerator::from_log`].
    pub fn open(path: impl AsRef<Path>, config: LogConfig, frame_rate: f64) -> Result<Self> {
        let mut log = TimestampLog::new(path, config);
        Self::from_log(&mut log, frame_rate)
    }

    /// Like [`ConstantRateGenerator::from_log`], but an empty log is an error.
    ///
    /// # Errors
    ///
    /// [`ReplayError::EndOfLog`] when the log has no timestamped record,
    /// [`ReplayError::InvalidConfig`] for a non-positive rate.
    pub fn strict(log: &mut TimestampLog, frame_rate: f64) -> Result<Self> {
        if step_for_rate(frame_rate).is_none() {
            return Err(ReplayError::invalid_config(format!(
                "frame rate must be positive, got {frame_rate}"
            )));
        }
        let generator = Self::from_log(log, frame_rate)?;
        if generator.is_degenerate() {
            return Err(ReplayError::EndOfLog {
                path: log.path().to_path_buf(),
            });
        }
        Ok(generator)
    }

    fn build(start: Timestamp, end: Timestamp, step_ms: i64, config: &LogConfig) -> Self {
        Self {
            start,
            end,
            step_ms,
            next: start,
            current: None,
            previous: None,
            exhausted: false,
            staleness_ms: config.end_of_log_staleness_ms,
            tolerance_ms: config.default_tolerance_ms,
        }
    }

    /// First generated timestamp
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// Last timestamp the sequence may reach
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Milliseconds between consecutive timestamps
    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    /// Whether the generator was built from a bad rate or an empty log
    pub fn is_degenerate(&self) -> bool {
        self.step_ms == 0
    }

    /// Restart the sequence at its first timestamp
    pub fn reset(&mut self) {
        self.next = self.start;
        self.current = None;
        self.previous = None;
        self.exhausted = false;
    }

    fn step_forward(&mut self) -> bool {
        if self.next > self.end {
            self.exhausted = true;
            return false;
        }
        self.previous = self.current.replace(self.next);
        self.next += self.step_ms.max(MIN_STEP_MS);
        self.exhausted = false;
        true
    }
}

/// `floor(1000 / frame_rate)` clamped to at least 1 ms; `None` for rates that are
/// not positive and finite
fn step_for_rate(frame_rate: f64) -> Option<i64> {
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return None;
    }
    let step = (1000.0 / frame_rate).floor();
    if step < 1.0 {
        return Some(MIN_STEP_MS);
    }
    Some(step as i64)
}

impl TimestampSource for ConstantRateGenerator {
    fn advance(&mut self) -> bool {
        self.step_forward();
        self.current.is_some()
    }

    fn current(&self) -> Option<Timestamp> {
        self.current
    }

    fn previous(&self) -> Option<Timestamp> {
        self.previous
    }

    fn rewind_one_step(&mut self) -> bool {
        let Some(previous) = self.previous.take() else {
            return false;
        };
        self.next = previous;
        self.current = None;
        self.exhausted = false;
        true
    }

    fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    fn end_of_log_staleness_ms(&self) -> i64 {
        self.staleness_ms
    }

    fn default_tolerance_ms(&self) -> i64 {
        self.tolerance_ms
    }
}

impl Iterator for ConstantRateGenerator {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        if self.step_forward() {
            self.current
        } else {
            None
        }
    }
}
